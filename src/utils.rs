// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! contains useful type definitions and conversion functions.
use nalgebra::{Matrix3, Matrix4, Quaternion, Rotation3, UnitQuaternion, Vector3};

/// x, y, z, roll, pitch, yaw as returned by the motion service
pub type PoseVector = [f64; 6];
/// A 4x4 homogeneous matrix flattened in row-major order
pub type FlatTransform = [f64; 16];

/// Column width used when printing matrices to the console.
pub const MAX_COLUMN_WIDTH: usize = 20;

/// converts a 4x4 row-major homogeneous matrix to a Matrix4
pub fn array_to_matrix(array: &FlatTransform) -> Matrix4<f64> {
    Matrix4::from_row_slice(array)
}

/// converts a Matrix4 to a 4x4 row-major array
pub fn matrix_to_array(matrix: &Matrix4<f64>) -> FlatTransform {
    let mut array = [0.; 16];
    for row in 0..4 {
        for column in 0..4 {
            array[4 * row + column] = matrix[(row, column)];
        }
    }
    array
}

/// Returns the homogeneous rotation for roll, pitch and yaw in the static (extrinsic) XYZ
/// convention: first roll about the fixed x axis, then pitch about the fixed y axis and finally
/// yaw about the fixed z axis, i.e. `Rz(yaw) * Ry(pitch) * Rx(roll)`.
pub fn euler_matrix(roll: f64, pitch: f64, yaw: f64) -> Matrix4<f64> {
    let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), roll);
    let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), pitch);
    let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), yaw);
    (rz * ry * rx).to_homogeneous()
}

/// Returns the homogeneous rotation of a quaternion given as `[x, y, z, w]`.
///
/// The quaternion is normalized first. A quaternion of (almost) zero length yields the identity.
pub fn quaternion_matrix(quaternion: &[f64; 4]) -> Matrix4<f64> {
    let q = Quaternion::new(quaternion[3], quaternion[0], quaternion[1], quaternion[2]);
    if q.norm() < f64::EPSILON * 4. {
        return Matrix4::identity();
    }
    UnitQuaternion::from_quaternion(q).to_homogeneous()
}

/// Assembles a homogeneous transform from a translation and a `[x, y, z, w]` quaternion.
pub fn translation_rotation_to_matrix(translation: &[f64; 3], quaternion: &[f64; 4]) -> Matrix4<f64> {
    let mut matrix = quaternion_matrix(quaternion);
    for i in 0..3 {
        matrix[(i, 3)] = translation[i];
    }
    matrix
}

/// Checks that the upper left 3x3 block is a rotation (orthonormal with determinant +1) and that
/// the bottom row is `[0, 0, 0, 1]`, both within `tolerance`.
pub fn is_rigid_transform(matrix: &Matrix4<f64>, tolerance: f64) -> bool {
    let rotation = Matrix3::from_fn(|row, column| matrix[(row, column)]);
    let orthonormal = (rotation.transpose() * rotation - Matrix3::identity()).norm() <= tolerance;
    let proper = (rotation.determinant() - 1.).abs() <= tolerance;
    let bottom_row = (0..3).all(|i| matrix[(3, i)].abs() <= tolerance)
        && (matrix[(3, 3)] - 1.).abs() <= tolerance;
    orthonormal && proper && bottom_row
}

/// Formats a float like Python's `repr`: `1.0`, `0.0001`, `1e-05`, `1e+16`, `nan`.
pub fn float_to_string(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let debug = format!("{:?}", value);
    match debug.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => debug,
    }
}

/// Formats floats as a bracketed, comma separated list.
pub fn floats_to_string(values: &[f64]) -> String {
    let values: Vec<String> = values.iter().map(|v| float_to_string(*v)).collect();
    format!("[{}]", values.join(", "))
}

/// Formats a row-major flat transform as four rows with centered columns.
pub fn transform_to_string(transform: &FlatTransform) -> String {
    let mut out = String::new();
    for row in transform.chunks(4) {
        for value in row {
            out.push_str(&format!(
                "{:^width$}",
                float_to_string(*value),
                width = MAX_COLUMN_WIDTH
            ));
        }
        out.push('\n');
    }
    out
}

/// Formats a homogeneous matrix the same way as [`transform_to_string`].
pub fn matrix_to_string(matrix: &Matrix4<f64>) -> String {
    transform_to_string(&matrix_to_array(matrix))
}
