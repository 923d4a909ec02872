// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Computes a camera transform from forward kinematics and from the frame tree and compares
//! both.
use std::fmt;
use std::time::Duration;

use nalgebra::Matrix4;

use crate::exception::TfCheckResult;
use crate::motion::types::{Chain, Space};
use crate::motion::MotionProxy;
use crate::tf::{Time, TransformLookup};
use tracing::warn;

use crate::utils::{
    array_to_matrix, euler_matrix, is_rigid_transform, translation_rotation_to_matrix,
    FlatTransform, PoseVector,
};

/// Largest Frobenius norm of the difference for which two transforms agree.
pub const TOLERANCE: f64 = 1e-5;
/// Allowed deviation of a rotation block from orthonormality.
pub const RIGIDITY_TOLERANCE: f64 = 1e-6;

/// Maps the optical frame of a camera (z forward, x right, y down) onto its mechanical frame.
///
/// new x = old z, new y = -old x, new z = -old y
pub fn optical_frame_correction() -> Matrix4<f64> {
    #[rustfmt::skip]
    let correction = Matrix4::new(
        0., 0., 1., 0.,
        -1., 0., 0., 0.,
        0., -1., 0., 0.,
        0., 0., 0., 1.,
    );
    correction
}

/// Re-expresses a transform to the mechanical camera frame in the optical convention.
pub fn apply_optical_frame_correction(transform: &Matrix4<f64>) -> Matrix4<f64> {
    transform * optical_frame_correction()
}

/// Inverse of [`apply_optical_frame_correction`].
pub fn remove_optical_frame_correction(transform: &Matrix4<f64>) -> Matrix4<f64> {
    // the correction is a rotation, so its inverse is the transpose
    transform * optical_frame_correction().transpose()
}

/// Everything the motion service reports for one chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicReading {
    pub chain: Chain,
    pub space: Space,
    pub sensor_position: PoseVector,
    pub command_position: PoseVector,
    pub sensor_transform: FlatTransform,
    pub command_transform: FlatTransform,
}

impl KinematicReading {
    /// The measured transform as a homogeneous matrix.
    pub fn transform(&self) -> Matrix4<f64> {
        array_to_matrix(&self.sensor_transform)
    }

    pub fn roll_pitch_yaw(&self) -> [f64; 3] {
        [
            self.sensor_position[3],
            self.sensor_position[4],
            self.sensor_position[5],
        ]
    }

    /// Rotation of the measured position. Only used for display.
    pub fn rotation_from_position(&self) -> Matrix4<f64> {
        let [roll, pitch, yaw] = self.roll_pitch_yaw();
        euler_matrix(roll, pitch, yaw)
    }
}

/// Asks the motion service for the measured and commanded position and transform of `chain`.
pub fn resolve_kinematic_transform<M: MotionProxy + ?Sized>(
    proxy: &mut M,
    chain: Chain,
    space: Space,
) -> TfCheckResult<KinematicReading> {
    let sensor_position = proxy.get_position(chain, space, true)?;
    let command_position = proxy.get_position(chain, space, false)?;
    let sensor_transform = proxy.get_transform(chain, space, true)?;
    let command_transform = proxy.get_transform(chain, space, false)?;
    Ok(KinematicReading {
        chain,
        space,
        sensor_position,
        command_position,
        sensor_transform,
        command_transform,
    })
}

/// Waits up to `timeout` for the transform from `frame_b` to `frame_a` and returns the latest
/// one as translation and `[x, y, z, w]` quaternion.
///
/// # Errors
/// Any error of the lookup, usually one where
/// [`is_tf_error`](`crate::exception::TfCheckException::is_tf_error`) is true.
pub fn resolve_lookup_transform<L: TransformLookup + ?Sized>(
    lookup: &mut L,
    frame_a: &str,
    frame_b: &str,
    timeout: Duration,
) -> TfCheckResult<([f64; 3], [f64; 4])> {
    let stamp = Time::zero();
    lookup.wait_for_transform(frame_a, frame_b, stamp, timeout)?;
    let transform = lookup.lookup_transform(frame_a, frame_b, stamp)?;
    Ok((transform.translation(), transform.rotation()))
}

/// Assembles the homogeneous matrix of a lookup result.
pub fn lookup_to_matrix(translation: &[f64; 3], rotation: &[f64; 4]) -> Matrix4<f64> {
    translation_rotation_to_matrix(translation, rotation)
}

/// Logs a warning if `transform` is not a rigid transform. The transform is still used.
pub fn warn_if_not_rigid(name: &str, transform: &Matrix4<f64>) -> bool {
    let rigid = is_rigid_transform(transform, RIGIDITY_TOLERANCE);
    if !rigid {
        warn!("{} is not a rigid transform: {:?}", name, transform);
    }
    rigid
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    /// NaN never passes.
    pub fn from_discrepancy(discrepancy: f64) -> Self {
        if discrepancy <= TOLERANCE {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub discrepancy: f64,
    pub verdict: Verdict,
}

/// Frobenius norm of `a - b` and whether it is within [`TOLERANCE`].
pub fn compare(a: &Matrix4<f64>, b: &Matrix4<f64>) -> Comparison {
    let discrepancy = (a - b).norm();
    Comparison {
        discrepancy,
        verdict: Verdict::from_discrepancy(discrepancy),
    }
}

#[cfg(test)]
mod tests {
    use crate::comparator::{
        apply_optical_frame_correction, compare, lookup_to_matrix, optical_frame_correction,
        remove_optical_frame_correction, resolve_kinematic_transform, resolve_lookup_transform,
        warn_if_not_rigid, Verdict, TOLERANCE,
    };
    use crate::exception::TfCheckException;
    use crate::motion::types::{Chain, Space};
    use crate::motion::MockMotionProxy;
    use crate::tf::{StampedTransform, Time, TransformBuffer};
    use crate::utils::{euler_matrix, is_rigid_transform, matrix_to_array};
    use mockall::predicate::eq;
    use nalgebra::{Matrix4, Vector4};
    use std::time::Duration;

    fn slice_compare(a: &[f64], b: &[f64], thresh: f64) {
        assert_eq!(a.len(), b.len());
        for i in 0..a.len() {
            assert!((a[i] - b[i]).abs() < thresh, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn identical_matrices_pass() {
        let m = euler_matrix(0.1, -0.4, 2.);
        let comparison = compare(&m, &m);
        assert_eq!(comparison.discrepancy, 0.);
        assert_eq!(comparison.verdict, Verdict::Pass);
    }

    #[test]
    fn tolerance_boundary() {
        assert_eq!(Verdict::from_discrepancy(TOLERANCE), Verdict::Pass);
        assert_eq!(Verdict::from_discrepancy(TOLERANCE * 0.99), Verdict::Pass);
        assert_eq!(Verdict::from_discrepancy(TOLERANCE * 1.01), Verdict::Fail);
        assert_eq!(Verdict::from_discrepancy(f64::NAN), Verdict::Fail);

        let a = Matrix4::identity();
        let mut b = Matrix4::identity();
        b[(0, 3)] = 0.5e-5;
        assert_eq!(compare(&a, &b).verdict, Verdict::Pass);
        b[(0, 3)] = 2e-5;
        let comparison = compare(&a, &b);
        assert!((comparison.discrepancy - 2e-5).abs() < 1e-15);
        assert_eq!(comparison.verdict, Verdict::Fail);
    }

    #[test]
    fn correction_is_a_rotation_with_pinned_axes() {
        let c = optical_frame_correction();
        assert!(is_rigid_transform(&c, 1e-12));
        // optical z (viewing direction) is the mechanical x axis
        let z = c * Vector4::new(0., 0., 1., 0.);
        slice_compare(z.as_slice(), &[1., 0., 0., 0.], 1e-12);
        // optical x (right) is the mechanical -y axis
        let x = c * Vector4::new(1., 0., 0., 0.);
        slice_compare(x.as_slice(), &[0., -1., 0., 0.], 1e-12);
        assert_eq!(
            matrix_to_array(&c),
            [0., 0., 1., 0., -1., 0., 0., 0., 0., -1., 0., 0., 0., 0., 0., 1.]
        );
    }

    #[test]
    fn rigidity_is_reported_but_not_enforced() {
        assert!(warn_if_not_rigid("correction", &optical_frame_correction()));
        let mut scaled = Matrix4::identity() * 2.;
        scaled[(3, 3)] = 1.;
        assert!(!warn_if_not_rigid("scaled", &scaled));
        let mut offset = optical_frame_correction();
        offset[(3, 0)] = 0.1;
        assert!(!warn_if_not_rigid("offset", &offset));
    }

    #[test]
    fn correction_then_inverse_is_identity() {
        let mut m = euler_matrix(0.3, 0.2, -0.9);
        m[(0, 3)] = 0.05;
        m[(2, 3)] = 0.19;
        let round_trip = remove_optical_frame_correction(&apply_optical_frame_correction(&m));
        slice_compare(round_trip.as_slice(), m.as_slice(), 1e-12);
        let twice_inverse = apply_optical_frame_correction(&remove_optical_frame_correction(&m));
        slice_compare(twice_inverse.as_slice(), m.as_slice(), 1e-12);
    }

    #[test]
    fn kinematic_reading_uses_measured_values() {
        let mut proxy = MockMotionProxy::new();
        let mut sensor = [0.; 16];
        sensor.copy_from_slice(&matrix_to_array(&Matrix4::identity()));
        sensor[3] = 0.05;
        proxy
            .expect_get_position()
            .with(eq(Chain::Head), eq(Space::Torso), eq(true))
            .times(1)
            .returning(|_, _, _| Ok([0., 0., 0.1265, 0.1, 0.2, 0.3]));
        proxy
            .expect_get_position()
            .with(eq(Chain::Head), eq(Space::Torso), eq(false))
            .times(1)
            .returning(|_, _, _| Ok([0.; 6]));
        proxy
            .expect_get_transform()
            .with(eq(Chain::Head), eq(Space::Torso), eq(true))
            .times(1)
            .returning(move |_, _, _| Ok(sensor));
        proxy
            .expect_get_transform()
            .with(eq(Chain::Head), eq(Space::Torso), eq(false))
            .times(1)
            .returning(|_, _, _| Ok([0.; 16]));
        let reading = resolve_kinematic_transform(&mut proxy, Chain::Head, Space::Torso).unwrap();
        assert_eq!(reading.transform()[(0, 3)], 0.05);
        assert_eq!(reading.roll_pitch_yaw(), [0.1, 0.2, 0.3]);
        slice_compare(
            reading.rotation_from_position().as_slice(),
            euler_matrix(0.1, 0.2, 0.3).as_slice(),
            1e-15,
        );
    }

    #[test]
    fn proxy_errors_propagate() {
        let mut proxy = MockMotionProxy::new();
        proxy.expect_get_position().returning(|_, _, _| {
            Err(TfCheckException::CommandException {
                message: "rejected".to_string(),
            })
        });
        match resolve_kinematic_transform(&mut proxy, Chain::CameraTop, Space::Torso) {
            Err(TfCheckException::CommandException { .. }) => {}
            other => panic!("expected command exception, got {:?}", other),
        }
    }

    #[test]
    fn lookup_with_zero_timeout_fails_immediately() {
        let mut buffer = TransformBuffer::new();
        let result = resolve_lookup_transform(
            &mut buffer,
            "Torso_link",
            "CameraTop_frame",
            Duration::from_secs(0),
        );
        match result {
            Err(e) => assert!(e.is_tf_error()),
            Ok(_) => panic!("lookup without data must fail"),
        }
    }

    #[test]
    fn lookup_result_becomes_a_matrix() {
        let mut buffer = TransformBuffer::new();
        buffer
            .set_transform(
                &StampedTransform::from_parts(
                    Time::zero(),
                    "Torso_link",
                    "CameraTop_frame",
                    &[0.0539, 0., 0.1944],
                    &[-0.5, 0.5, -0.5, 0.5],
                ),
                true,
            )
            .unwrap();
        let (translation, rotation) = resolve_lookup_transform(
            &mut buffer,
            "Torso_link",
            "CameraTop_frame",
            Duration::from_secs(1),
        )
        .unwrap();
        let m = lookup_to_matrix(&translation, &rotation);
        let mut expected = optical_frame_correction();
        expected[(0, 3)] = 0.0539;
        expected[(2, 3)] = 0.1944;
        slice_compare(m.as_slice(), expected.as_slice(), 1e-12);
    }
}
