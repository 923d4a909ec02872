// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Runs the camera transform check and prints a report.
use std::io::Write;
use std::time::Duration;

use tracing::{info, warn};

use crate::comparator::{
    apply_optical_frame_correction, compare, lookup_to_matrix, resolve_kinematic_transform,
    resolve_lookup_transform, warn_if_not_rigid, Verdict,
};
use crate::exception::TfCheckResult;
use crate::motion::types::{Chain, Space};
use crate::motion::MotionProxy;
use crate::tf::TransformLookup;
use crate::utils::{float_to_string, floats_to_string, matrix_to_string, transform_to_string};

/// Exit code returned by [`run`] if the frame tree cannot provide the transform.
pub const LOOKUP_FAILURE_EXIT_CODE: i32 = -1;

/// What to compare. The defaults check the top camera of the robot against the torso.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckConfig {
    /// Chain printed for reference. It does not take part in the comparison.
    pub reference_chain: Chain,
    pub chain: Chain,
    pub space: Space,
    /// Target frame of the lookup, should correspond to `space`.
    pub frame_a: String,
    /// Source frame of the lookup, should correspond to the optical frame of `chain`.
    pub frame_b: String,
    pub timeout: Duration,
}

impl Default for CheckConfig {
    fn default() -> Self {
        CheckConfig {
            reference_chain: Chain::Head,
            chain: Chain::CameraTop,
            space: Space::Torso,
            frame_a: "Torso_link".to_string(),
            frame_b: "CameraTop_frame".to_string(),
            timeout: Duration::from_secs(1),
        }
    }
}

/// Compares the corrected forward kinematics of `config.chain` with the transform between
/// `config.frame_a` and `config.frame_b` and writes the report to `out`.
///
/// Returns the exit code: 0 once a verdict was printed, whether it passed or not, and
/// [`LOOKUP_FAILURE_EXIT_CODE`] if the transform lookup failed.
///
/// # Errors
/// Every error except the ones of the transform lookup, in particular all errors of the
/// motion proxy.
pub fn run<M, L, W>(
    proxy: &mut M,
    lookup: &mut L,
    config: &CheckConfig,
    out: &mut W,
) -> TfCheckResult<i32>
where
    M: MotionProxy + ?Sized,
    L: TransformLookup + ?Sized,
    W: Write + ?Sized,
{
    let space = config.space;

    let reference = resolve_kinematic_transform(proxy, config.reference_chain, space)?;
    writeln!(
        out,
        "Position of {} in space {}:",
        reference.chain,
        space.name()
    )?;
    writeln!(out, "{}", floats_to_string(&reference.sensor_position))?;
    writeln!(out, "{}", floats_to_string(&reference.command_position))?;
    writeln!(out, "{}", floats_to_string(&reference.roll_pitch_yaw()))?;
    writeln!(out, "{}", matrix_to_string(&reference.rotation_from_position()))?;
    writeln!(out, "Transform {} to {}:", space.name(), reference.chain)?;
    writeln!(out, "{}", transform_to_string(&reference.sensor_transform))?;

    let reading = resolve_kinematic_transform(proxy, config.chain, space)?;
    writeln!(out, "Transform {} to {}:", space.name(), reading.chain)?;
    writeln!(out, "{}", transform_to_string(&reading.sensor_transform))?;
    writeln!(out)?;
    warn_if_not_rigid(
        &format!("{} in {}", reading.chain, space.name()),
        &reading.transform(),
    );
    let kinematic = apply_optical_frame_correction(&reading.transform());
    writeln!(
        out,
        "Transform {} to {} (with rotated coordinate frame):",
        space.name(),
        reading.chain
    )?;
    writeln!(out, "{}", matrix_to_string(&kinematic))?;

    let (translation, rotation) =
        match resolve_lookup_transform(lookup, &config.frame_a, &config.frame_b, config.timeout)
        {
            Ok(lookup) => lookup,
            Err(e) if e.is_tf_error() => {
                warn!("lookup of {} to {} failed", config.frame_a, config.frame_b);
                writeln!(out, "ERROR using TF")?;
                writeln!(out, "{}", e)?;
                return Ok(LOOKUP_FAILURE_EXIT_CODE);
            }
            Err(e) => return Err(e),
        };
    let tf = lookup_to_matrix(&translation, &rotation);
    warn_if_not_rigid(&format!("{} to {}", config.frame_a, config.frame_b), &tf);
    writeln!(out, "[tf] Transform {} to {}:", config.frame_a, config.frame_b)?;
    writeln!(out, "{}", matrix_to_string(&tf))?;

    let comparison = compare(&kinematic, &tf);
    writeln!(out, "Error is:  {}", float_to_string(comparison.discrepancy))?;
    match comparison.verdict {
        Verdict::Fail => writeln!(
            out,
            "ERROR: Something is wrong with your TF transformations.  Transforms do not match!"
        )?,
        Verdict::Pass => writeln!(out, "Test ok. Done")?,
    }
    info!(
        "{} to {}: {} (discrepancy {:e})",
        config.frame_a, config.frame_b, comparison.verdict, comparison.discrepancy
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use crate::check::{run, CheckConfig, LOOKUP_FAILURE_EXIT_CODE};
    use crate::exception::TfCheckException;
    use crate::motion::types::{Chain, Space};
    use crate::motion::MockMotionProxy;
    use crate::tf::{StampedTransform, Time, TransformBuffer};
    use crate::utils::matrix_to_array;
    use nalgebra::Matrix4;
    use std::time::Duration;

    const IDENTITY: [f64; 16] = [
        1., 0., 0., 0., //
        0., 1., 0., 0., //
        0., 0., 1., 0., //
        0., 0., 0., 1.,
    ];

    fn identity_proxy() -> MockMotionProxy {
        let mut proxy = MockMotionProxy::new();
        proxy
            .expect_get_position()
            .times(4)
            .returning(|_, _, _| Ok([0.; 6]));
        proxy
            .expect_get_transform()
            .times(4)
            .returning(|_, _, _| Ok(IDENTITY));
        proxy
    }

    /// Torso_link -> CameraTop_frame rotated into the optical convention.
    fn optical_buffer(translation: [f64; 3]) -> TransformBuffer {
        let mut buffer = TransformBuffer::new();
        buffer
            .set_transform(
                &StampedTransform::from_parts(
                    Time::new(12, 0),
                    "Torso_link",
                    "CameraTop_frame",
                    &translation,
                    &[-0.5, 0.5, -0.5, 0.5],
                ),
                true,
            )
            .unwrap();
        buffer
    }

    fn config() -> CheckConfig {
        CheckConfig {
            timeout: Duration::from_secs(0),
            ..CheckConfig::default()
        }
    }

    #[test]
    fn default_config_checks_the_top_camera() {
        let config = CheckConfig::default();
        assert_eq!(config.chain, Chain::CameraTop);
        assert_eq!(config.space, Space::Torso);
        assert_eq!(config.frame_a, config.space.tf_frame());
        assert_eq!(config.frame_b, config.chain.tf_frame());
        assert_eq!(config.timeout, Duration::from_secs(1));
    }

    #[test]
    fn matching_transforms_pass() {
        let mut proxy = identity_proxy();
        let mut buffer = optical_buffer([0., 0., 0.]);
        let mut out = Vec::new();
        let code = run(&mut proxy, &mut buffer, &config(), &mut out).unwrap();
        let report = String::from_utf8(out).unwrap();
        assert_eq!(code, 0);
        assert!(report.starts_with("Position of Head in space Torso:\n"));
        assert!(report.contains("Transform Torso to CameraTop (with rotated coordinate frame):"));
        assert!(report.contains("[tf] Transform Torso_link to CameraTop_frame:"));
        assert!(report.contains("Error is:  "));
        assert!(report.ends_with("Test ok. Done\n"));
        assert!(!report.contains("do not match"));
    }

    #[test]
    fn mismatch_fails_but_exits_normally() {
        let mut proxy = identity_proxy();
        let mut buffer = optical_buffer([0.0539, 0., 0.1944]);
        let mut out = Vec::new();
        let code = run(&mut proxy, &mut buffer, &config(), &mut out).unwrap();
        let report = String::from_utf8(out).unwrap();
        assert_eq!(code, 0);
        assert!(report.contains(
            "ERROR: Something is wrong with your TF transformations.  Transforms do not match!"
        ));
        assert!(!report.contains("Test ok"));
    }

    #[test]
    fn missing_tf_data_reports_an_error() {
        let mut proxy = identity_proxy();
        let mut buffer = TransformBuffer::new();
        let mut out = Vec::new();
        let code = run(&mut proxy, &mut buffer, &config(), &mut out).unwrap();
        let report = String::from_utf8(out).unwrap();
        assert_eq!(code, LOOKUP_FAILURE_EXIT_CODE);
        assert_ne!(code, 0);
        assert!(report.contains("ERROR using TF\n"));
        assert!(!report.contains("Error is:"));
    }

    #[test]
    fn proxy_errors_are_not_caught() {
        let mut proxy = MockMotionProxy::new();
        proxy.expect_get_position().returning(|_, _, _| {
            Err(TfCheckException::NetworkException {
                message: "naotf: connection closed by motion bridge".to_string(),
            })
        });
        let mut buffer = optical_buffer([0., 0., 0.]);
        let mut out = Vec::new();
        match run(&mut proxy, &mut buffer, &config(), &mut out) {
            Err(TfCheckException::NetworkException { .. }) => {}
            other => panic!("expected network exception, got {:?}", other),
        }
    }

    #[test]
    fn non_rigid_kinematics_are_still_compared() {
        let mut skewed = IDENTITY;
        skewed[0] = 2.;
        let mut proxy = MockMotionProxy::new();
        proxy.expect_get_position().returning(|_, _, _| Ok([0.; 6]));
        proxy.expect_get_transform().returning(move |chain, _, _| {
            if chain == Chain::CameraTop {
                Ok(skewed)
            } else {
                Ok(IDENTITY)
            }
        });
        let mut buffer = optical_buffer([0., 0., 0.]);
        let mut out = Vec::new();
        assert_eq!(run(&mut proxy, &mut buffer, &config(), &mut out).unwrap(), 0);
        let report = String::from_utf8(out).unwrap();
        assert!(report.contains("Error is:  1.0\n"));
        assert!(report.contains("Transforms do not match!"));
    }

    #[test]
    fn report_prints_positions_like_python_lists() {
        let mut proxy = MockMotionProxy::new();
        proxy
            .expect_get_position()
            .returning(|_, _, _| Ok([0., 0., 0.1265, 1e-5, 0., 0.5]));
        proxy
            .expect_get_transform()
            .returning(|_, _, _| Ok(IDENTITY));
        let mut buffer = optical_buffer([0., 0., 0.]);
        let mut out = Vec::new();
        run(&mut proxy, &mut buffer, &config(), &mut out).unwrap();
        let report = String::from_utf8(out).unwrap();
        assert!(report.contains("\n[0.0, 0.0, 0.1265, 1e-05, 0.0, 0.5]\n"));
        assert!(report.contains("\n[1e-05, 0.0, 0.5]\n"));
    }

    #[test]
    fn kinematic_offset_shows_in_the_report() {
        let mut camera = Matrix4::identity();
        camera[(0, 3)] = 0.0539;
        camera[(2, 3)] = 0.1944;
        let camera = matrix_to_array(&camera);
        let mut proxy = MockMotionProxy::new();
        proxy.expect_get_position().returning(|_, _, _| Ok([0.; 6]));
        proxy
            .expect_get_transform()
            .returning(move |chain, _, _| {
                if chain == Chain::CameraTop {
                    Ok(camera)
                } else {
                    Ok(IDENTITY)
                }
            });
        let mut buffer = optical_buffer([0.0539, 0., 0.1944]);
        let mut out = Vec::new();
        assert_eq!(run(&mut proxy, &mut buffer, &config(), &mut out).unwrap(), 0);
        let report = String::from_utf8(out).unwrap();
        assert!(report.contains("       0.0539       "));
        assert!(report.ends_with("Test ok. Done\n"));
    }
}
