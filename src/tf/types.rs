// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains time stamps, stamped transforms and their wire representation.
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::exception::{TfCheckException, TfCheckResult};

const NANOS_PER_SEC: u64 = 1_000_000_000;
const MIN_QUATERNION_NORM: f64 = 1e-9;

/// Seconds and nanoseconds since the epoch. [`Time::zero`] stands for "latest available".
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Time {
    pub sec: u32,
    pub nsec: u32,
}

impl Time {
    pub fn new(sec: u32, nsec: u32) -> Self {
        Time::from_nanos(sec as u64 * NANOS_PER_SEC + nsec as u64)
    }
    pub fn zero() -> Self {
        Time { sec: 0, nsec: 0 }
    }
    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.nsec == 0
    }
    /// Saturates at the largest representable time.
    pub fn from_nanos(nanos: u64) -> Self {
        let sec = nanos / NANOS_PER_SEC;
        if sec > u32::MAX as u64 {
            return Time {
                sec: u32::MAX,
                nsec: (NANOS_PER_SEC - 1) as u32,
            };
        }
        Time {
            sec: sec as u32,
            nsec: (nanos % NANOS_PER_SEC) as u32,
        }
    }
    pub fn to_nanos(&self) -> u64 {
        self.sec as u64 * NANOS_PER_SEC + self.nsec as u64
    }
    /// Negative or non-finite seconds map to zero.
    pub fn from_sec(sec: f64) -> Self {
        if !sec.is_finite() || sec <= 0. {
            return Time::zero();
        }
        Time::from_nanos((sec * NANOS_PER_SEC as f64).round() as u64)
    }
}

impl Add<Duration> for Time {
    type Output = Time;
    fn add(self, rhs: Duration) -> Self::Output {
        Time::from_nanos(self.to_nanos().saturating_add(rhs.as_nanos() as u64))
    }
}

impl Sub<Duration> for Time {
    type Output = Time;
    fn sub(self, rhs: Duration) -> Self::Output {
        Time::from_nanos(self.to_nanos().saturating_sub(rhs.as_nanos() as u64))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

/// Pose of `child_frame_id` expressed in `frame_id` at `stamp`.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedTransform {
    pub stamp: Time,
    pub frame_id: String,
    pub child_frame_id: String,
    pub transform: Isometry3<f64>,
}

impl StampedTransform {
    pub fn new(
        stamp: Time,
        frame_id: &str,
        child_frame_id: &str,
        transform: Isometry3<f64>,
    ) -> Self {
        StampedTransform {
            stamp,
            frame_id: frame_id.to_string(),
            child_frame_id: child_frame_id.to_string(),
            transform,
        }
    }

    /// # Arguments
    /// * `rotation` - quaternion as `[x, y, z, w]`, normalized on construction.
    pub fn from_parts(
        stamp: Time,
        frame_id: &str,
        child_frame_id: &str,
        translation: &[f64; 3],
        rotation: &[f64; 4],
    ) -> Self {
        let transform = Isometry3::from_parts(
            Translation3::new(translation[0], translation[1], translation[2]),
            UnitQuaternion::from_quaternion(Quaternion::new(
                rotation[3],
                rotation[0],
                rotation[1],
                rotation[2],
            )),
        );
        StampedTransform::new(stamp, frame_id, child_frame_id, transform)
    }

    pub fn translation(&self) -> [f64; 3] {
        let t: Vector3<f64> = self.transform.translation.vector;
        [t.x, t.y, t.z]
    }

    /// Quaternion as `[x, y, z, w]`.
    pub fn rotation(&self) -> [f64; 4] {
        let q = self.transform.rotation;
        [q.i, q.j, q.k, q.w]
    }
}

/// One transform as sent over the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransformStampedMsg {
    pub stamp: Time,
    pub frame_id: String,
    pub child_frame_id: String,
    pub translation: [f64; 3],
    /// `[x, y, z, w]`
    pub rotation: [f64; 4],
    pub is_static: bool,
}

impl TransformStampedMsg {
    pub fn from_stamped(transform: &StampedTransform, is_static: bool) -> Self {
        TransformStampedMsg {
            stamp: transform.stamp,
            frame_id: transform.frame_id.clone(),
            child_frame_id: transform.child_frame_id.clone(),
            translation: transform.translation(),
            rotation: transform.rotation(),
            is_static,
        }
    }

    /// Rejects non-finite values and rotations that cannot be normalized.
    pub fn validate(&self) -> TfCheckResult<()> {
        let finite = self
            .translation
            .iter()
            .chain(self.rotation.iter())
            .all(|v| v.is_finite());
        let norm = self.rotation.iter().map(|v| v * v).sum::<f64>().sqrt();
        if !finite || norm < MIN_QUATERNION_NORM {
            return Err(TfCheckException::InvalidArgument {
                message: format!(
                    "naotf: invalid transform from \"{}\" to \"{}\": translation {:?}, rotation {:?}",
                    self.frame_id, self.child_frame_id, self.translation, self.rotation
                ),
            });
        }
        Ok(())
    }
}

impl From<&TransformStampedMsg> for StampedTransform {
    fn from(msg: &TransformStampedMsg) -> Self {
        StampedTransform::from_parts(
            msg.stamp,
            &msg.frame_id,
            &msg.child_frame_id,
            &msg.translation,
            &msg.rotation,
        )
    }
}

/// Payload of one datagram.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TfMessage {
    pub transforms: Vec<TransformStampedMsg>,
}

#[cfg(test)]
mod tests {
    use crate::tf::types::{StampedTransform, Time, TransformStampedMsg};
    use std::time::Duration;

    #[test]
    fn time_arithmetic() {
        let t = Time::new(3, 1_500_000_000);
        assert_eq!(t, Time::new(4, 500_000_000));
        assert_eq!(t + Duration::from_millis(600), Time::new(5, 100_000_000));
        assert_eq!(t - Duration::from_secs(10), Time::zero());
        assert_eq!(Time::from_sec(1.25), Time::new(1, 250_000_000));
        assert_eq!(Time::from_sec(-1.), Time::zero());
        assert!(Time::new(1, 0) < Time::new(1, 1));
        assert_eq!(Time::new(2, 5).to_string(), "2.000000005");
    }

    #[test]
    fn time_saturates_at_the_end_of_the_range() {
        let late = Time::new(u32::MAX - 5, 0);
        let later = late + Duration::from_secs(10);
        assert_eq!(later.sec, u32::MAX);
        assert!(later > late);
        assert_eq!(later + Duration::from_secs(1), later);
        assert!(late + Duration::from_secs(10) >= Time::new(u32::MAX - 1, 0));
    }

    #[test]
    fn invalid_messages_are_rejected() {
        let valid = TransformStampedMsg {
            stamp: Time::new(1, 0),
            frame_id: "Torso_link".to_string(),
            child_frame_id: "CameraTop_frame".to_string(),
            translation: [0.05, 0., 0.19],
            rotation: [0., 0., 0., 2.],
            is_static: false,
        };
        assert!(valid.validate().is_ok());
        let zero_rotation = TransformStampedMsg {
            rotation: [0., 0., 0., 0.],
            ..valid.clone()
        };
        assert!(zero_rotation.validate().is_err());
        let nan_rotation = TransformStampedMsg {
            rotation: [f64::NAN, 0., 0., 1.],
            ..valid.clone()
        };
        assert!(nan_rotation.validate().is_err());
        let infinite_translation = TransformStampedMsg {
            translation: [f64::INFINITY, 0., 0.],
            ..valid
        };
        assert!(infinite_translation.validate().is_err());
    }

    #[test]
    fn message_keeps_translation_and_rotation() {
        let stamped = StampedTransform::from_parts(
            Time::new(10, 0),
            "Torso_link",
            "Head_link",
            &[0., 0., 0.1265],
            &[0., 0., 0., 1.],
        );
        let msg = TransformStampedMsg::from_stamped(&stamped, false);
        assert_eq!(msg.translation, [0., 0., 0.1265]);
        assert_eq!(msg.rotation, [0., 0., 0., 1.]);
        assert_eq!(StampedTransform::from(&msg), stamped);
    }
}
