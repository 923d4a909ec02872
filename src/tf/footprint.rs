// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Derives the `base_footprint` frame: the point between both feet, on the ground, facing
//! the direction of the torso.
use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use tracing::debug;

use crate::exception::TfCheckResult;
use crate::tf::buffer::TransformBuffer;
use crate::tf::types::{StampedTransform, Time};

/// Frame names used to compute the footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintFrames {
    pub odom: String,
    pub base: String,
    pub left_foot: String,
    pub right_foot: String,
    pub footprint: String,
}

impl Default for FootprintFrames {
    fn default() -> Self {
        FootprintFrames {
            odom: "odom".to_string(),
            base: "base_link".to_string(),
            left_foot: "l_sole".to_string(),
            right_foot: "r_sole".to_string(),
            footprint: "base_footprint".to_string(),
        }
    }
}

/// Returns the footprint in the odometry frame.
///
/// The origin lies halfway between both soles at the height of the lower one. Its only rotation
/// is the yaw of `odom_to_base`.
pub fn compute_base_footprint(
    odom_to_left_foot: &Isometry3<f64>,
    odom_to_right_foot: &Isometry3<f64>,
    odom_to_base: &Isometry3<f64>,
) -> Isometry3<f64> {
    let left = odom_to_left_foot.translation.vector;
    let right = odom_to_right_foot.translation.vector;
    let mut origin = (left + right) / 2.;
    origin.z = left.z.min(right.z);
    let (_, _, yaw) = odom_to_base.rotation.euler_angles();
    Isometry3::from_parts(
        Translation3::from(origin),
        UnitQuaternion::from_euler_angles(0., 0., yaw),
    )
}

/// Keeps the footprint link of a [`TransformBuffer`] up to date.
#[derive(Debug, Clone, Default)]
pub struct BaseFootprintPublisher {
    frames: FootprintFrames,
    last_update: Option<Time>,
}

impl BaseFootprintPublisher {
    pub fn new(frames: FootprintFrames) -> Self {
        BaseFootprintPublisher {
            frames,
            last_update: None,
        }
    }

    /// true if `frame` is one of the inputs of the footprint.
    pub fn depends_on(&self, frame: &str) -> bool {
        let frame = frame.trim_start_matches('/');
        frame == self.frames.base
            || frame == self.frames.left_foot
            || frame == self.frames.right_foot
    }

    /// Inserts the link from the base to the footprint at `time`.
    ///
    /// Returns `None` without touching the buffer if the inputs are not yet available at
    /// `time` or the footprint for `time` was already inserted.
    pub fn update(
        &mut self,
        buffer: &mut TransformBuffer,
        time: Time,
    ) -> TfCheckResult<Option<StampedTransform>> {
        if self.last_update == Some(time) {
            return Ok(None);
        }
        let frames = &self.frames;
        let lookups = buffer
            .resolve_transform(&frames.odom, &frames.left_foot, time)
            .and_then(|left| {
                let right = buffer.resolve_transform(&frames.odom, &frames.right_foot, time)?;
                let base = buffer.resolve_transform(&frames.odom, &frames.base, time)?;
                Ok((left, right, base))
            });
        let (left, right, base) = match lookups {
            Ok(lookups) => lookups,
            Err(e) => {
                debug!("footprint inputs not available yet: {}", e);
                return Ok(None);
            }
        };
        let odom_to_footprint =
            compute_base_footprint(&left.transform, &right.transform, &base.transform);
        let footprint = StampedTransform::new(
            base.stamp,
            &frames.base,
            &frames.footprint,
            base.transform.inverse() * odom_to_footprint,
        );
        buffer.set_transform(&footprint, false)?;
        debug!(
            "published transform {} --> {}",
            footprint.frame_id, footprint.child_frame_id
        );
        self.last_update = Some(time);
        Ok(Some(footprint))
    }
}
