// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Keeps track of coordinate frames over time.
//!
//! * [buffer](`crate::tf::buffer`) - frame tree with time-stamped history, interpolation and
//!   extrapolation checks.
//! * [listener](`crate::tf::listener`) - fills a buffer from transforms received over UDP.
//! * [broadcaster](`crate::tf::broadcaster`) - sends transforms to a listener.
//! * [footprint](`crate::tf::footprint`) - derives the `base_footprint` frame from both soles.
use std::time::Duration;

use crate::exception::TfCheckResult;

pub mod broadcaster;
pub mod buffer;
pub mod footprint;
pub mod listener;
pub mod types;

pub use broadcaster::TransformBroadcaster;
pub use buffer::TransformBuffer;
pub use footprint::{BaseFootprintPublisher, FootprintFrames};
pub use listener::TransformListener;
pub use types::{StampedTransform, TfMessage, Time, TransformStampedMsg};

/// Looks up rigid transforms between named frames.
pub trait TransformLookup {
    /// Blocks until the transform from `source_frame` to `target_frame` can be resolved at
    /// `time` or `timeout` has elapsed.
    ///
    /// # Errors
    /// * [`TimeoutException`](`crate::exception::TfCheckException::TimeoutException`) carrying
    /// the reason why the transform could not be resolved.
    fn wait_for_transform(
        &mut self,
        target_frame: &str,
        source_frame: &str,
        time: Time,
        timeout: Duration,
    ) -> TfCheckResult<()>;

    /// Returns the pose of `source_frame` expressed in `target_frame` at `time`.
    /// [`Time::zero`] asks for the latest time at which the whole chain is known.
    fn lookup_transform(
        &mut self,
        target_frame: &str,
        source_frame: &str,
        time: Time,
    ) -> TfCheckResult<StampedTransform>;
}
