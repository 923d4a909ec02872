// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the [`TransformBuffer`] type.
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use nalgebra::{Isometry3, Translation3};
use tracing::{debug, warn};

use crate::exception::{TfCheckException, TfCheckResult};
use crate::tf::types::{StampedTransform, Time};
use crate::tf::TransformLookup;

/// How long transforms are kept after newer data arrived.
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(10);
const MAX_GRAPH_DEPTH: usize = 1000;

#[derive(Debug, Clone, Copy)]
struct Sample {
    stamp: Time,
    transform: Isometry3<f64>,
}

#[derive(Debug, Clone)]
struct FrameHistory {
    parent: String,
    /// sorted by stamp, oldest first
    samples: VecDeque<Sample>,
    is_static: bool,
}

impl FrameHistory {
    fn newest(&self) -> Option<&Sample> {
        self.samples.back()
    }
}

/// Frame tree with a time-stamped history per link.
///
/// Every frame has at most one parent. A link stores the pose of the child in its parent frame.
#[derive(Debug, Clone)]
pub struct TransformBuffer {
    frames: HashMap<String, FrameHistory>,
    cache_time: Duration,
}

impl Default for TransformBuffer {
    fn default() -> Self {
        TransformBuffer::new()
    }
}

fn strip_slash(frame: &str) -> &str {
    frame.trim_start_matches('/')
}

impl TransformBuffer {
    pub fn new() -> Self {
        TransformBuffer::with_cache_time(DEFAULT_CACHE_TIME)
    }

    pub fn with_cache_time(cache_time: Duration) -> Self {
        TransformBuffer {
            frames: HashMap::new(),
            cache_time,
        }
    }

    /// Adds a link to the tree.
    ///
    /// A static link is valid at all times and replaces any history of the child. Data older than
    /// the cache time relative to the newest sample of the child is ignored.
    ///
    /// # Errors
    /// * [`InvalidArgument`](`crate::exception::TfCheckException::InvalidArgument`) if a frame
    /// id is empty or the child is its own parent.
    pub fn set_transform(
        &mut self,
        transform: &StampedTransform,
        is_static: bool,
    ) -> TfCheckResult<()> {
        let parent = strip_slash(&transform.frame_id);
        let child = strip_slash(&transform.child_frame_id);
        if parent.is_empty() || child.is_empty() {
            return Err(TfCheckException::InvalidArgument {
                message: format!(
                    "naotf: transform from \"{}\" to \"{}\" has an empty frame id",
                    transform.frame_id, transform.child_frame_id
                ),
            });
        }
        if parent == child {
            return Err(TfCheckException::InvalidArgument {
                message: format!(
                    "naotf: ignoring transform with frame_id and child_frame_id \"{}\"",
                    child
                ),
            });
        }
        let sample = Sample {
            stamp: transform.stamp,
            transform: transform.transform,
        };
        let cache_time = self.cache_time;
        let history = self
            .frames
            .entry(child.to_string())
            .or_insert_with(|| FrameHistory {
                parent: parent.to_string(),
                samples: VecDeque::new(),
                is_static,
            });
        if history.parent != parent || history.is_static != is_static || is_static {
            if history.parent != parent {
                debug!(
                    "frame {} changed parent from {} to {}",
                    child, history.parent, parent
                );
            }
            history.parent = parent.to_string();
            history.is_static = is_static;
            history.samples.clear();
        }
        if let Some(newest) = history.newest() {
            if sample.stamp + cache_time < newest.stamp {
                warn!(
                    "ignoring data for {} at {} which is older than the cache ({})",
                    child, sample.stamp, newest.stamp
                );
                return Ok(());
            }
        }
        let index = history
            .samples
            .iter()
            .position(|s| s.stamp >= sample.stamp)
            .unwrap_or_else(|| history.samples.len());
        let same_stamp = history
            .samples
            .get(index)
            .map_or(false, |existing| existing.stamp == sample.stamp);
        if same_stamp {
            history.samples[index] = sample;
        } else {
            history.samples.insert(index, sample);
        }
        if let Some(newest) = history.newest().map(|s| s.stamp) {
            while history.samples.len() > 1
                && history
                    .samples
                    .front()
                    .map_or(false, |oldest| oldest.stamp + cache_time < newest)
            {
                history.samples.pop_front();
            }
        }
        Ok(())
    }

    /// true if the frame appears as a child or as a parent in the tree.
    pub fn frame_exists(&self, frame: &str) -> bool {
        let frame = strip_slash(frame);
        self.frames.contains_key(frame) || self.frames.values().any(|h| h.parent == frame)
    }

    /// All known frames, sorted.
    pub fn all_frames(&self) -> Vec<String> {
        let mut frames: Vec<String> = self
            .frames
            .iter()
            .flat_map(|(child, history)| vec![child.clone(), history.parent.clone()])
            .collect();
        frames.sort();
        frames.dedup();
        frames
    }

    /// true if [`TransformBuffer::resolve_transform`] would succeed.
    pub fn can_transform(&self, target_frame: &str, source_frame: &str, time: Time) -> bool {
        self.resolve_transform(target_frame, source_frame, time)
            .is_ok()
    }

    /// Newest time at which every non-static link between both frames has data.
    /// Returns [`Time::zero`] if all links are static or both frames are equal.
    pub fn latest_common_time(&self, target_frame: &str, source_frame: &str) -> TfCheckResult<Time> {
        let (source_links, target_links) = self.links_between(target_frame, source_frame)?;
        self.latest_common_time_of(source_links.iter().chain(target_links.iter()))
    }

    /// Returns the pose of `source_frame` expressed in `target_frame` at `time`.
    ///
    /// # Errors
    /// * [`LookupException`](`crate::exception::TfCheckException::LookupException`) if a frame is unknown.
    /// * [`ConnectivityException`](`crate::exception::TfCheckException::ConnectivityException`) if the frames are in different trees.
    /// * [`ExtrapolationException`](`crate::exception::TfCheckException::ExtrapolationException`) if `time` is not covered by the history.
    pub fn resolve_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: Time,
    ) -> TfCheckResult<StampedTransform> {
        let target = strip_slash(target_frame);
        let source = strip_slash(source_frame);
        let (source_links, target_links) = self.links_between(target, source)?;
        let time = if time.is_zero() {
            self.latest_common_time_of(source_links.iter().chain(target_links.iter()))?
        } else {
            time
        };
        let ancestor_to_source = self.compose(&source_links, time, target, source)?;
        let ancestor_to_target = self.compose(&target_links, time, target, source)?;
        Ok(StampedTransform::new(
            time,
            target,
            source,
            ancestor_to_target.inverse() * ancestor_to_source,
        ))
    }

    /// Child frames on the way from each frame up to their common ancestor (exclusive).
    fn links_between(&self, target: &str, source: &str) -> TfCheckResult<(Vec<String>, Vec<String>)> {
        let target = strip_slash(target);
        let source = strip_slash(source);
        if !self.frame_exists(target) {
            return Err(TfCheckException::LookupException {
                message: format!(
                    "\"{}\" passed to lookupTransform argument target_frame does not exist. ",
                    target
                ),
            });
        }
        if !self.frame_exists(source) {
            return Err(TfCheckException::LookupException {
                message: format!(
                    "\"{}\" passed to lookupTransform argument source_frame does not exist. ",
                    source
                ),
            });
        }
        let source_chain = self.chain_to_root(source)?;
        let target_chain = self.chain_to_root(target)?;
        let (source_index, target_index) = source_chain
            .iter()
            .enumerate()
            .find_map(|(i, frame)| {
                target_chain
                    .iter()
                    .position(|other| other == frame)
                    .map(|j| (i, j))
            })
            .ok_or_else(|| TfCheckException::ConnectivityException {
                message: format!(
                    "Could not find a connection between '{}' and '{}' because they are not part of the same tree. Tf has two or more unconnected trees.",
                    target, source
                ),
            })?;
        Ok((
            source_chain[..source_index].to_vec(),
            target_chain[..target_index].to_vec(),
        ))
    }

    /// The frame itself followed by all of its ancestors.
    fn chain_to_root(&self, frame: &str) -> TfCheckResult<Vec<String>> {
        let mut chain = vec![frame.to_string()];
        let mut current = frame;
        while let Some(history) = self.frames.get(current) {
            current = &history.parent;
            chain.push(current.to_string());
            if chain.len() > MAX_GRAPH_DEPTH {
                return Err(TfCheckException::ConnectivityException {
                    message: format!(
                        "The tf tree is invalid because it contains a loop. Started at {}",
                        frame
                    ),
                });
            }
        }
        Ok(chain)
    }

    fn latest_common_time_of<'a, I: Iterator<Item = &'a String>>(
        &self,
        links: I,
    ) -> TfCheckResult<Time> {
        let mut common: Option<Time> = None;
        for child in links {
            let history = self.history(child)?;
            if history.is_static {
                continue;
            }
            if let Some(newest) = history.newest() {
                common = Some(common.map_or(newest.stamp, |c| c.min(newest.stamp)));
            }
        }
        Ok(common.unwrap_or_else(Time::zero))
    }

    fn history(&self, child: &str) -> TfCheckResult<&FrameHistory> {
        self.frames
            .get(child)
            .ok_or_else(|| TfCheckException::LookupException {
                message: format!("Frame id {} does not exist!", child),
            })
    }

    /// Pose of the first link's child in the parent of the last link.
    fn compose(
        &self,
        links: &[String],
        time: Time,
        target: &str,
        source: &str,
    ) -> TfCheckResult<Isometry3<f64>> {
        let mut accumulated = Isometry3::identity();
        for child in links {
            accumulated = self.link_at(child, time, target, source)? * accumulated;
        }
        Ok(accumulated)
    }

    /// parent_T_child of one link at `time`, interpolated between neighbouring samples.
    fn link_at(
        &self,
        child: &str,
        time: Time,
        target: &str,
        source: &str,
    ) -> TfCheckResult<Isometry3<f64>> {
        let history = self.history(child)?;
        let (oldest, newest) = match (history.samples.front(), history.samples.back()) {
            (Some(oldest), Some(newest)) => (oldest, newest),
            _ => {
                return Err(TfCheckException::LookupException {
                    message: format!("Frame id {} has no data", child),
                })
            }
        };
        if history.is_static || time.is_zero() {
            return Ok(newest.transform);
        }
        if history.samples.len() == 1 {
            if newest.stamp == time {
                return Ok(newest.transform);
            }
            return Err(TfCheckException::ExtrapolationException {
                message: format!(
                    "Lookup would require extrapolation at time {}, but only time {} is in the buffer, when looking up transform from frame [{}] to frame [{}]",
                    time, newest.stamp, source, target
                ),
            });
        }
        if time > newest.stamp {
            return Err(TfCheckException::ExtrapolationException {
                message: format!(
                    "Lookup would require extrapolation into the future.  Requested time {} but the latest data is at time {}, when looking up transform from frame [{}] to frame [{}]",
                    time, newest.stamp, source, target
                ),
            });
        }
        if time < oldest.stamp {
            return Err(TfCheckException::ExtrapolationException {
                message: format!(
                    "Lookup would require extrapolation into the past.  Requested time {} but the earliest data is at time {}, when looking up transform from frame [{}] to frame [{}]",
                    time, oldest.stamp, source, target
                ),
            });
        }
        let upper = history
            .samples
            .iter()
            .position(|s| s.stamp >= time)
            .unwrap_or(history.samples.len() - 1);
        let after = &history.samples[upper];
        if after.stamp == time || upper == 0 {
            return Ok(after.transform);
        }
        let before = &history.samples[upper - 1];
        let ratio = (time.to_nanos() - before.stamp.to_nanos()) as f64
            / (after.stamp.to_nanos() - before.stamp.to_nanos()) as f64;
        Ok(interpolate(&before.transform, &after.transform, ratio))
    }
}

/// Linear interpolation of the translation, spherical interpolation of the rotation.
fn interpolate(a: &Isometry3<f64>, b: &Isometry3<f64>, ratio: f64) -> Isometry3<f64> {
    let translation = a
        .translation
        .vector
        .lerp(&b.translation.vector, ratio);
    let rotation = a
        .rotation
        .try_slerp(&b.rotation, ratio, 1.0e-9)
        .unwrap_or_else(|| a.rotation.nlerp(&b.rotation, ratio));
    Isometry3::from_parts(Translation3::from(translation), rotation)
}

impl TransformLookup for TransformBuffer {
    /// No new data can arrive while waiting on a plain buffer, so this returns immediately.
    fn wait_for_transform(
        &mut self,
        target_frame: &str,
        source_frame: &str,
        time: Time,
        timeout: Duration,
    ) -> TfCheckResult<()> {
        self.resolve_transform(target_frame, source_frame, time)
            .map(|_| ())
            .map_err(|e| TfCheckException::TimeoutException {
                message: format!(
                    "Could not transform from {} to {} within {:?}: {}",
                    source_frame, target_frame, timeout, e
                ),
            })
    }

    fn lookup_transform(
        &mut self,
        target_frame: &str,
        source_frame: &str,
        time: Time,
    ) -> TfCheckResult<StampedTransform> {
        self.resolve_transform(target_frame, source_frame, time)
    }
}
