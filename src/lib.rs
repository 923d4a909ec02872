// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # naotf
//! naotf checks that the pose of a NAO camera computed by the robot's motion service agrees with
//! the pose published in the frame tree.
//!
//! Both transforms are computed independently. The motion service reports forward kinematics for
//! a kinematic chain, the frame tree resolves the transform between two named frames. After
//! rotating the kinematic result into the optical frame convention of the camera, both matrices
//! must differ by at most [`TOLERANCE`](`crate::comparator::TOLERANCE`) in Frobenius norm.
//!
//! ## Design
//! The library is divided into these modules:
//! * [motion](`crate::motion`) - client of the motion bridge running on the robot.
//! * [tf](`crate::tf`) - frame tree with history, a UDP listener and broadcaster and the
//!   `base_footprint` publisher.
//! * [comparator](`crate::comparator`) - the individual steps of the check.
//! * [check](`crate::check`) - the complete check which prints a report.
//!
//! # Example:
//!```no_run
//! use naotf::check::{run, CheckConfig};
//! use naotf::motion::RemoteMotionProxy;
//! use naotf::tf::TransformListener;
//! use naotf::TfCheckResult;
//! fn main() -> TfCheckResult<()> {
//!     let mut listener = TransformListener::new("0.0.0.0", None, None)?;
//!     let mut proxy = RemoteMotionProxy::new("ra.local", None, None)?;
//!     let code = run(&mut proxy, &mut listener, &CheckConfig::default(), &mut std::io::stdout())?;
//!     std::process::exit(code);
//! }
//! ```
//!
//! The main function returns a TfCheckResult<()> which means that it returns either Ok(())
//! or an Error of type TfCheckException.
//!
//! Both clients are generic parameters bounded by [`MotionProxy`](`crate::motion::MotionProxy`)
//! and [`TransformLookup`](`crate::tf::TransformLookup`), so the check can run against
//! recorded or simulated data:
//!```
//! use naotf::comparator::{compare, lookup_to_matrix, optical_frame_correction, Verdict};
//! let tf = lookup_to_matrix(&[0., 0., 0.], &[-0.5, 0.5, -0.5, 0.5]);
//! assert_eq!(compare(&optical_frame_correction(), &tf).verdict, Verdict::Pass);
//! ```
pub mod check;
pub mod comparator;
pub mod exception;
pub mod motion;
mod network;
pub mod tf;
pub mod utils;

pub use check::{CheckConfig, LOOKUP_FAILURE_EXIT_CODE};
pub use comparator::{Comparison, Verdict, TOLERANCE};
pub use exception::{TfCheckException, TfCheckResult};
pub use motion::types::{Chain, Space};
pub use motion::{MotionProxy, RemoteMotionProxy};
pub use tf::{TransformBuffer, TransformListener, TransformLookup};
pub use utils::*;
