// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the reference spaces and kinematic chains understood by the motion service.
use std::fmt;
use std::str::FromStr;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::exception::TfCheckException;

/// Coordinate system in which the motion service expresses positions and transforms.
#[derive(Serialize_repr, Deserialize_repr, FromPrimitive, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum Space {
    /// relative to the torso
    Torso = 0,
    /// relative to the odometry origin
    World = 1,
    /// relative to the robot's footprint on the ground
    Robot = 2,
}

impl Space {
    /// Name used by the motion service documentation for this space.
    pub fn name(&self) -> &'static str {
        match self {
            Space::Torso => "Torso",
            Space::World => "Odom",
            Space::Robot => "BaseFootprint",
        }
    }
    /// Frame of the TF tree that corresponds to this space.
    pub fn tf_frame(&self) -> &'static str {
        match self {
            Space::Torso => "Torso_link",
            Space::World => "odom",
            Space::Robot => "base_footprint",
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Space {
    type Err = TfCheckException;

    /// Accepts the numeric code of the motion service or a case-insensitive name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u32>() {
            return Space::from_u32(code).ok_or_else(|| TfCheckException::InvalidArgument {
                message: format!("naotf: unknown space code {}", code),
            });
        }
        match s.to_ascii_lowercase().as_str() {
            "torso" => Ok(Space::Torso),
            "world" | "odom" => Ok(Space::World),
            "robot" | "nao" | "basefootprint" | "base_footprint" => Ok(Space::Robot),
            _ => Err(TfCheckException::InvalidArgument {
                message: format!("naotf: unknown space \"{}\"", s),
            }),
        }
    }
}

/// Kinematic chains and effectors the motion service can report.
#[derive(Serialize_repr, Deserialize_repr, FromPrimitive, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum Chain {
    Head,
    LArm,
    LLeg,
    RLeg,
    RArm,
    Torso,
    CameraTop,
    CameraBottom,
}

impl Chain {
    /// All chains in wire order.
    pub const ALL: [Chain; 8] = [
        Chain::Head,
        Chain::LArm,
        Chain::LLeg,
        Chain::RLeg,
        Chain::RArm,
        Chain::Torso,
        Chain::CameraTop,
        Chain::CameraBottom,
    ];

    /// Name of the chain as spelled by the motion service.
    pub fn name(&self) -> &'static str {
        match self {
            Chain::Head => "Head",
            Chain::LArm => "LArm",
            Chain::LLeg => "LLeg",
            Chain::RLeg => "RLeg",
            Chain::RArm => "RArm",
            Chain::Torso => "Torso",
            Chain::CameraTop => "CameraTop",
            Chain::CameraBottom => "CameraBottom",
        }
    }

    /// Frame of the TF tree attached to the end of this chain.
    ///
    /// Cameras publish a dedicated `_frame`, all other chains end in a `_link`.
    pub fn tf_frame(&self) -> String {
        match self {
            Chain::CameraTop | Chain::CameraBottom => format!("{}_frame", self.name()),
            _ => format!("{}_link", self.name()),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Chain {
    type Err = TfCheckException;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chain::ALL
            .iter()
            .find(|chain| chain.name() == s)
            .copied()
            .ok_or_else(|| TfCheckException::InvalidArgument {
                message: format!(
                    "naotf: unknown chain \"{}\", expected one of {}",
                    s,
                    Chain::ALL
                        .iter()
                        .map(|c| c.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
    }
}

#[cfg(test)]
mod tests {
    use crate::motion::types::{Chain, Space};
    use std::str::FromStr;

    #[test]
    fn space_names_and_frames() {
        assert_eq!(Space::Torso.to_string(), "Torso");
        assert_eq!(Space::World.to_string(), "Odom");
        assert_eq!(Space::Robot.to_string(), "BaseFootprint");
        assert_eq!(Space::Torso.tf_frame(), "Torso_link");
        assert_eq!(Space::World.tf_frame(), "odom");
        assert_eq!(Space::Robot.tf_frame(), "base_footprint");
    }

    #[test]
    fn space_from_names_and_codes() {
        assert_eq!(Space::from_str("torso").unwrap(), Space::Torso);
        assert_eq!(Space::from_str("WORLD").unwrap(), Space::World);
        assert_eq!(Space::from_str("2").unwrap(), Space::Robot);
        assert!(Space::from_str("3").is_err());
        assert!(Space::from_str("camera").is_err());
    }

    #[test]
    fn chain_names_are_case_sensitive() {
        assert_eq!(Chain::from_str("CameraTop").unwrap(), Chain::CameraTop);
        assert_eq!(Chain::from_str("Head").unwrap(), Chain::Head);
        assert!(Chain::from_str("head").is_err());
        assert_eq!(Chain::CameraTop.tf_frame(), "CameraTop_frame");
        assert_eq!(Chain::Head.tf_frame(), "Head_link");
    }
}
