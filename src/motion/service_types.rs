// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

use std::fmt::Debug;

use serde::Deserialize;
use serde::Serialize;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::motion::types::{Chain, Space};
use crate::network::MessageCommand;
use crate::utils::{FlatTransform, PoseVector};

pub const MOTION_VERSION: u16 = 1;
pub const COMMAND_PORT: u16 = 9559;
/// bincode size of a [`MotionCommandHeader`]
pub const HEADER_SIZE: usize = 12;

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq)]
#[repr(u32)]
pub enum MotionCommandEnum {
    Connect,
    GetPosition,
    GetTransform,
}

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
pub enum ConnectStatus {
    Success,
    IncompatibleLibraryVersion,
}

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
pub enum GetterStatus {
    Success,
    InvalidArgumentRejected,
    CommandNotPossibleRejected,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct MotionCommandHeader {
    pub command: MotionCommandEnum,
    pub command_id: u32,
    pub size: u32,
}

impl MotionCommandHeader {
    pub fn new(command: MotionCommandEnum, command_id: u32, size: u32) -> MotionCommandHeader {
        MotionCommandHeader {
            command,
            command_id,
            size,
        }
    }
}

impl MessageCommand for MotionCommandHeader {
    fn get_command_message_id(&self) -> u32 {
        self.command_id
    }
    fn set_message_size(&mut self, size: u32) {
        self.size = size;
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ConnectRequest {
    pub version: u16,
}

impl ConnectRequest {
    pub fn new() -> Self {
        ConnectRequest {
            version: MOTION_VERSION,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ConnectRequestWithHeader {
    pub header: MotionCommandHeader,
    pub request: ConnectRequest,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ConnectResponse {
    pub header: MotionCommandHeader,
    pub status: ConnectStatus,
    pub version: u16,
}

/// Body shared by `GetPosition` and `GetTransform`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ChainRequest {
    pub chain: Chain,
    pub space: Space,
    pub use_sensors: bool,
}

impl ChainRequest {
    pub fn new(chain: Chain, space: Space, use_sensors: bool) -> Self {
        ChainRequest {
            chain,
            space,
            use_sensors,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ChainRequestWithHeader {
    pub header: MotionCommandHeader,
    pub request: ChainRequest,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct GetPositionResponse {
    pub header: MotionCommandHeader,
    pub status: GetterStatus,
    pub position: PoseVector,
}

/// `transform` is row-major.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct GetTransformResponse {
    pub header: MotionCommandHeader,
    pub status: GetterStatus,
    pub transform: FlatTransform,
}

macro_rules! impl_message_command {
    ($($message:ty),*) => {
        $(
            impl MessageCommand for $message {
                fn get_command_message_id(&self) -> u32 {
                    self.header.get_command_message_id()
                }
                fn set_message_size(&mut self, size: u32) {
                    self.header.set_message_size(size);
                }
            }
        )*
    };
}

impl_message_command!(
    ConnectRequestWithHeader,
    ConnectResponse,
    ChainRequestWithHeader,
    GetPositionResponse,
    GetTransformResponse
);
