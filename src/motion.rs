// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the [`MotionProxy`] client handle and its TCP implementation.

pub(crate) mod service_types;
pub mod types;

use std::time::Duration;

use tracing::debug;

use crate::exception::{TfCheckException, TfCheckResult};
use crate::motion::service_types::{
    ChainRequest, ChainRequestWithHeader, ConnectRequest, ConnectRequestWithHeader,
    ConnectResponse, ConnectStatus, GetPositionResponse, GetTransformResponse, GetterStatus,
    MotionCommandEnum, COMMAND_PORT, MOTION_VERSION,
};
use crate::motion::types::{Chain, Space};
use crate::network::{Network, DEFAULT_RESPONSE_TIMEOUT};
use crate::utils::{FlatTransform, PoseVector};

pub use crate::motion::service_types::COMMAND_PORT as DEFAULT_MOTION_PORT;

/// Forward kinematics as reported by the robot's motion service.
#[cfg_attr(test, mockall::automock)]
pub trait MotionProxy {
    /// Position of the end of `chain` in `space` as x, y, z, roll, pitch, yaw.
    ///
    /// # Arguments
    /// * `use_sensors` - true for measured joint angles, false for the commanded ones.
    fn get_position(
        &mut self,
        chain: Chain,
        space: Space,
        use_sensors: bool,
    ) -> TfCheckResult<PoseVector>;

    /// Transform from `space` to the end of `chain`, flattened row-major.
    ///
    /// # Arguments
    /// * `use_sensors` - true for measured joint angles, false for the commanded ones.
    fn get_transform(
        &mut self,
        chain: Chain,
        space: Space,
        use_sensors: bool,
    ) -> TfCheckResult<FlatTransform>;
}

/// Maintains a network connection to the motion bridge running on the robot.
pub struct RemoteMotionProxy {
    network: Network,
    ri_version: Option<u16>,
}

impl RemoteMotionProxy {
    /// Establishes a connection with the motion bridge.
    /// # Arguments
    /// * `address` - IP/hostname of the robot.
    /// * `port` - TCP port of the motion bridge, 9559 if None.
    /// * `response_timeout` - how long to wait for each response, 5 seconds if None.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::TfCheckException::NetworkException`) if the connection cannot be established.
    /// * [`IncompatibleLibraryVersionError`](`crate::exception::TfCheckException::IncompatibleLibraryVersionError`) if the bridge speaks another protocol version.
    pub fn new(
        address: &str,
        port: Option<u16>,
        response_timeout: Option<Duration>,
    ) -> TfCheckResult<RemoteMotionProxy> {
        let mut proxy = RemoteMotionProxy {
            network: Network::new(
                address,
                port.unwrap_or(COMMAND_PORT),
                response_timeout.unwrap_or(DEFAULT_RESPONSE_TIMEOUT),
            )?,
            ri_version: None,
        };
        proxy.connect_motion(MOTION_VERSION)?;
        Ok(proxy)
    }

    fn connect_motion(&mut self, ri_version: u16) -> TfCheckResult<()> {
        let connect_command = ConnectRequestWithHeader {
            header: self.network.create_header(MotionCommandEnum::Connect),
            request: ConnectRequest::new(),
        };
        let command_id = self.network.tcp_send_request(connect_command)?;
        let connect_response: ConnectResponse =
            self.network.tcp_blocking_receive_response(command_id)?;
        match connect_response.status {
            ConnectStatus::Success => {
                debug!("motion bridge version {}", connect_response.version);
                self.ri_version = Some(connect_response.version);
                Ok(())
            }
            ConnectStatus::IncompatibleLibraryVersion => {
                Err(TfCheckException::IncompatibleLibraryVersionError {
                    server_version: connect_response.version,
                    library_version: ri_version,
                })
            }
        }
    }

    /// Returns the protocol version reported by the connected bridge.
    pub fn server_version(&self) -> Option<u16> {
        self.ri_version
    }

    fn send_chain_request(
        &mut self,
        command: MotionCommandEnum,
        chain: Chain,
        space: Space,
        use_sensors: bool,
    ) -> TfCheckResult<u32> {
        let request = ChainRequestWithHeader {
            header: self.network.create_header(command),
            request: ChainRequest::new(chain, space, use_sensors),
        };
        self.network.tcp_send_request(request)
    }
}

impl MotionProxy for RemoteMotionProxy {
    fn get_position(
        &mut self,
        chain: Chain,
        space: Space,
        use_sensors: bool,
    ) -> TfCheckResult<PoseVector> {
        let command_id =
            self.send_chain_request(MotionCommandEnum::GetPosition, chain, space, use_sensors)?;
        let response: GetPositionResponse =
            self.network.tcp_blocking_receive_response(command_id)?;
        handle_getter_status(response.status, "getPosition", chain)?;
        Ok(response.position)
    }

    fn get_transform(
        &mut self,
        chain: Chain,
        space: Space,
        use_sensors: bool,
    ) -> TfCheckResult<FlatTransform> {
        let command_id =
            self.send_chain_request(MotionCommandEnum::GetTransform, chain, space, use_sensors)?;
        let response: GetTransformResponse =
            self.network.tcp_blocking_receive_response(command_id)?;
        handle_getter_status(response.status, "getTransform", chain)?;
        Ok(response.transform)
    }
}

fn handle_getter_status(status: GetterStatus, command: &str, chain: Chain) -> TfCheckResult<()> {
    match status {
        GetterStatus::Success => Ok(()),
        GetterStatus::InvalidArgumentRejected => Err(TfCheckException::CommandException {
            message: format!(
                "naotf motion: {} rejected, invalid argument for chain {}",
                command, chain
            ),
        }),
        GetterStatus::CommandNotPossibleRejected => Err(TfCheckException::CommandException {
            message: format!(
                "naotf motion: {} rejected, command not possible for chain {}",
                command, chain
            ),
        }),
    }
}
