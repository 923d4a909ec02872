// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the [`TransformBroadcaster`] type.
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::trace;

use crate::exception::{create_network_exception, TfCheckException, TfCheckResult};
use crate::tf::listener::DEFAULT_TF_PORT;
use crate::tf::types::{StampedTransform, TfMessage, TransformStampedMsg};

/// Sends transforms as UDP datagrams to a [`TransformListener`](`crate::tf::TransformListener`).
pub struct TransformBroadcaster {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl TransformBroadcaster {
    /// # Arguments
    /// * `address` - host of the listener
    /// * `port` - port of the listener, [`DEFAULT_TF_PORT`] if `None`
    pub fn new(address: &str, port: Option<u16>) -> TfCheckResult<Self> {
        let address_str = format!("{}:{}", address, port.unwrap_or(DEFAULT_TF_PORT));
        let destination = address_str
            .to_socket_addrs()
            .map_err(create_network_exception)?
            .next()
            .ok_or_else(|| TfCheckException::NetworkException {
                message: format!("naotf: {} did not resolve to any address", address_str),
            })?;
        let bind_address = if destination.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_address).map_err(create_network_exception)?;
        Ok(TransformBroadcaster {
            socket,
            destination,
        })
    }

    pub fn send_transform(&self, transform: &StampedTransform) -> TfCheckResult<()> {
        self.send_transforms(std::slice::from_ref(transform), false)
    }

    /// Sends a transform that is valid at all times.
    pub fn send_static_transform(&self, transform: &StampedTransform) -> TfCheckResult<()> {
        self.send_transforms(std::slice::from_ref(transform), true)
    }

    /// Sends all transforms in one datagram.
    pub fn send_transforms(
        &self,
        transforms: &[StampedTransform],
        is_static: bool,
    ) -> TfCheckResult<()> {
        let message = TfMessage {
            transforms: transforms
                .iter()
                .map(|t| TransformStampedMsg::from_stamped(t, is_static))
                .collect(),
        };
        let bytes = bincode::serialize(&message).map_err(create_network_exception)?;
        self.socket
            .send_to(&bytes, self.destination)
            .map_err(create_network_exception)?;
        trace!(
            "sent {} transforms to {}",
            message.transforms.len(),
            self.destination
        );
        Ok(())
    }
}
