// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the [`TransformListener`] type.
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, trace, warn};

use crate::exception::{create_network_exception, TfCheckException, TfCheckResult};
use crate::tf::buffer::{TransformBuffer, DEFAULT_CACHE_TIME};
use crate::tf::footprint::BaseFootprintPublisher;
use crate::tf::types::{StampedTransform, TfMessage, Time};
use crate::tf::TransformLookup;

/// UDP port transforms are published to.
pub const DEFAULT_TF_PORT: u16 = 11511;

const LISTENER: Token = Token(0);
const POLL_SLICE: Duration = Duration::from_millis(10);
const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Receives transforms over UDP and stores them in a [`TransformBuffer`].
pub struct TransformListener {
    buffer: TransformBuffer,
    socket: UdpSocket,
    poll: Poll,
    events: Events,
    footprint: Option<BaseFootprintPublisher>,
    datagram: Vec<u8>,
}

impl TransformListener {
    /// Binds the listening socket.
    ///
    /// # Arguments
    /// * `bind_address` - local address to listen on, e.g. `"0.0.0.0"`
    /// * `port` - [`DEFAULT_TF_PORT`] if `None`, 0 picks a free port
    /// * `cache_time` - how much history to keep, [`DEFAULT_CACHE_TIME`] if `None`
    pub fn new(
        bind_address: &str,
        port: Option<u16>,
        cache_time: Option<Duration>,
    ) -> TfCheckResult<Self> {
        let address_str = format!("{}:{}", bind_address, port.unwrap_or(DEFAULT_TF_PORT));
        let address: SocketAddr = address_str
            .to_socket_addrs()
            .map_err(create_network_exception)?
            .next()
            .ok_or_else(|| TfCheckException::NetworkException {
                message: format!("naotf: {} did not resolve to any address", address_str),
            })?;
        let mut socket = UdpSocket::bind(address).map_err(|e| {
            TfCheckException::NetworkException {
                message: format!("naotf: could not listen for transforms on {}: {}", address, e),
            }
        })?;
        let poll = Poll::new().map_err(create_network_exception)?;
        poll.registry()
            .register(&mut socket, LISTENER, Interest::READABLE)
            .map_err(create_network_exception)?;
        debug!("listening for transforms on {}", address);
        Ok(TransformListener {
            buffer: TransformBuffer::with_cache_time(cache_time.unwrap_or(DEFAULT_CACHE_TIME)),
            socket,
            poll,
            events: Events::with_capacity(16),
            footprint: None,
            datagram: vec![0_u8; MAX_DATAGRAM_SIZE],
        })
    }

    /// Also derive the footprint frame whenever new sole or base data arrives.
    pub fn with_base_footprint(mut self, publisher: BaseFootprintPublisher) -> Self {
        self.footprint = Some(publisher);
        self
    }

    pub fn local_port(&self) -> TfCheckResult<u16> {
        Ok(self
            .socket
            .local_addr()
            .map_err(create_network_exception)?
            .port())
    }

    pub fn buffer(&self) -> &TransformBuffer {
        &self.buffer
    }

    /// Waits up to `timeout` for datagrams and inserts every transform received.
    /// Returns the number of transforms inserted.
    pub fn spin_once(&mut self, timeout: Duration) -> TfCheckResult<usize> {
        self.poll
            .poll(&mut self.events, Some(timeout))
            .map_err(create_network_exception)?;
        let mut inserted = 0;
        let mut footprint_time: Option<Time> = None;
        loop {
            let (size, sender) = match self.socket.recv_from(&mut self.datagram) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(create_network_exception(e)),
            };
            let message: TfMessage = match bincode::deserialize(&self.datagram[..size]) {
                Ok(message) => message,
                Err(e) => {
                    warn!("ignoring malformed datagram from {}: {}", sender, e);
                    continue;
                }
            };
            trace!("received {} transforms from {}", message.transforms.len(), sender);
            for msg in message.transforms.iter() {
                if let Err(e) = msg.validate() {
                    warn!("dropping transform from {}: {}", sender, e);
                    continue;
                }
                let transform = StampedTransform::from(msg);
                if let Err(e) = self.buffer.set_transform(&transform, msg.is_static) {
                    warn!("{}", e);
                    continue;
                }
                inserted += 1;
                let updates_footprint = self
                    .footprint
                    .as_ref()
                    .map_or(false, |f| f.depends_on(&transform.child_frame_id));
                if updates_footprint && !msg.is_static {
                    footprint_time = Some(
                        footprint_time.map_or(transform.stamp, |t| t.max(transform.stamp)),
                    );
                }
            }
        }
        if let (Some(publisher), Some(time)) = (self.footprint.as_mut(), footprint_time) {
            publisher.update(&mut self.buffer, time)?;
        }
        Ok(inserted)
    }
}

impl TransformLookup for TransformListener {
    fn wait_for_transform(
        &mut self,
        target_frame: &str,
        source_frame: &str,
        time: Time,
        timeout: Duration,
    ) -> TfCheckResult<()> {
        let deadline = Instant::now() + timeout;
        self.spin_once(Duration::from_millis(0))?;
        loop {
            let reason = match self.buffer.resolve_transform(target_frame, source_frame, time) {
                Ok(_) => return Ok(()),
                Err(e) => e,
            };
            let now = Instant::now();
            if now >= deadline {
                return Err(TfCheckException::TimeoutException {
                    message: format!(
                        "Could not transform from {} to {} within {:?}: {}",
                        source_frame, target_frame, timeout, reason
                    ),
                });
            }
            self.spin_once(POLL_SLICE.min(deadline - now))?;
        }
    }

    fn lookup_transform(
        &mut self,
        target_frame: &str,
        source_frame: &str,
        time: Time,
    ) -> TfCheckResult<StampedTransform> {
        self.spin_once(Duration::from_millis(0))?;
        self.buffer
            .resolve_transform(target_frame, source_frame, time)
    }
}
