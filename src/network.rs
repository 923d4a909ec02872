// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! TCP command channel to the motion bridge.
//!
//! Every message starts with a [`MotionCommandHeader`]. Responses are matched to requests by
//! their command id, so several requests may be in flight at once.
use std::collections::HashMap;
use std::fmt::Debug;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream as StdTcpStream;
use std::net::ToSocketAddrs;
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};

use nix::sys::socket::setsockopt;
use nix::sys::socket::sockopt::{KeepAlive, TcpKeepCount, TcpKeepIdle, TcpKeepInterval};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::exception::{create_network_exception, TfCheckException, TfCheckResult};
use crate::motion::service_types::{MotionCommandEnum, MotionCommandHeader, HEADER_SIZE};

const CLIENT: Token = Token(1);
const POLL_SLICE: Duration = Duration::from_millis(10);

/// Time to wait for a response before giving up.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

pub trait MessageCommand {
    fn get_command_message_id(&self) -> u32;
    fn set_message_size(&mut self, size: u32);
}

pub struct Network {
    tcp_socket: TcpStream,
    command_id: u32,
    read_buffer: Vec<u8>,
    received_responses: HashMap<u32, Vec<u8>>,
    poll_read: Poll,
    events: Events,
    response_timeout: Duration,
    closed: bool,
}

impl Network {
    pub fn new(address: &str, port: u16, response_timeout: Duration) -> TfCheckResult<Network> {
        let address_str: String = format!("{}:{}", address, port);
        let sock_address = address_str
            .to_socket_addrs()
            .map_err(|e| TfCheckException::NetworkException {
                message: format!("naotf: could not resolve {}: {}", address_str, e),
            })?
            .next()
            .ok_or_else(|| TfCheckException::NetworkException {
                message: format!("naotf: {} did not resolve to any address", address_str),
            })?;
        let std_socket = StdTcpStream::connect(sock_address).map_err(|e| {
            TfCheckException::NetworkException {
                message: format!("naotf: could not connect to {}: {}", address_str, e),
            }
        })?;
        std_socket
            .set_nodelay(true)
            .map_err(create_network_exception)?;
        std_socket
            .set_nonblocking(true)
            .map_err(create_network_exception)?;

        let fd = std_socket.as_raw_fd();
        setsockopt(fd, KeepAlive, &true).map_err(create_network_exception)?;
        setsockopt(fd, TcpKeepIdle, &1).map_err(create_network_exception)?;
        setsockopt(fd, TcpKeepCount, &3).map_err(create_network_exception)?;
        setsockopt(fd, TcpKeepInterval, &1).map_err(create_network_exception)?;

        let mut tcp_socket = TcpStream::from_std(std_socket);
        let poll_read = Poll::new().map_err(create_network_exception)?;
        poll_read
            .registry()
            .register(&mut tcp_socket, CLIENT, Interest::READABLE)
            .map_err(create_network_exception)?;
        debug!("connected to motion bridge at {}", sock_address);
        Ok(Network {
            tcp_socket,
            command_id: 0,
            read_buffer: Vec::new(),
            received_responses: HashMap::new(),
            poll_read,
            events: Events::with_capacity(128),
            response_timeout,
            closed: false,
        })
    }

    /// Creates a header with a fresh command id. The size is filled in when the message is sent.
    pub fn create_header(&mut self, command: MotionCommandEnum) -> MotionCommandHeader {
        let header = MotionCommandHeader::new(command, self.command_id, 0);
        self.command_id += 1;
        header
    }

    /// Sends a request and returns its command id.
    pub fn tcp_send_request<T: Serialize + MessageCommand + Debug>(
        &mut self,
        mut request: T,
    ) -> TfCheckResult<u32> {
        let size = bincode::serialized_size(&request).map_err(create_network_exception)?;
        request.set_message_size(size as u32);
        let encoded_request = serialize(&request)?;
        self.tcp_write(&encoded_request)?;
        trace!("sent {:?}", request);
        Ok(request.get_command_message_id())
    }

    /// Blocks until a response with the given command ID has been received and returns it.
    ///
    /// # Arguments
    /// * `command_id` - Expected command ID of the Response.
    ///
    /// # Error
    /// * [`NetworkException`](`crate::exception::TfCheckException::NetworkException`) - if no
    /// response arrives within the response timeout or the connection is closed.
    pub fn tcp_blocking_receive_response<T: DeserializeOwned + Debug>(
        &mut self,
        command_id: u32,
    ) -> TfCheckResult<T> {
        let deadline = Instant::now() + self.response_timeout;
        loop {
            if let Some(response_bytes) = self.received_responses.remove(&command_id) {
                let response: T = deserialize(&response_bytes)?;
                trace!("received {:?}", response);
                return Ok(response);
            }
            if self.closed {
                return Err(TfCheckException::NetworkException {
                    message: "naotf: connection closed by motion bridge".to_string(),
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TfCheckException::NetworkException {
                    message: format!(
                        "naotf: timeout while waiting for the response to command {}",
                        command_id
                    ),
                });
            }
            self.tcp_read_from_buffer(POLL_SLICE.min(deadline - now))?;
        }
    }

    fn tcp_write(&mut self, bytes: &[u8]) -> TfCheckResult<()> {
        let deadline = Instant::now() + self.response_timeout;
        let mut written = 0;
        while written < bytes.len() {
            match self.tcp_socket.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(TfCheckException::NetworkException {
                        message: "naotf: connection closed by motion bridge".to_string(),
                    })
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                    if Instant::now() >= deadline {
                        return Err(TfCheckException::NetworkException {
                            message: "naotf: timeout while sending request".to_string(),
                        });
                    }
                    std::thread::yield_now();
                }
                Err(e) => return Err(create_network_exception(e)),
            }
        }
        Ok(())
    }

    fn tcp_read_from_buffer(&mut self, timeout: Duration) -> TfCheckResult<()> {
        self.poll_read
            .poll(&mut self.events, Some(timeout))
            .map_err(create_network_exception)?;
        let mut buffer = [0_u8; 4096];
        loop {
            match self.tcp_socket.read(&mut buffer) {
                Ok(0) => {
                    self.closed = true;
                    break;
                }
                Ok(n) => self.read_buffer.extend_from_slice(&buffer[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(create_network_exception(e)),
            }
        }
        self.split_responses()
    }

    fn split_responses(&mut self) -> TfCheckResult<()> {
        while self.read_buffer.len() >= HEADER_SIZE {
            let header: MotionCommandHeader = deserialize(&self.read_buffer[..HEADER_SIZE])?;
            let size = header.size as usize;
            if size < HEADER_SIZE {
                return Err(TfCheckException::NetworkException {
                    message: format!("naotf: invalid message size {} in {:?}", size, header),
                });
            }
            if self.read_buffer.len() < size {
                break;
            }
            let message: Vec<u8> = self.read_buffer.drain(..size).collect();
            self.received_responses.insert(header.command_id, message);
        }
        Ok(())
    }
}

fn serialize<T: Serialize>(s: &T) -> TfCheckResult<Vec<u8>> {
    bincode::serialize(s).map_err(create_network_exception)
}

fn deserialize<T: DeserializeOwned>(encoded: &[u8]) -> TfCheckResult<T> {
    bincode::deserialize(encoded).map_err(create_network_exception)
}

#[cfg(test)]
mod tests {
    use crate::motion::service_types::{MotionCommandEnum, MotionCommandHeader};
    use crate::network::{deserialize, serialize, Network};
    use std::io::Write;
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn can_serialize_and_deserialize() {
        let header = MotionCommandHeader::new(MotionCommandEnum::GetTransform, 42, 12);
        let header2: MotionCommandHeader = deserialize(&serialize(&header).unwrap()).unwrap();
        assert_eq!(header, header2);
    }

    #[test]
    fn responses_are_matched_by_command_id() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            // two responses out of order and split over several writes
            let first = serialize(&MotionCommandHeader::new(MotionCommandEnum::GetPosition, 1, 12))
                .unwrap();
            let second = serialize(&MotionCommandHeader::new(MotionCommandEnum::GetPosition, 0, 12))
                .unwrap();
            socket.write_all(&first[..5]).unwrap();
            std::thread::sleep(Duration::from_millis(20));
            socket.write_all(&first[5..]).unwrap();
            socket.write_all(&second).unwrap();
        });
        let mut network = Network::new("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        let response: MotionCommandHeader = network.tcp_blocking_receive_response(0).unwrap();
        assert_eq!(response.command_id, 0);
        let response: MotionCommandHeader = network.tcp_blocking_receive_response(1).unwrap();
        assert_eq!(response.command_id, 1);
        server.join().unwrap();
        assert!(network.tcp_blocking_receive_response::<MotionCommandHeader>(2).is_err());
    }

    #[test]
    fn connection_refused_is_a_network_exception() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        match Network::new("127.0.0.1", port, Duration::from_millis(100)) {
            Err(crate::exception::TfCheckException::NetworkException { message }) => {
                assert!(message.contains("could not connect"))
            }
            _ => panic!("expected a network exception"),
        }
    }
}
