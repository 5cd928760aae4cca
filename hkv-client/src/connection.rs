//! # TCP Connection
//!
//! Purpose: The production `Transport`: one blocking TCP session speaking
//! RESP2, with the connect/auth/select handshake run once on open.
//!
//! ## Design Principles
//! 1. **Cache-Friendly Buffers**: Each connection reuses its own buffers.
//! 2. **Fail Fast**: Any handshake step failing aborts the open.
//! 3. **Sticky Health**: Once the wire fails the session stays unhealthy; the
//!    pool destroys it on release instead of parking it.

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;
use hkv_common::{HkvError, HkvResult, ServiceAddress};
use tracing::{debug, trace};

use crate::command::Command;
use crate::reply::Reply;
use crate::resp::{encode_command, read_reply};
use crate::transport::{Connect, Target, Transport};

/// Single TCP session with reusable buffers.
pub struct TcpConnection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: BytesMut,
    endpoint: ServiceAddress,
    partition: usize,
    healthy: bool,
    operations: u64,
}

impl TcpConnection {
    /// Connects, authenticates and selects the target partition.
    pub fn open(target: &Target) -> HkvResult<Self> {
        let stream = connect_stream(&target.endpoint, target.timeout)?;
        let io_timeout = non_zero(target.timeout);
        stream.set_read_timeout(io_timeout)?;
        stream.set_write_timeout(io_timeout)?;
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        let mut conn = TcpConnection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: BytesMut::with_capacity(256),
            endpoint: target.endpoint.clone(),
            partition: 0,
            healthy: true,
            operations: 0,
        };

        if let Some(credential) = target.credential.as_deref() {
            conn.execute(&Command::new("AUTH").arg(credential))?.into_result()?;
        }
        if target.partition != 0 {
            conn.execute(&Command::new("SELECT").arg(target.partition))?
                .into_result()?;
            conn.partition = target.partition;
        }

        debug!(endpoint = %conn.endpoint, partition = conn.partition, "session established");
        Ok(conn)
    }

    pub fn endpoint(&self) -> &ServiceAddress {
        &self.endpoint
    }

    /// Partition the session has selected.
    pub fn partition(&self) -> usize {
        self.partition
    }

    /// Exchanges issued over the session's lifetime, handshake included.
    pub fn operation_count(&self) -> u64 {
        self.operations
    }

    fn exchange(&mut self, command: &Command) -> HkvResult<Reply> {
        self.write_buf.clear();
        encode_command(command, &mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        read_reply(&mut self.reader, &mut self.line_buf)
    }
}

impl Transport for TcpConnection {
    fn execute(&mut self, command: &Command) -> HkvResult<Reply> {
        self.operations += 1;
        if !self.healthy {
            return Err(HkvError::Protocol("session already failed"));
        }
        let result = self.exchange(command);
        if let Err(err) = &result {
            trace!(endpoint = %self.endpoint, error = %err, "session marked unhealthy");
            self.healthy = false;
        }
        result
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }
}

/// `Connect` strategy producing `TcpConnection`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connect for TcpConnector {
    type Conn = TcpConnection;

    fn connect(&self, target: &Target) -> HkvResult<TcpConnection> {
        TcpConnection::open(target)
    }
}

fn connect_stream(endpoint: &ServiceAddress, timeout: Duration) -> HkvResult<TcpStream> {
    let addrs: Vec<SocketAddr> = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|_| HkvError::InvalidAddress(endpoint.to_string()))?
        .collect();
    if addrs.is_empty() {
        return Err(HkvError::InvalidAddress(endpoint.to_string()));
    }

    let mut last_err = None;
    for addr in addrs {
        let attempt = match non_zero(timeout) {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err
        .map(HkvError::Io)
        .unwrap_or_else(|| HkvError::InvalidAddress(endpoint.to_string())))
}

fn non_zero(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}
