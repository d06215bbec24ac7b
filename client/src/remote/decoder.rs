//! Buffered reader turning a byte stream into decoded MessagePack objects.

use std::{
    io,
    time::{Duration, Instant},
};

use bytes::{Buf, BytesMut};
use log::trace;
use rmpv::Value;

use crate::codec::boundary::Boundary;
use crate::remote::transport::Transport;
use crate::{Result, SerfClientError};

/// Absolute point in time a call has to finish by.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    expires: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        let started = Instant::now();
        let expires = started
            .checked_add(timeout)
            .unwrap_or_else(|| started + Duration::from_secs(u64::from(u32::MAX)));
        Deadline { started, expires }
    }

    /// Time left, `None` once expired.
    pub fn remaining(&self) -> Option<Duration> {
        let remaining = self.expires.saturating_duration_since(Instant::now());
        if remaining == Duration::from_secs(0) {
            None
        } else {
            Some(remaining)
        }
    }

    fn expired(&self) -> SerfClientError {
        SerfClientError::Timeout { elapsed: self.started.elapsed() }
    }
}

pub struct FrameDecoder {
    buffer: BytesMut,
    boundary: Boundary,
    chunk: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(recv_size: usize) -> Self {
        FrameDecoder {
            buffer: BytesMut::with_capacity(recv_size),
            boundary: Boundary::new(),
            chunk: vec![0; recv_size.max(1)],
        }
    }

    pub fn recv_size(&self) -> usize {
        self.chunk.len()
    }

    pub fn set_recv_size(&mut self, recv_size: usize) {
        self.chunk.resize(recv_size.max(1), 0);
    }

    /// Appends bytes received out of band.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes held that do not yet belong to a returned object.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops buffered bytes and partial scan state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.boundary.reset();
    }

    /// Returns the next buffered object without touching the transport.
    pub fn try_next(&mut self) -> Result<Option<Value>> {
        let end = match self.boundary.advance(&self.buffer)? {
            Some(end) => end,
            None => return Ok(None),
        };

        let value = rmpv::decode::read_value(&mut &self.buffer[..end])?;
        self.buffer.advance(end);
        Ok(Some(value))
    }

    /// Returns the next object, reading from `transport` until one is
    /// complete or `deadline` passes.
    pub fn next_message<T: Transport + ?Sized>(&mut self, transport: &mut T, deadline: &Deadline) -> Result<Value> {
        loop {
            if let Some(value) = self.try_next()? {
                return Ok(value);
            }

            let remaining = deadline.remaining().ok_or_else(|| deadline.expired())?;
            transport.set_read_timeout(Some(remaining))?;
            match transport.read(&mut self.chunk) {
                Ok(0) => return Err(SerfClientError::ConnectionClosed),
                Ok(read) => {
                    trace!("received {} bytes, {} buffered", read, self.buffer.len() + read);
                    self.buffer.extend_from_slice(&self.chunk[..read]);
                }
                Err(e) if is_retryable(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_retryable(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
