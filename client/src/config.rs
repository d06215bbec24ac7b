use std::time::Duration;

use derive_more::Display;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 7373;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_RECV_SIZE: usize = 4096;

#[derive(Display, Eq, PartialEq, Hash, Debug, Clone)]
#[display(fmt = "{}:{}", host, port)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: String, port: u16) -> Self {
        Endpoint { host, port }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Construction-time settings of a [`Connection`](crate::Connection).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConnectionConfig {
    endpoint: Endpoint,
    timeout: Duration,
    recv_size: usize,
}

impl ConnectionConfig {
    pub fn new(host: &str, port: u16) -> Self {
        ConnectionConfig {
            endpoint: Endpoint::new(host.to_string(), port),
            ..Default::default()
        }
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.endpoint.host = host.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.endpoint.port = port;
        self
    }

    /// Per-call budget for receiving a response, also bounds connecting.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fractional seconds. Negative and NaN values collapse to zero, values
    /// past the range of `Duration` saturate.
    pub fn with_timeout_secs(self, seconds: f64) -> Self {
        let timeout = if seconds.is_nan() || seconds <= 0.0 {
            Duration::from_secs(0)
        } else {
            Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
        };
        self.with_timeout(timeout)
    }

    /// Upper bound on a single socket read. Decoding does not depend on it.
    pub fn with_recv_size(mut self, recv_size: usize) -> Self {
        self.recv_size = recv_size.max(1);
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn host(&self) -> &str {
        self.endpoint.host()
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn recv_size(&self) -> usize {
        self.recv_size
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            endpoint: Endpoint::new(DEFAULT_HOST.to_string(), DEFAULT_PORT),
            timeout: DEFAULT_TIMEOUT,
            recv_size: DEFAULT_RECV_SIZE,
        }
    }
}
