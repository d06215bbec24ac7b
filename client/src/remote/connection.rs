use std::{
    fmt, io,
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, warn};
use rmpv::Value;
use serde::Serialize;

use crate::config::ConnectionConfig;
use crate::messaging::handshake::{self, HandshakeRequest};
use crate::messaging::{self, Response};
use crate::remote::call::Call;
use crate::remote::channel::Channel;
use crate::remote::sequencer::Sequencer;
use crate::remote::transport::Transport;
use crate::remote::PROTOCOL_VERSION;
use crate::{Result, SerfClientError};

/// RPC connection to one Serf agent.
///
/// Calls are strictly sequential: each one writes a request and reads its
/// response before returning. A call that fails with a connection, protocol
/// or decoding error closes the connection. A timed out call leaves it open
/// with partial input buffered, so callers should [`close`](Self::close)
/// before issuing further calls.
pub struct Connection {
    config: ConnectionConfig,
    sequencer: Sequencer,
    channel: Option<Channel>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        Connection {
            config,
            sequencer: Sequencer::new(),
            channel: None,
        }
    }

    /// Uses an already open transport instead of dialing the agent.
    pub fn with_transport(config: ConnectionConfig, transport: Box<dyn Transport>) -> Self {
        let channel = Channel::new(transport, config.recv_size());
        Connection {
            config,
            sequencer: Sequencer::new(),
            channel: Some(channel),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Sequence numbers issued so far.
    pub fn counter(&self) -> u64 {
        self.sequencer.current()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config = self.config.clone().with_timeout(timeout);
    }

    pub fn set_recv_size(&mut self, recv_size: usize) {
        self.config = self.config.clone().with_recv_size(recv_size);
        if let Some(channel) = self.channel.as_mut() {
            channel.set_recv_size(self.config.recv_size());
        }
    }

    pub fn ensure_connected(&mut self) -> Result<()> {
        if self.channel.is_none() {
            let stream = self.dial().map_err(|source| SerfClientError::Connect {
                endpoint: self.config.endpoint().clone(),
                source,
            })?;
            debug!("connected to {}", self.config.endpoint());
            self.channel = Some(Channel::new(Box::new(stream), self.config.recv_size()));
        }
        Ok(())
    }

    fn dial(&self) -> io::Result<TcpStream> {
        let mut last_error = None;
        for address in (self.config.host(), self.config.port()).to_socket_addrs()? {
            let connected = if self.config.timeout() > Duration::from_secs(0) {
                TcpStream::connect_timeout(&address, self.config.timeout())
            } else {
                TcpStream::connect(address)
            };
            match connected {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")))
    }

    /// Connects if needed and negotiates the protocol version. Must succeed
    /// before any other command is issued.
    pub fn handshake(&mut self) -> Result<Response> {
        self.ensure_connected()?;
        let request = HandshakeRequest::new(PROTOCOL_VERSION);
        let response = self.dispatch(handshake::COMMAND, Some(&request), false)?;
        if response.is_ok() {
            if let Some(channel) = self.channel.as_mut() {
                channel.mark_handshaken();
            }
            debug!("handshake with {} complete", self.config.endpoint());
        }
        Ok(response)
    }

    /// Issues `command`, optionally with a body, and waits for the head and,
    /// if `expect_body`, the body that follows it.
    pub fn call(&mut self, command: &str, body: Option<&Value>, expect_body: bool) -> Result<Response> {
        self.ensure_handshaken()?;
        self.dispatch(command, body, expect_body)
    }

    /// Like [`call`](Self::call) with any serializable body.
    pub fn call_with<B: Serialize + ?Sized>(&mut self, command: &str, body: &B, expect_body: bool) -> Result<Response> {
        self.ensure_handshaken()?;
        self.dispatch(command, Some(body), expect_body)
    }

    fn ensure_handshaken(&self) -> Result<()> {
        match &self.channel {
            Some(channel) if channel.is_handshaken() => Ok(()),
            _ => Err(SerfClientError::HandshakeRequired),
        }
    }

    fn dispatch<B: Serialize + ?Sized>(&mut self, command: &str, body: Option<&B>, expect_body: bool) -> Result<Response> {
        let channel = self.channel.as_mut().ok_or(SerfClientError::HandshakeRequired)?;
        // An unencodable body must not use up a sequence number.
        let body = body.map(messaging::encode_body).transpose()?;
        let seq = self.sequencer.next();
        let result = Call::new(channel, command, seq).run(body.as_deref(), expect_body, self.config.timeout());

        if let Err(e) = &result {
            if e.is_fatal() {
                warn!("closing connection to {} after failed {}: {}", self.config.endpoint(), command, e);
                self.close();
            }
        }
        result
    }

    /// Releases the transport. Safe to call in any state.
    pub fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.shutdown() {
                debug!("error shutting down connection to {}: {}", self.config.endpoint(), e);
            }
            debug!("closed connection to {}", self.config.endpoint());
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "Connection<counter={},host={},port={},timeout={}>",
            self.counter(),
            self.config.host(),
            self.config.port(),
            self.config.timeout().as_secs_f64()
        )
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, formatter)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::remote::decoder::tests::{encode, ScriptedTransport};

    fn head(seq: u64, error: &str) -> Value {
        Value::Map(vec![
            (Value::from("Seq"), Value::from(seq)),
            (Value::from("Error"), Value::from(error)),
        ])
    }

    fn members_body() -> Value {
        Value::Map(vec![(Value::from("Members"), Value::Array(vec![]))])
    }

    /// Shares the written bytes with the test after the transport is boxed.
    struct Recording {
        inner: ScriptedTransport,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl Read for Recording {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Write for Recording {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for Recording {
        fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
            self.inner.set_read_timeout(timeout)
        }
    }

    fn connection(replies: &[Value], chunk: usize) -> (Connection, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let transport = Recording {
            inner: ScriptedTransport::new(&encode(replies), chunk),
            written: Arc::clone(&written),
        };
        let config = ConnectionConfig::default().with_timeout(Duration::from_millis(50));
        (Connection::with_transport(config, Box::new(transport)), written)
    }

    fn requests(written: &Arc<Mutex<Vec<u8>>>) -> Vec<Value> {
        let written = written.lock().unwrap();
        let mut bytes = written.as_slice();
        let mut values = Vec::new();
        while !bytes.is_empty() {
            values.push(rmpv::decode::read_value(&mut bytes).unwrap());
        }
        values
    }

    #[test]
    fn should_display_counter_host_port_and_timeout() {
        let connection = Connection::new(ConnectionConfig::default());
        assert_eq!(connection.to_string(), "Connection<counter=0,host=localhost,port=7373,timeout=3>");

        let connection = Connection::new(ConnectionConfig::default().with_timeout_secs(0.1));
        assert!(connection.to_string().ends_with("timeout=0.1>"));
    }

    #[test]
    fn should_require_handshake_before_call() {
        let mut connection = Connection::new(ConnectionConfig::default());

        let result = connection.call("members", None, true);

        match result {
            Err(e) => {
                assert!(e.to_string().contains("handshake must be made first"));
                assert_eq!(e.kind(), crate::ErrorKind::Connection);
            }
            Ok(_) => panic!("call without handshake succeeded"),
        }
        assert_eq!(connection.counter(), 0);
        assert!(!connection.is_connected());
    }

    #[test]
    fn should_require_handshake_on_adopted_transport() {
        let (mut connection, written) = connection(&[head(0, "")], 64);

        assert!(matches!(connection.call("members", None, true), Err(SerfClientError::HandshakeRequired)));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn should_handshake_and_call() {
        let (mut connection, written) = connection(&[head(0, ""), head(1, ""), members_body()], 7);

        let handshake = connection.handshake().unwrap();
        assert_eq!(handshake.head().seq(), 0);
        assert!(handshake.body().is_none());
        assert_eq!(connection.counter(), 1);

        let members = connection.call("members", None, true).unwrap();
        assert!(members.is_ok());
        assert_eq!(members.head().seq(), 1);
        assert!(members.get("Members").is_some());
        assert_eq!(connection.counter(), 2);

        let sent = requests(&written);
        assert_eq!(sent.len(), 3);
        assert_eq!(crate::codec::util::map_get(&sent[0], "Command"), Some(&Value::from("handshake")));
        assert_eq!(sent[1], Value::Map(vec![(Value::from("Version"), Value::from(1))]));
        assert_eq!(crate::codec::util::map_get(&sent[2], "Seq"), Some(&Value::from(1)));
    }

    #[test]
    fn should_not_read_body_when_not_expected() {
        let (mut connection, _) = connection(&[head(0, ""), head(1, ""), head(2, "")], 64);
        connection.handshake().unwrap();

        let event = connection.call("event", None, false).unwrap();
        assert!(event.body().is_none());

        let next = connection.call("event", None, false).unwrap();
        assert_eq!(next.head().seq(), 2);
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("unencodable"))
        }
    }

    #[test]
    fn should_not_use_sequence_number_when_body_fails_to_encode() {
        let (mut connection, written) = connection(&[head(0, ""), head(1, "")], 64);
        connection.handshake().unwrap();
        let sent = requests(&written).len();

        let result = connection.call_with("event", &Unencodable, false);

        assert!(matches!(result, Err(SerfClientError::Encode(_))));
        assert_eq!(connection.counter(), 1);
        assert!(connection.is_connected());
        assert_eq!(requests(&written).len(), sent);

        let event = connection.call("event", None, false).unwrap();
        assert_eq!(event.head().seq(), 1);
    }

    #[test]
    fn should_return_command_errors_in_head() {
        let (mut connection, _) = connection(&[head(0, "Unsupported version")], 64);

        let response = connection.handshake().unwrap();

        assert!(!response.is_ok());
        assert_eq!(response.head().error(), "Unsupported version");
        assert!(connection.is_connected());
        assert!(matches!(connection.call("members", None, true), Err(SerfClientError::HandshakeRequired)));
    }

    #[test]
    fn should_fail_and_close_on_stale_responses() {
        let (mut connection, _) = connection(&[head(0, ""), head(7, ""), members_body(), head(8, "")], 64);
        connection.handshake().unwrap();

        match connection.call("members", None, true) {
            Err(SerfClientError::SequenceMismatch { expected, actual }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 7);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!connection.is_connected());
        assert!(matches!(connection.call("members", None, true), Err(SerfClientError::HandshakeRequired)));
    }

    #[test]
    fn should_time_out_waiting_for_missing_body_and_stay_open() {
        let (mut connection, _) = connection(&[head(0, ""), head(1, "")], 64);
        connection.handshake().unwrap();

        let result = connection.call("event", None, true);

        assert!(matches!(result, Err(SerfClientError::Timeout { .. })));
        assert!(connection.is_connected());
    }

    #[test]
    fn should_fail_and_close_when_peer_closes() {
        let transport = ScriptedTransport::new(&encode(&[head(0, "")]), 64).closing();
        let mut connection = Connection::with_transport(ConnectionConfig::default(), Box::new(transport));
        connection.handshake().unwrap();

        let result = connection.handshake();

        assert!(matches!(result, Err(SerfClientError::ConnectionClosed)));
        assert!(!connection.is_connected());
    }

    #[test]
    fn should_apply_recv_size_to_open_channel() {
        let (mut connection, _) = connection(&[head(0, ""), head(1, ""), members_body()], 64);
        connection.handshake().unwrap();
        connection.set_recv_size(3);

        assert_eq!(connection.config().recv_size(), 3);
        assert!(connection.call("members", None, true).unwrap().get("Members").is_some());
    }

    #[test]
    fn should_close_idempotently() {
        let mut never_connected = Connection::new(ConnectionConfig::default());
        never_connected.close();
        never_connected.close();
        assert!(!never_connected.is_connected());

        let (mut connection, _) = connection(&[head(0, "")], 64);
        connection.handshake().unwrap();
        connection.close();
        assert!(!connection.is_connected());
        connection.close();
        assert!(matches!(connection.call("members", None, true), Err(SerfClientError::HandshakeRequired)));
    }

    #[test]
    fn should_report_refused_connection() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut connection = Connection::new(ConnectionConfig::new("127.0.0.1", port));
        match connection.handshake() {
            Err(e @ SerfClientError::Connect { .. }) => {
                assert!(e.to_string().starts_with(&format!("error connecting 127.0.0.1:{}. ", port)));
                assert!(e.to_string().ends_with("Connection refused."));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!connection.is_connected());
        assert_eq!(connection.counter(), 0);
    }
}
