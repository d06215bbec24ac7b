pub(crate) mod call;
pub(crate) mod channel;
pub mod connection;
pub mod decoder;
pub mod sequencer;
pub mod transport;

const PROTOCOL_VERSION: u32 = 1;
