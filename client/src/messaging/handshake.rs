use serde::Serialize;

pub(crate) const COMMAND: &str = "handshake";

#[derive(Serialize, Eq, PartialEq, Debug)]
pub(crate) struct HandshakeRequest {
    #[serde(rename = "Version")]
    version: u32,
}

impl HandshakeRequest {
    pub(crate) fn new(version: u32) -> Self {
        HandshakeRequest { version }
    }
}
