use std::io::Write;

use rmpv::Value;

use crate::remote::decoder::{Deadline, FrameDecoder};
use crate::remote::transport::Transport;
use crate::Result;

/// An open transport together with the decoder buffering its input.
pub(crate) struct Channel {
    transport: Box<dyn Transport>,
    decoder: FrameDecoder,
    handshaken: bool,
}

impl Channel {
    pub(crate) fn new(transport: Box<dyn Transport>, recv_size: usize) -> Self {
        Channel {
            transport,
            decoder: FrameDecoder::new(recv_size),
            handshaken: false,
        }
    }

    pub(crate) fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport.write_all(bytes)?;
        self.transport.flush()?;
        Ok(())
    }

    pub(crate) fn receive(&mut self, deadline: &Deadline) -> Result<Value> {
        self.decoder.next_message(self.transport.as_mut(), deadline)
    }

    pub(crate) fn is_handshaken(&self) -> bool {
        self.handshaken
    }

    pub(crate) fn mark_handshaken(&mut self) {
        self.handshaken = true;
    }

    pub(crate) fn set_recv_size(&mut self, recv_size: usize) {
        self.decoder.set_recv_size(recv_size);
    }

    pub(crate) fn shutdown(mut self) -> std::io::Result<()> {
        self.transport.shutdown()
    }
}
