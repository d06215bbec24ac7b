use std::convert::TryFrom;
use std::time::Duration;

use derive_more::Display;
use log::trace;

use crate::messaging::{self, RequestHeader, Response, ResponseHead};
use crate::remote::channel::Channel;
use crate::remote::decoder::Deadline;
use crate::{Result, SerfClientError};

#[derive(Display, Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum CallState {
    #[display(fmt = "idle")]
    Idle,
    #[display(fmt = "sending")]
    Sending,
    #[display(fmt = "awaiting-head")]
    AwaitingHead,
    #[display(fmt = "awaiting-body")]
    AwaitingBody,
    #[display(fmt = "complete")]
    Complete,
    #[display(fmt = "failed")]
    Failed,
}

/// One request and its response on a channel.
pub(crate) struct Call<'a> {
    channel: &'a mut Channel,
    command: &'a str,
    seq: u64,
    state: CallState,
}

impl<'a> Call<'a> {
    pub(crate) fn new(channel: &'a mut Channel, command: &'a str, seq: u64) -> Self {
        Call {
            channel,
            command,
            seq,
            state: CallState::Idle,
        }
    }

    pub(crate) fn state(&self) -> CallState {
        self.state
    }

    /// `body` is the encoded body object sent after the header.
    pub(crate) fn run(
        &mut self,
        body: Option<&[u8]>,
        expect_body: bool,
        timeout: Duration,
    ) -> Result<Response> {
        match self.exchange(body, expect_body, timeout) {
            Ok(response) => {
                self.transition(CallState::Complete);
                Ok(response)
            }
            Err(e) => {
                self.transition(CallState::Failed);
                Err(e)
            }
        }
    }

    fn exchange(
        &mut self,
        body: Option<&[u8]>,
        expect_body: bool,
        timeout: Duration,
    ) -> Result<Response> {
        self.transition(CallState::Sending);
        let request = messaging::encode_request(&RequestHeader::new(self.command, self.seq), body)?;
        self.channel.send(&request)?;

        let deadline = Deadline::after(timeout);
        self.transition(CallState::AwaitingHead);
        let head = ResponseHead::try_from(self.channel.receive(&deadline)?)?;
        if head.seq() != self.seq {
            return Err(SerfClientError::SequenceMismatch {
                expected: self.seq,
                actual: head.seq(),
            });
        }

        let body = if expect_body {
            self.transition(CallState::AwaitingBody);
            Some(self.channel.receive(&deadline)?)
        } else {
            None
        };
        Ok(Response::new(head, body))
    }

    fn transition(&mut self, next: CallState) {
        trace!("{} (seq {}): {} -> {}", self.command, self.seq, self.state, next);
        self.state = next;
    }
}
