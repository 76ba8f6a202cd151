//! Reassembly of chained responses.
//!
//! A response that does not fit one exchange is announced with `61 XX`: `XX` more
//! bytes can be fetched with GET RESPONSE. The [`Reassembler`] is the sans-I/O state
//! machine for this; the driver feeds it responses and performs the exchanges it asks
//! for. Every byte of a reply, chained or not, goes through the bounded buffer.
//!
//! ```text
//!            61 XX                 61 XX
//!   Idle ───────────► Accumulating ◄─────┐
//!    │                  │  │             │
//!    │ 90 00      90 00 │  └─────────────┘
//!    ▼                  ▼
//!  Complete ◄───────────┘        any other status / malformed ──► Failed
//! ```

use alloc::vec::Vec;

use log::{trace, warn};

use crate::buffer::{Buffer, ReassemblyBuffer};
use crate::error::ProtocolError;
use crate::status::{ResponseApdu, StatusWord};

/// States of a chained response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiveState {
    /// No response in progress.
    #[default]
    Idle,
    /// Part of a chained response has been collected; more blocks are pending.
    Accumulating,
    /// The last response completed; its bytes were handed out.
    Complete,
    /// The last response was abandoned.
    Failed,
}

/// What the driver has to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyStep {
    /// The response is complete.
    Complete(Vec<u8>),
    /// Send GET RESPONSE for the next block and feed the answer to
    /// [`Reassembler::next_block`].
    ReadNext { le: u8 },
}

/// Collects a possibly chained response into a bounded buffer.
#[derive(Debug)]
pub struct Reassembler<B: Buffer> {
    buffer: ReassemblyBuffer<B>,
    max_block: u8,
    state: ReceiveState,
    blocks: usize,
}

impl<B: Buffer> Reassembler<B> {
    /// `max_block` is the largest block the reader requests per GET RESPONSE.
    pub fn new(buffer: ReassemblyBuffer<B>, max_block: u8) -> Self {
        Self { buffer, max_block, state: ReceiveState::Idle, blocks: 0 }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    /// Bytes currently held for an unfinished response.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// GET RESPONSE exchanges performed for the current (or last) response.
    pub fn blocks_read(&self) -> usize {
        self.blocks
    }

    /// Starts a new response from the decoded answer to the last command fragment.
    ///
    /// Any leftover state from a previous response is discarded first.
    pub fn begin(&mut self, apdu: ResponseApdu<'_>) -> Result<ReassemblyStep, ProtocolError> {
        self.buffer.reset();
        self.state = ReceiveState::Idle;
        self.blocks = 0;

        match apdu.status {
            StatusWord::Success => self.complete(apdu.body),
            StatusWord::Continuation(available) => {
                self.state = ReceiveState::Accumulating;
                self.accumulate(apdu.body, available)
            }
            status => self.fail(ProtocolError::ChainedReceive { status }),
        }
    }

    /// Feeds the answer to a GET RESPONSE requested by [`ReassemblyStep::ReadNext`].
    pub fn next_block(&mut self, response: &[u8]) -> Result<ReassemblyStep, ProtocolError> {
        if self.state != ReceiveState::Accumulating {
            return self.fail(ProtocolError::UnexpectedBlock);
        }
        self.blocks += 1;

        let apdu = self.guard(ResponseApdu::parse(response))?;
        match apdu.status {
            StatusWord::Success => self.complete(apdu.body),
            // A block that announces more data without carrying any never ends.
            StatusWord::Continuation(_) if apdu.body.is_empty() => {
                self.fail(ProtocolError::ChainedReceive { status: apdu.status })
            }
            StatusWord::Continuation(available) => self.accumulate(apdu.body, available),
            status => self.fail(ProtocolError::ChainedReceive { status }),
        }
    }

    /// Abandons the current response.
    pub fn abort(&mut self) {
        if self.state == ReceiveState::Accumulating {
            self.buffer.reset();
            self.state = ReceiveState::Failed;
        }
    }

    fn complete(&mut self, body: &[u8]) -> Result<ReassemblyStep, ProtocolError> {
        let appended = self.buffer.append(body);
        self.guard(appended)?;
        self.state = ReceiveState::Complete;
        Ok(ReassemblyStep::Complete(self.buffer.take()))
    }

    fn accumulate(&mut self, body: &[u8], available: u8) -> Result<ReassemblyStep, ProtocolError> {
        let appended = self.buffer.append(body);
        self.guard(appended)?;
        let le = block_len(available, self.max_block);
        trace!("chained response: {} bytes buffered, requesting {} more", self.buffer.len(), le);
        Ok(ReassemblyStep::ReadNext { le })
    }

    fn guard<T>(&mut self, result: Result<T, ProtocolError>) -> Result<T, ProtocolError> {
        result.or_else(|err| self.fail(err))
    }

    fn fail<T>(&mut self, err: ProtocolError) -> Result<T, ProtocolError> {
        warn!("chained response abandoned: {}", err);
        self.buffer.reset();
        self.state = ReceiveState::Failed;
        Err(err)
    }
}

/// Length to request for the next block: SW2, or the maximum when SW2 is 0 or larger.
pub fn block_len(available: u8, max_block: u8) -> u8 {
    if available == 0 || available > max_block { max_block } else { available }
}
