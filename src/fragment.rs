//! Outbound fragmentation of a payload into chained command APDUs.
//!
//! Every fragment carries the total payload length in P1/P2 (big-endian), so the tag
//! knows the size of the message before the last fragment arrives. The class byte
//! marks whether more fragments follow.

use crate::apdu::{CommandApdu, MAX_SHORT_DATA};
use crate::error::{FrameError, ProtocolError};
use crate::status::{ResponseApdu, StatusWord};

/// One fragment of an outbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    /// Zero-based position of this fragment within the payload.
    pub index: usize,
    /// Bytes carried by this fragment.
    pub chunk: &'a [u8],
    /// Length of the whole payload.
    pub total: u16,
    /// Whether this fragment consumes the rest of the payload.
    pub is_last: bool,
}

impl<'a> Fragment<'a> {
    /// Builds the transport command for this fragment, advertising `le` as the
    /// response size the reader accepts.
    pub fn to_command(&self, le: u8) -> CommandApdu<'a> {
        CommandApdu::chained(self.chunk, self.total, self.is_last, le)
    }

    /// Checks the tag's answer to this fragment and returns its decoded form.
    ///
    /// Intermediate fragments must be acknowledged with `90 00`. The last fragment may
    /// also be answered with `61 XX`, which starts a chained response.
    pub fn accept<'r>(&self, response: &'r [u8]) -> Result<ResponseApdu<'r>, ProtocolError> {
        let apdu = ResponseApdu::parse(response)?;
        match (self.is_last, apdu.status) {
            (_, StatusWord::Success) | (true, StatusWord::Continuation(_)) => Ok(apdu),
            (_, status) => Err(ProtocolError::ChainedSend { fragment: self.index, status }),
        }
    }
}

/// Iterator over the fragments of a payload.
///
/// An empty payload yields a single, empty, last fragment.
#[derive(Debug, Clone)]
pub struct Fragments<'a> {
    payload: &'a [u8],
    max_chunk: usize,
    total: u16,
    offset: usize,
    index: usize,
    done: bool,
}

impl<'a> Fragments<'a> {
    /// Splits `payload` into chunks of at most `max_chunk` bytes.
    pub fn new(payload: &'a [u8], max_chunk: usize) -> Result<Self, FrameError> {
        if !(1..=MAX_SHORT_DATA).contains(&max_chunk) {
            return Err(FrameError::InvalidFragmentSize(max_chunk));
        }
        let total = u16::try_from(payload.len())
            .map_err(|_| FrameError::PayloadTooLarge { len: payload.len() })?;
        Ok(Self { payload, max_chunk, total, offset: 0, index: 0, done: false })
    }

    /// Number of fragments the payload is split into.
    pub fn count_total(&self) -> usize {
        self.payload.len().div_ceil(self.max_chunk).max(1)
    }
}

impl<'a> Iterator for Fragments<'a> {
    type Item = Fragment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let end = (self.offset + self.max_chunk).min(self.payload.len());
        let chunk = &self.payload[self.offset..end];
        let is_last = end == self.payload.len();
        let fragment = Fragment { index: self.index, chunk, total: self.total, is_last };

        self.offset = end;
        self.index += 1;
        self.done = is_last;
        Some(fragment)
    }
}
