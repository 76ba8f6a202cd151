//! Response APDUs and their status word trailer.
//!
//! Every response on the channel ends with `SW1 SW2`. The raw bytes are decoded once,
//! here, into a [`StatusWord`]; nothing downstream inspects them again.

use core::fmt;

use nom::{IResult, Parser, bytes::complete::take, number::complete::u8};

use crate::error::ProtocolError;

/// SW1 of a successful response (`90 00`).
pub const SW1_SUCCESS: u8 = 0x90;

/// SW1 announcing that more response bytes are available (`61 XX`).
pub const SW1_BYTES_AVAILABLE: u8 = 0x61;

/// Decoded status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusWord {
    /// `90 00`: normal processing.
    Success,
    /// `61 XX`: `XX` more bytes can be fetched with GET RESPONSE. `0` means "as many as
    /// the reader accepts".
    Continuation(u8),
    /// Any other value, kept verbatim for diagnostics.
    Error(u8, u8),
}

impl StatusWord {
    pub fn from_bytes(sw1: u8, sw2: u8) -> Self {
        match (sw1, sw2) {
            (SW1_SUCCESS, 0x00) => StatusWord::Success,
            (SW1_BYTES_AVAILABLE, available) => StatusWord::Continuation(available),
            (sw1, sw2) => StatusWord::Error(sw1, sw2),
        }
    }

    pub fn to_bytes(self) -> [u8; 2] {
        match self {
            StatusWord::Success => [SW1_SUCCESS, 0x00],
            StatusWord::Continuation(available) => [SW1_BYTES_AVAILABLE, available],
            StatusWord::Error(sw1, sw2) => [sw1, sw2],
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [sw1, sw2] = self.to_bytes();
        write!(f, "{:02X} {:02X}", sw1, sw2)
    }
}

/// A response APDU split into its body and status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseApdu<'a> {
    pub body: &'a [u8],
    pub status: StatusWord,
}

impl<'a> ResponseApdu<'a> {
    /// Splits a raw response into body and status word.
    ///
    /// A response shorter than the status word (including an absent, empty response)
    /// is malformed.
    pub fn parse(response: &'a [u8]) -> Result<Self, ProtocolError> {
        if response.len() < 2 {
            return Err(ProtocolError::MalformedResponse { len: response.len() });
        }
        split_trailer(response, response.len() - 2)
            .map(|(_, apdu)| apdu)
            .map_err(|_| ProtocolError::MalformedResponse { len: response.len() })
    }
}

fn split_trailer(input: &[u8], body_len: usize) -> IResult<&[u8], ResponseApdu<'_>> {
    let (input, body) = take(body_len).parse(input)?;
    let (input, (sw1, sw2)) = (u8, u8).parse(input)?;
    Ok((input, ResponseApdu { body, status: StatusWord::from_bytes(sw1, sw2) }))
}
