//! Command APDUs exchanged on the commissioning channel.
//!
//! Only short APDUs (ISO 7816-4 cases 1 to 4) are used:
//!
//! ```text
//! +-----+-----+----+----+------+----------+------+
//! | CLA | INS | P1 | P2 | [Lc] | [data]   | [Le] |
//! +-----+-----+----+----+------+----------+------+
//! ```
//!
//! | Exchange                     | CLA  | INS  | P1 P2          | Lc        | Le            |
//! |------------------------------|------|------|----------------|-----------|---------------|
//! | Select application           | 0x00 | 0xA4 | 0x04 0x0C      | AID len   | 0x00          |
//! | Send fragment (intermediate) | 0x90 | 0x20 | total (u16 BE) | chunk len | max inbound   |
//! | Send fragment (final)        | 0x80 | 0x20 | total (u16 BE) | chunk len | max inbound   |
//! | Get next block               | 0x00 | 0xC0 | 0x00 0x00      | -         | block length  |

use alloc::vec::Vec;

use derive_try_from_primitive::TryFromPrimitive;
use nom::{IResult, Parser, bytes::complete::take, number::complete::u8};

use crate::error::FrameError;

/// P1 of SELECT: select by DF name.
pub const SELECT_BY_NAME: u8 = 0x04;

/// P2 of SELECT: first or only occurrence, no response data requested.
pub const SELECT_NO_FCI: u8 = 0x0C;

/// Largest data field of a short APDU.
pub const MAX_SHORT_DATA: usize = 255;

/// Class byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum Class {
    /// Interindustry class, used for SELECT and GET RESPONSE.
    Interindustry = 0x00,
    /// Last (or only) fragment of a chained payload.
    ChainFinal = 0x80,
    /// Fragment followed by more fragments of the same payload.
    ChainIntermediate = 0x90,
}

/// Instruction byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    /// Commissioning payload transport.
    Transport = 0x20,
    /// SELECT.
    Select = 0xA4,
    /// GET RESPONSE, fetches the next block of a chained response.
    GetResponse = 0xC0,
}

/// A short command APDU borrowing its data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandApdu<'a> {
    class: Class,
    instruction: Instruction,
    p1: u8,
    p2: u8,
    data: &'a [u8],
    le: Option<u8>,
}

impl<'a> CommandApdu<'a> {
    /// Creates a command, checking that the data field fits a short APDU.
    pub fn new(
        class: Class,
        instruction: Instruction,
        p1: u8,
        p2: u8,
        data: &'a [u8],
        le: Option<u8>,
    ) -> Result<Self, FrameError> {
        if data.len() > MAX_SHORT_DATA {
            return Err(FrameError::DataTooLong { len: data.len() });
        }
        Ok(Self::from_parts(class, instruction, p1, p2, data, le))
    }

    /// Callers guarantee `data.len() <= MAX_SHORT_DATA`.
    pub(crate) fn from_parts(
        class: Class,
        instruction: Instruction,
        p1: u8,
        p2: u8,
        data: &'a [u8],
        le: Option<u8>,
    ) -> Self {
        debug_assert!(data.len() <= MAX_SHORT_DATA);
        Self { class, instruction, p1, p2, data, le }
    }

    /// SELECT by name for the given application identifier, `Le = 0x00`.
    ///
    /// Callers guarantee the identifier fits a short APDU.
    pub(crate) fn select(application_id: &'a [u8]) -> Self {
        Self::from_parts(
            Class::Interindustry,
            Instruction::Select,
            SELECT_BY_NAME,
            SELECT_NO_FCI,
            application_id,
            Some(0x00),
        )
    }

    /// One fragment of a chained payload of `total` bytes; `chunk` is at most
    /// [`MAX_SHORT_DATA`] bytes.
    pub(crate) fn chained(chunk: &'a [u8], total: u16, is_last: bool, le: u8) -> Self {
        let class = if is_last { Class::ChainFinal } else { Class::ChainIntermediate };
        let [p1, p2] = total.to_be_bytes();
        Self::from_parts(class, Instruction::Transport, p1, p2, chunk, Some(le))
    }

    /// GET RESPONSE for the next `le` bytes of a chained response.
    pub fn get_response(le: u8) -> CommandApdu<'static> {
        CommandApdu::from_parts(Class::Interindustry, Instruction::GetResponse, 0x00, 0x00, &[], Some(le))
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn instruction(&self) -> Instruction {
        self.instruction
    }

    pub fn p1(&self) -> u8 {
        self.p1
    }

    pub fn p2(&self) -> u8 {
        self.p2
    }

    /// P1 and P2 read as one big-endian value (the total length of a chained payload).
    pub fn p1p2(&self) -> u16 {
        u16::from_be_bytes([self.p1, self.p2])
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn le(&self) -> Option<u8> {
        self.le
    }

    /// Length of the encoded frame.
    pub fn encoded_len(&self) -> usize {
        let lc = if self.data.is_empty() { 0 } else { 1 + self.data.len() };
        4 + lc + usize::from(self.le.is_some())
    }

    /// Encodes the command into wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&[self.class as u8, self.instruction as u8, self.p1, self.p2]);
        if !self.data.is_empty() {
            out.push(self.data.len() as u8);
            out.extend_from_slice(self.data);
        }
        if let Some(le) = self.le {
            out.push(le);
        }
        out
    }

    /// Decodes a complete command frame.
    ///
    /// The whole input must be one APDU; the case (1 to 4) is derived from its length.
    pub fn parse(frame: &'a [u8]) -> Result<Self, FrameError> {
        let (body, (cla, ins, p1, p2)) =
            header(frame).map_err(|_| FrameError::TooShort { len: frame.len() })?;
        let class = Class::try_from(cla).map_err(FrameError::UnknownClass)?;
        let instruction = Instruction::try_from(ins).map_err(FrameError::UnknownInstruction)?;

        let (data, le) = match body.len() {
            0 => (&body[..0], None),
            1 => (&body[..0], Some(body[0])),
            _ => {
                let (rest, data) = lc_data(body).map_err(|_| FrameError::LengthMismatch)?;
                match rest {
                    [] => (data, None),
                    [le] => (data, Some(*le)),
                    _ => return Err(FrameError::LengthMismatch),
                }
            }
        };

        Ok(Self::from_parts(class, instruction, p1, p2, data, le))
    }
}

fn header(input: &[u8]) -> IResult<&[u8], (u8, u8, u8, u8)> {
    (u8, u8, u8, u8).parse(input)
}

fn lc_data(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, lc) = u8(input)?;
    if lc == 0 {
        // Extended length APDUs are not used on this channel.
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Verify)));
    }
    take(lc).parse(input)
}
