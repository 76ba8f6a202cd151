//! Error types for channel setup, chained transfers and frame handling.
//!
//! Errors that originate in the physical channel are carried as the generic `E`
//! (the [`TagChannel::Error`](crate::TagChannel::Error) of the transport in use), in
//! the same way the channel's own error type flows through every operation.

use thiserror::Error;

use crate::status::StatusWord;

/// Errors while encoding or decoding a command or response APDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The frame is shorter than its mandatory header or trailer.
    #[error("frame too short: {len} bytes")]
    TooShort { len: usize },
    /// The class byte is not one used on the commissioning channel.
    #[error("unknown class byte 0x{0:02X}")]
    UnknownClass(u8),
    /// The instruction byte is not one used on the commissioning channel.
    #[error("unknown instruction byte 0x{0:02X}")]
    UnknownInstruction(u8),
    /// The data field does not fit a short APDU (1..=255 bytes).
    #[error("data field of {len} bytes does not fit a short APDU")]
    DataTooLong { len: usize },
    /// The Lc byte disagrees with the length of the frame.
    #[error("Lc field does not match the frame length")]
    LengthMismatch,
    /// A chained payload is longer than the 16-bit total length field.
    #[error("payload of {len} bytes exceeds the 16-bit total length field")]
    PayloadTooLarge { len: usize },
    /// The fragment size is outside 1..=255.
    #[error("invalid fragment size {0}")]
    InvalidFragmentSize(usize),
}

/// Errors reported by [`ChannelConfig::validate`](crate::ChannelConfig::validate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max outbound fragment size must be within 1..=255, got {0}")]
    OutboundFragment(usize),
    #[error("max inbound fragment size must be within 1..=255, got {0}")]
    InboundFragment(usize),
    #[error("reassembly capacity must be non-zero")]
    ZeroCapacity,
    #[error("application identifier must be 5..=16 bytes, got {0}")]
    ApplicationId(usize),
    #[error("exchange timeout must be non-zero")]
    ZeroTimeout,
}

/// Protocol failures detected by the sans-I/O core.
///
/// These are independent of the channel type and convert into [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A response carried fewer than the two status bytes, or nothing at all.
    #[error("malformed response: {len} bytes, expected at least 2")]
    MalformedResponse { len: usize },
    /// A fragment was answered with a status that is not allowed for its position.
    #[error("chained send rejected at fragment {fragment} with status {status}")]
    ChainedSend { fragment: usize, status: StatusWord },
    /// A chained response step carried a status other than success or continuation.
    #[error("chained receive failed with status {status}")]
    ChainedReceive { status: StatusWord },
    /// Accumulated response bytes would exceed the reassembly capacity.
    #[error("reassembly overflow: {attempted} bytes exceed the capacity of {capacity}")]
    ReassemblyOverflow { capacity: usize, attempted: usize },
    /// A response block arrived while no chained response was being collected.
    #[error("response block received outside of a chained response")]
    UnexpectedBlock,
}

/// Remediation classes for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The session is not established; select the application again.
    ChannelNotReady,
    /// The tag answered with something unexpected; the data did not make it through.
    CorruptedInTransit,
    /// The payload or the reply does not fit the limits of the channel.
    BufferTooSmall,
    /// The physical channel failed (timeout, tag lost) or was shut down; reconnect.
    ChannelFailure,
}

/// Errors from [`ChainedTransport::send_payload`](crate::ChainedTransport::send_payload).
///
/// Every variant aborts the whole transaction; the payload must be resubmitted.
#[derive(Debug, Error)]
pub enum TransportError<E> {
    /// No application is selected on the channel (or the session was invalidated).
    #[error("channel session not established, select the application first")]
    NotSelected,
    /// The payload is longer than the 16-bit total length field can describe.
    #[error("payload of {len} bytes exceeds the 16-bit total length field")]
    PayloadTooLarge { len: usize },
    /// A response carried fewer than the two status bytes, or nothing at all.
    #[error("malformed response: {len} bytes, expected at least 2")]
    MalformedResponse { len: usize },
    /// A fragment was answered with a status that is not allowed for its position.
    #[error("chained send rejected at fragment {fragment} with status {status}")]
    ChainedSend { fragment: usize, status: StatusWord },
    /// A get-next-block exchange carried a status other than success or continuation.
    #[error("chained receive failed with status {status}")]
    ChainedReceive { status: StatusWord },
    /// The chained response does not fit the reassembly buffer.
    #[error("reassembly overflow: {attempted} bytes exceed the capacity of {capacity}")]
    ReassemblyOverflow { capacity: usize, attempted: usize },
    /// A response block arrived while no chained response was being collected.
    #[error("response block received outside of a chained response")]
    UnexpectedBlock,
    /// The physical channel failed (timeout, disconnect, ...).
    #[error("channel error: {0}")]
    Channel(E),
    /// The channel was shut down before or during the transaction.
    #[error("channel shut down")]
    Shutdown,
}

impl<E> TransportError<E> {
    /// Returns the remediation class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::NotSelected => ErrorKind::ChannelNotReady,
            TransportError::PayloadTooLarge { .. } | TransportError::ReassemblyOverflow { .. } => {
                ErrorKind::BufferTooSmall
            }
            TransportError::MalformedResponse { .. }
            | TransportError::ChainedSend { .. }
            | TransportError::ChainedReceive { .. }
            | TransportError::UnexpectedBlock => ErrorKind::CorruptedInTransit,
            TransportError::Channel(_) | TransportError::Shutdown => ErrorKind::ChannelFailure,
        }
    }

    /// Returns the status word the tag answered with, if the failure carries one.
    pub fn status(&self) -> Option<StatusWord> {
        match self {
            TransportError::ChainedSend { status, .. } | TransportError::ChainedReceive { status } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Whether this error leaves the channel session unusable.
    ///
    /// Only failures detected before any frame is exchanged keep the session.
    pub fn invalidates_session(&self) -> bool {
        !matches!(self, TransportError::PayloadTooLarge { .. } | TransportError::NotSelected)
    }
}

impl<E> From<ProtocolError> for TransportError<E> {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedResponse { len } => TransportError::MalformedResponse { len },
            ProtocolError::ChainedSend { fragment, status } => {
                TransportError::ChainedSend { fragment, status }
            }
            ProtocolError::ChainedReceive { status } => TransportError::ChainedReceive { status },
            ProtocolError::ReassemblyOverflow { capacity, attempted } => {
                TransportError::ReassemblyOverflow { capacity, attempted }
            }
            ProtocolError::UnexpectedBlock => TransportError::UnexpectedBlock,
        }
    }
}

/// Errors from [`ChainedTransport::select_application`](crate::ChainedTransport::select_application).
///
/// After any of these the channel is unusable until selection succeeds.
#[derive(Debug, Error)]
pub enum ChannelSetupError<E> {
    /// The tag refused the selection.
    #[error("application selection rejected with status {0}")]
    Rejected(StatusWord),
    /// The selection response carried fewer than the two status bytes.
    #[error("malformed selection response: {len} bytes, expected at least 2")]
    MalformedResponse { len: usize },
    /// The physical channel failed while connecting or selecting.
    #[error("channel error: {0}")]
    Channel(E),
    /// The channel was shut down.
    #[error("channel shut down")]
    Shutdown,
}

/// Error types that can report a shut-down channel.
///
/// Used by the workers to answer jobs that will never run.
pub trait ShutdownError {
    fn shutdown() -> Self;
}

impl<E> ShutdownError for TransportError<E> {
    fn shutdown() -> Self {
        TransportError::Shutdown
    }
}

impl<E> ShutdownError for ChannelSetupError<E> {
    fn shutdown() -> Self {
        ChannelSetupError::Shutdown
    }
}
