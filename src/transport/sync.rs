//! Blocking channel trait.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::time::Duration;

/// Trait representing a connected ISO-DEP channel to one tag.
///
/// This trait allows the [`ChainedTransport`](crate::ChainedTransport) to be agnostic
/// of the platform's NFC stack (Android `IsoDep`, PC/SC, a PN532 over UART, ...).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use type4_chain::TagChannel;
///
/// #[derive(Debug, Default)]
/// struct AlwaysOk {
///     connected: bool,
/// }
///
/// impl TagChannel for AlwaysOk {
///     type Error = std::io::Error;
///
///     fn is_connected(&self) -> bool {
///         self.connected
///     }
///
///     fn connect(&mut self) -> Result<(), Self::Error> {
///         self.connected = true;
///         Ok(())
///     }
///
///     fn set_timeout(&mut self, _timeout: Duration) -> Result<(), Self::Error> {
///         Ok(())
///     }
///
///     fn transceive(&mut self, _command: &[u8]) -> Result<Vec<u8>, Self::Error> {
///         Ok(vec![0x90, 0x00])
///     }
/// }
///
/// let mut channel = AlwaysOk::default();
/// let response = type4_chain::transport::sync::exchange(&mut channel, &[0x00, 0xC0, 0x00, 0x00, 0x05]).unwrap();
/// assert!(channel.is_connected());
/// assert_eq!(response, [0x90, 0x00]);
/// ```
pub trait TagChannel: Debug {
    /// The error type returned by channel operations (timeouts, lost tag, ...).
    type Error: Debug;

    /// Whether the physical channel is currently connected.
    fn is_connected(&self) -> bool;

    /// Connects the physical channel.
    fn connect(&mut self) -> Result<(), Self::Error>;

    /// Sets the timeout applied to every subsequent [`transceive`](Self::transceive).
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), Self::Error>;

    /// Sends one command frame and returns the complete response frame, status word
    /// included. An absent response is returned as an empty vector.
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, Self::Error>;
}

/// Performs one raw exchange, connecting the channel first if it reports itself
/// disconnected.
pub fn exchange<C: TagChannel + ?Sized>(channel: &mut C, command: &[u8]) -> Result<Vec<u8>, C::Error> {
    ensure_connected(channel)?;
    channel.transceive(command)
}

/// Connects the channel unless it already is.
pub fn ensure_connected<C: TagChannel + ?Sized>(channel: &mut C) -> Result<(), C::Error> {
    if !channel.is_connected() {
        log::debug!("tag channel disconnected, reconnecting");
        channel.connect()?;
    }
    Ok(())
}
