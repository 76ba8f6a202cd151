//! Async channel trait.
//!
//! Methods return `impl Future + Send` instead of being declared `async fn` so the
//! futures can be moved between threads by work-stealing runtimes (the tokio worker
//! spawns the engine on one).

use alloc::vec::Vec;
use core::fmt::Debug;
use core::future::Future;
use core::time::Duration;

/// Async counterpart of [`TagChannel`](crate::TagChannel).
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use type4_chain::AsyncTagChannel;
///
/// #[derive(Debug)]
/// struct Reader;
///
/// impl AsyncTagChannel for Reader {
///     type Error = std::io::Error;
///
///     fn is_connected(&self) -> bool {
///         true
///     }
///
///     async fn connect(&mut self) -> Result<(), Self::Error> {
///         Ok(())
///     }
///
///     async fn set_timeout(&mut self, _timeout: Duration) -> Result<(), Self::Error> {
///         Ok(())
///     }
///
///     async fn transceive(&mut self, _command: &[u8]) -> Result<Vec<u8>, Self::Error> {
///         Ok(vec![0x90, 0x00])
///     }
/// }
/// ```
pub trait AsyncTagChannel: Debug + Send {
    /// The error type returned by channel operations.
    type Error: Debug + Send;

    /// Whether the physical channel is currently connected.
    fn is_connected(&self) -> bool;

    /// Connects the physical channel.
    fn connect(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Sets the timeout applied to every subsequent [`transceive`](Self::transceive).
    fn set_timeout(&mut self, timeout: Duration) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Sends one command frame and resolves to the complete response frame.
    fn transceive(&mut self, command: &[u8]) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send;
}

/// Performs one raw exchange, connecting the channel first if it reports itself
/// disconnected.
pub async fn exchange<C: AsyncTagChannel>(channel: &mut C, command: &[u8]) -> Result<Vec<u8>, C::Error> {
    ensure_connected(channel).await?;
    channel.transceive(command).await
}

/// Connects the channel unless it already is.
pub async fn ensure_connected<C: AsyncTagChannel>(channel: &mut C) -> Result<(), C::Error> {
    if !channel.is_connected() {
        log::debug!("tag channel disconnected, reconnecting");
        channel.connect().await?;
    }
    Ok(())
}
