use alloc::vec::Vec;
use core::time::Duration;

use log::{debug, trace, warn};

#[cfg(feature = "heapless-buffer")]
use heapless::Vec as HeaplessVec;

use crate::apdu::CommandApdu;
use crate::buffer::Buffer;
use crate::config::ChannelConfig;
use crate::engine::{ShutdownSignal, TransferStats, protocol_core};
use crate::error::{ChannelSetupError, ConfigError, TransportError};
use crate::fragment::Fragments;
use crate::reassembly::{ReassemblyStep, Reassembler};
use crate::session::ChannelSession;
use crate::transport::sync::{self as channel_io, TagChannel};

/// Blocking driver of one commissioning channel.
///
/// Generic over:
/// - `C`: the channel to the tag (PC/SC reader, platform NFC stack, emulator, ...)
/// - `B`: the reassembly storage (`Vec<u8>` on the heap, `heapless::Vec<u8, N>` without one)
///
/// # Examples
///
/// ```no_run
/// use type4_chain::{ChannelConfig, TransportBuilder};
/// # use std::time::Duration;
/// # #[derive(Debug)]
/// # struct Reader;
/// # impl type4_chain::TagChannel for Reader {
/// #     type Error = ();
/// #     fn is_connected(&self) -> bool { true }
/// #     fn connect(&mut self) -> Result<(), ()> { Ok(()) }
/// #     fn set_timeout(&mut self, _timeout: Duration) -> Result<(), ()> { Ok(()) }
/// #     fn transceive(&mut self, _command: &[u8]) -> Result<Vec<u8>, ()> { Ok(vec![0x90, 0x00]) }
/// # }
///
/// let mut transport = TransportBuilder::new(Reader, ChannelConfig::default())
///     .build_with_heap()
///     .unwrap();
/// transport.establish().unwrap();
/// let reply = transport.send_payload(&[0x01, 0x02, 0x03]).unwrap();
/// println!("{} bytes in {} blocks", reply.len(), transport.stats().blocks_read);
/// ```
#[derive(Debug)]
pub struct ChainedTransport<C: TagChannel, B: Buffer> {
    channel: C,
    session: ChannelSession,
    reassembler: Reassembler<B>,
    shutdown: ShutdownSignal,
    stats: TransferStats,
}

/// Builder for a [`ChainedTransport`] with an explicit reassembly storage strategy.
///
/// The configuration is validated when the transport is built.
#[derive(Debug)]
pub struct TransportBuilder<C: TagChannel> {
    channel: C,
    config: ChannelConfig,
    shutdown: ShutdownSignal,
}

impl<C: TagChannel> TransportBuilder<C> {
    pub fn new(channel: C, config: ChannelConfig) -> Self {
        Self { channel, config, shutdown: ShutdownSignal::new() }
    }

    /// Uses an existing signal instead of a fresh one, so the channel can be shut down
    /// from elsewhere.
    pub fn with_shutdown_signal(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Builds a transport whose reassembly buffer grows on the heap up to the
    /// configured capacity.
    pub fn build_with_heap(self) -> Result<ChainedTransport<C, Vec<u8>>, ConfigError> {
        let capacity = self.config.reassembly_capacity;
        self.build(Vec::with_capacity(capacity))
    }

    /// Builds a transport whose reassembly buffer is a fixed `N`-byte array.
    ///
    /// The effective capacity is the smaller of `N` and the configured capacity.
    #[cfg(feature = "heapless-buffer")]
    pub fn build_with_heapless<const N: usize>(self) -> Result<ChainedTransport<C, HeaplessVec<u8, N>>, ConfigError> {
        self.build(HeaplessVec::new())
    }

    fn build<B: Buffer>(self, storage: B) -> Result<ChainedTransport<C, B>, ConfigError> {
        self.config.validate()?;
        let (session, reassembler) = protocol_core(self.config, storage);
        Ok(ChainedTransport {
            channel: self.channel,
            session,
            reassembler,
            shutdown: self.shutdown,
            stats: TransferStats::default(),
        })
    }
}

impl<C: TagChannel, B: Buffer> ChainedTransport<C, B> {
    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn session(&self) -> &ChannelSession {
        &self.session
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Counters of the last transaction.
    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// Releases the channel.
    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Sets the timeout of every subsequent exchange, connecting the channel first if
    /// it reports itself disconnected.
    pub fn configure_timeout(&mut self, timeout: Duration) -> Result<(), C::Error> {
        channel_io::ensure_connected(&mut self.channel)?;
        self.channel.set_timeout(timeout)?;
        debug!("exchange timeout set to {} ms", timeout.as_millis());
        Ok(())
    }

    /// Channel setup: applies the configured timeout, then selects the application.
    pub fn establish(&mut self) -> Result<Option<Vec<u8>>, ChannelSetupError<C::Error>> {
        if self.shutdown.is_tripped() {
            return Err(ChannelSetupError::Shutdown);
        }
        let timeout = self.session.config().timeout;
        self.configure_timeout(timeout).map_err(ChannelSetupError::Channel)?;
        self.select_application()
    }

    /// Selects the commissioning application on the tag.
    ///
    /// Returns the application data carried in the answer, if any. On failure the
    /// session stays unusable until a selection succeeds.
    pub fn select_application(&mut self) -> Result<Option<Vec<u8>>, ChannelSetupError<C::Error>> {
        if self.shutdown.is_tripped() {
            return Err(ChannelSetupError::Shutdown);
        }
        let frame = self.session.select_command().encode();
        let response = match self.transceive(&frame) {
            Ok(response) => response,
            Err(err) => {
                self.session.invalidate();
                return Err(ChannelSetupError::Channel(err));
            }
        };
        self.session.handle_select_response(&response)
    }

    /// Sends `payload` as a chain of fragments and returns the reassembled reply.
    ///
    /// Any failure aborts the whole transaction; nothing is retried.
    pub fn send_payload(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError<C::Error>> {
        if !self.session.is_selected() {
            return Err(TransportError::NotSelected);
        }
        let fragments = Fragments::new(payload, self.session.config().max_outbound_fragment)
            .map_err(|_| TransportError::PayloadTooLarge { len: payload.len() })?;

        self.stats = TransferStats::default();
        debug!("sending {} byte payload in {} fragments", payload.len(), fragments.count_total());

        match self.transact(fragments) {
            Ok(reply) => {
                debug!(
                    "transaction complete: {} byte reply in {} blocks",
                    reply.len(),
                    self.stats.blocks_read
                );
                Ok(reply)
            }
            Err(err) => {
                warn!("transaction aborted: {:?}", err);
                self.reassembler.abort();
                if err.invalidates_session() {
                    self.session.invalidate();
                }
                Err(err)
            }
        }
    }

    fn transact(&mut self, fragments: Fragments<'_>) -> Result<Vec<u8>, TransportError<C::Error>> {
        let le = self.session.config().le();

        // Fragments always ends with a last fragment, whose answer starts the reply.
        let mut step = ReassemblyStep::Complete(Vec::new());
        for fragment in fragments {
            let response = self.exchange(&fragment.to_command(le))?;
            self.stats.fragments_sent += 1;
            self.stats.bytes_sent += fragment.chunk.len();
            let apdu = fragment.accept(&response)?;
            if fragment.is_last {
                step = self.reassembler.begin(apdu)?;
            }
        }

        loop {
            match step {
                ReassemblyStep::Complete(reply) => {
                    self.stats.blocks_read = self.reassembler.blocks_read();
                    self.stats.bytes_received = reply.len();
                    return Ok(reply);
                }
                ReassemblyStep::ReadNext { le } => {
                    let response = self.exchange(&CommandApdu::get_response(le))?;
                    step = self.reassembler.next_block(&response)?;
                }
            }
        }
    }

    fn exchange(&mut self, command: &CommandApdu<'_>) -> Result<Vec<u8>, TransportError<C::Error>> {
        if self.shutdown.is_tripped() {
            return Err(TransportError::Shutdown);
        }
        self.transceive(&command.encode()).map_err(TransportError::Channel)
    }

    fn transceive(&mut self, frame: &[u8]) -> Result<Vec<u8>, C::Error> {
        trace!("-> {:02X?}", frame);
        let response = channel_io::exchange(&mut self.channel, frame)?;
        trace!("<- {:02X?}", response);
        Ok(response)
    }
}
