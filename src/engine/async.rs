use alloc::vec::Vec;
use core::time::Duration;

use log::{debug, trace, warn};

use crate::apdu::CommandApdu;
use crate::buffer::Buffer;
use crate::config::ChannelConfig;
use crate::engine::{ShutdownSignal, TransferStats, protocol_core};
use crate::error::{ChannelSetupError, ConfigError, TransportError};
use crate::fragment::Fragments;
use crate::reassembly::{ReassemblyStep, Reassembler};
use crate::session::ChannelSession;
use crate::transport::r#async::{self as channel_io, AsyncTagChannel};

/// Async driver of one commissioning channel.
///
/// Runs the same protocol core as [`ChainedTransport`](crate::ChainedTransport) over an
/// [`AsyncTagChannel`]. The futures it returns are `Send` when the channel and the
/// storage are, so the transport can live inside a spawned task.
#[derive(Debug)]
pub struct AsyncChainedTransport<C: AsyncTagChannel, B: Buffer = Vec<u8>> {
    channel: C,
    session: ChannelSession,
    reassembler: Reassembler<B>,
    shutdown: ShutdownSignal,
    stats: TransferStats,
}

impl<C: AsyncTagChannel> AsyncChainedTransport<C, Vec<u8>> {
    /// Creates a transport with a heap reassembly buffer.
    pub fn new(channel: C, config: ChannelConfig) -> Result<Self, ConfigError> {
        let capacity = config.reassembly_capacity;
        Self::with_storage(channel, config, Vec::with_capacity(capacity))
    }
}

impl<C: AsyncTagChannel, B: Buffer> AsyncChainedTransport<C, B> {
    /// Creates a transport that reassembles into `storage`.
    pub fn with_storage(channel: C, config: ChannelConfig, storage: B) -> Result<Self, ConfigError> {
        config.validate()?;
        let (session, reassembler) = protocol_core(config, storage);
        Ok(Self { channel, session, reassembler, shutdown: ShutdownSignal::new(), stats: TransferStats::default() })
    }

    pub fn with_shutdown_signal(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

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

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    pub async fn configure_timeout(&mut self, timeout: Duration) -> Result<(), C::Error> {
        channel_io::ensure_connected(&mut self.channel).await?;
        self.channel.set_timeout(timeout).await?;
        debug!("exchange timeout set to {} ms", timeout.as_millis());
        Ok(())
    }

    pub async fn establish(&mut self) -> Result<Option<Vec<u8>>, ChannelSetupError<C::Error>> {
        if self.shutdown.is_tripped() {
            return Err(ChannelSetupError::Shutdown);
        }
        let timeout = self.session.config().timeout;
        self.configure_timeout(timeout).await.map_err(ChannelSetupError::Channel)?;
        self.select_application().await
    }

    pub async fn select_application(&mut self) -> Result<Option<Vec<u8>>, ChannelSetupError<C::Error>> {
        if self.shutdown.is_tripped() {
            return Err(ChannelSetupError::Shutdown);
        }
        let frame = self.session.select_command().encode();
        let response = match self.transceive(&frame).await {
            Ok(response) => response,
            Err(err) => {
                self.session.invalidate();
                return Err(ChannelSetupError::Channel(err));
            }
        };
        self.session.handle_select_response(&response)
    }

    /// Sends `payload` as a chain of fragments and resolves to the reassembled reply.
    pub async fn send_payload(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError<C::Error>> {
        if !self.session.is_selected() {
            return Err(TransportError::NotSelected);
        }
        let fragments = Fragments::new(payload, self.session.config().max_outbound_fragment)
            .map_err(|_| TransportError::PayloadTooLarge { len: payload.len() })?;

        self.stats = TransferStats::default();
        debug!("sending {} byte payload in {} fragments", payload.len(), fragments.count_total());

        match self.transact(fragments).await {
            Ok(reply) => {
                debug!("transaction complete: {} byte reply in {} blocks", reply.len(), self.stats.blocks_read);
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

    async fn transact(&mut self, fragments: Fragments<'_>) -> Result<Vec<u8>, TransportError<C::Error>> {
        let le = self.session.config().le();

        let mut step = ReassemblyStep::Complete(Vec::new());
        for fragment in fragments {
            let response = self.exchange(&fragment.to_command(le).encode()).await?;
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
                    let response = self.exchange(&CommandApdu::get_response(le).encode()).await?;
                    step = self.reassembler.next_block(&response)?;
                }
            }
        }
    }

    async fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError<C::Error>> {
        if self.shutdown.is_tripped() {
            return Err(TransportError::Shutdown);
        }
        self.transceive(frame).await.map_err(TransportError::Channel)
    }

    async fn transceive(&mut self, frame: &[u8]) -> Result<Vec<u8>, C::Error> {
        trace!("-> {:02X?}", frame);
        let response = channel_io::exchange(&mut self.channel, frame).await?;
        trace!("<- {:02X?}", response);
        Ok(response)
    }
}
