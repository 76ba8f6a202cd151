//! Chained transport drivers.
//!
//! The drivers own the channel and the sans-I/O core ([`ChannelSession`] and
//! [`Reassembler`]) and perform the exchanges the core asks for. Both flavours share
//! the same core and the same logging, statistics and shutdown handling.
//!
//! [`ChannelSession`]: crate::ChannelSession
//! [`Reassembler`]: crate::Reassembler

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::buffer::{Buffer, ReassemblyBuffer};
use crate::config::ChannelConfig;
use crate::reassembly::Reassembler;
use crate::session::ChannelSession;

pub mod sync;

#[cfg(feature = "async-transport")]
pub mod r#async;

/// Shared flag that ends every transaction of a channel.
///
/// Once tripped, the driver refuses to perform any further exchange: the transaction
/// in flight fails with a shutdown error at its next exchange boundary.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Traffic counters of the last transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Command fragments exchanged.
    pub fragments_sent: usize,
    /// GET RESPONSE exchanges performed.
    pub blocks_read: usize,
    /// Payload bytes carried by the command fragments.
    pub bytes_sent: usize,
    /// Bytes of the reassembled reply.
    pub bytes_received: usize,
}

/// Builds the sans-I/O core of a channel from a validated configuration.
pub(crate) fn protocol_core<B: Buffer>(config: ChannelConfig, storage: B) -> (ChannelSession, Reassembler<B>) {
    let buffer = ReassemblyBuffer::new(storage, config.reassembly_capacity);
    let reassembler = Reassembler::new(buffer, config.le());
    (ChannelSession::new(config), reassembler)
}
