#![cfg_attr(not(feature = "std"), no_std)]

//! Chained-APDU transport for NFC Type 4 Tag commissioning channels.
//!
//! This crate carries an opaque commissioning payload of any size (up to the 16-bit
//! total length field) over an ISO-DEP channel whose frames are small and fixed. It
//! consists of:
//!
//! - an [`ChannelSession`] core that selects the commissioning application,
//! - a [`Fragments`] iterator that splits outbound payloads into chained command APDUs,
//! - a [`Reassembler`] state machine that collects `61 XX` chained responses into a
//!   bounded buffer,
//! - I/O drivers ([`ChainedTransport`], and `AsyncChainedTransport` with the
//!   `async-transport` feature) that run the protocol over a [`TagChannel`],
//! - a single-consumer [`TagWorker`] (with `std`) that serializes transactions for one tag.
//!
//! The protocol core is sans-I/O and works in `no_std` environments with `alloc`.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use type4_chain::{ChannelConfig, TagChannel, TransportBuilder};
//!
//! #[derive(Debug)]
//! struct Reader;
//!
//! impl TagChannel for Reader {
//!     type Error = std::io::Error;
//!     fn is_connected(&self) -> bool { true }
//!     fn connect(&mut self) -> Result<(), Self::Error> { Ok(()) }
//!     fn set_timeout(&mut self, _timeout: Duration) -> Result<(), Self::Error> { Ok(()) }
//!     fn transceive(&mut self, _command: &[u8]) -> Result<Vec<u8>, Self::Error> {
//!         Ok(vec![0x90, 0x00])
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut transport = TransportBuilder::new(Reader, ChannelConfig::default()).build_with_heap()?;
//! transport.establish()?;
//! let reply = transport.send_payload(b"commissioning request")?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

extern crate alloc;

pub mod apdu;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod reassembly;
pub mod session;
pub mod status;
pub mod transport;

#[cfg(feature = "std")]
pub mod worker;

pub use apdu::{Class, CommandApdu, Instruction};
pub use buffer::{Buffer, ReassemblyBuffer};
pub use config::ChannelConfig;
pub use engine::sync::{ChainedTransport, TransportBuilder};
pub use engine::{ShutdownSignal, TransferStats};
pub use error::{ChannelSetupError, ConfigError, ErrorKind, FrameError, ProtocolError, TransportError};
pub use fragment::{Fragment, Fragments};
pub use reassembly::{ReassemblyStep, Reassembler, ReceiveState};
pub use session::{ChannelSession, SessionState};
pub use status::{ResponseApdu, StatusWord};
pub use transport::sync::TagChannel;

#[cfg(feature = "async-transport")]
pub use engine::r#async::AsyncChainedTransport;
#[cfg(feature = "async-transport")]
pub use transport::r#async::AsyncTagChannel;

#[cfg(feature = "std")]
pub use worker::{Pending, TagWorker};

#[cfg(feature = "tokio")]
pub use worker::tokio::AsyncTagWorker;
