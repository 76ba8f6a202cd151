//! Physical channel abstraction.
//!
//! The engine does not talk to NFC hardware itself. It needs a raw, synchronous
//! request/response primitive over a connected ISO-DEP channel, supplied by the
//! platform:
//!
//! - [`sync::TagChannel`] for blocking readers (used by [`ChainedTransport`](crate::ChainedTransport)
//!   and the [`TagWorker`](crate::TagWorker)),
//! - [`r#async::AsyncTagChannel`] for async readers (feature `async-transport`).
//!
//! Both come with an `exchange` helper that reconnects the channel when it reports
//! itself disconnected before performing the request. Reliability of the channel
//! itself (retries, re-detection of the tag) is the implementation's business;
//! timeouts must surface as errors of the channel type, never as status words.

pub mod sync;

#[cfg(feature = "async-transport")]
pub mod r#async;
