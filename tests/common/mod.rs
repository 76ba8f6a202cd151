//! Type 4 Tag emulator shared by the integration tests.
//!
//! Parses every command frame, reassembles chained payloads, hands the payload to a
//! responder and serves the reply in `61 XX` chained blocks.
#![allow(dead_code, unused_imports)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use type4_chain::config::DEFAULT_APPLICATION_ID;
use type4_chain::{Class, CommandApdu, Instruction, TagChannel};

pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorError {
    TagLost,
}

/// Frames seen by the emulator, shared with the test after the emulator moved away.
#[derive(Debug, Clone, Default)]
pub struct FrameLog(Arc<Mutex<Vec<Vec<u8>>>>);

impl FrameLog {
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn push(&self, frame: &[u8]) {
        self.0.lock().unwrap().push(frame.to_vec());
    }
}

/// Blocks transport fragments until the test releases them.
#[derive(Debug)]
pub struct Gate {
    pub entered: Sender<()>,
    pub release: Receiver<()>,
}

pub struct TagEmulator {
    responder: Responder,
    block_size: usize,
    forced_sw2: Option<u8>,
    announce_only: bool,
    reject_fragment: Option<(usize, [u8; 2])>,
    selected: bool,
    connected: bool,
    inbound: Vec<u8>,
    fragment_index: usize,
    outbound: VecDeque<u8>,
    log: FrameLog,
    gate: Option<Gate>,
    pub timeout: Option<Duration>,
    pub connects: usize,
}

impl core::fmt::Debug for TagEmulator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TagEmulator")
            .field("selected", &self.selected)
            .field("inbound", &self.inbound.len())
            .field("outbound", &self.outbound.len())
            .finish()
    }
}

impl TagEmulator {
    /// A tag that answers every payload with the same bytes.
    pub fn echo() -> Self {
        Self::with_responder(|payload| payload.to_vec())
    }

    pub fn with_responder(responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            block_size: 250,
            forced_sw2: None,
            announce_only: false,
            reject_fragment: None,
            selected: false,
            connected: false,
            inbound: Vec::new(),
            fragment_index: 0,
            outbound: VecDeque::new(),
            log: FrameLog::default(),
            gate: None,
            timeout: None,
            connects: 0,
        }
    }

    /// Largest body the tag puts in one response.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Announces every continuation with this SW2 instead of the real count.
    pub fn forced_sw2(mut self, sw2: u8) -> Self {
        self.forced_sw2 = Some(sw2);
        self
    }

    /// Puts no reply bytes in the answer to the last fragment, only `61 XX`.
    pub fn announce_only(mut self) -> Self {
        self.announce_only = true;
        self
    }

    /// Answers the fragment at `index` with `status` instead of accepting it.
    pub fn reject_fragment(mut self, index: usize, status: [u8; 2]) -> Self {
        self.reject_fragment = Some((index, status));
        self
    }

    pub fn gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn log(&self) -> FrameLog {
        self.log.clone()
    }

    fn handle(&mut self, command: &CommandApdu<'_>) -> Vec<u8> {
        match command.instruction() {
            Instruction::Select => {
                self.selected = command.data() == DEFAULT_APPLICATION_ID;
                if self.selected { vec![0x90, 0x00] } else { vec![0x6A, 0x82] }
            }
            Instruction::Transport => self.receive_fragment(command),
            Instruction::GetResponse => {
                let le = match command.le() {
                    Some(0) | None => 256,
                    Some(le) => le as usize,
                };
                self.respond(le)
            }
        }
    }

    fn receive_fragment(&mut self, command: &CommandApdu<'_>) -> Vec<u8> {
        if !self.selected {
            return vec![0x69, 0x85];
        }
        let index = self.fragment_index;
        self.fragment_index += 1;
        if let Some((reject, status)) = self.reject_fragment {
            if reject == index {
                return status.to_vec();
            }
        }
        if let Some(gate) = &self.gate {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }

        self.inbound.extend_from_slice(command.data());
        match command.class() {
            Class::ChainIntermediate => vec![0x90, 0x00],
            _ => {
                self.fragment_index = 0;
                let payload = std::mem::take(&mut self.inbound);
                if payload.len() != command.p1p2() as usize {
                    return vec![0x67, 0x00];
                }
                self.outbound = (self.responder)(&payload).into();
                let first = if self.announce_only && !self.outbound.is_empty() { 0 } else { self.block_size };
                self.respond(first)
            }
        }
    }

    fn respond(&mut self, requested: usize) -> Vec<u8> {
        let take = requested.min(self.block_size).min(self.outbound.len());
        let mut response: Vec<u8> = self.outbound.drain(..take).collect();
        if self.outbound.is_empty() {
            response.extend_from_slice(&[0x90, 0x00]);
        } else {
            let available = self.forced_sw2.unwrap_or(self.outbound.len().min(0xFF) as u8);
            response.extend_from_slice(&[0x61, available]);
        }
        response
    }
}

impl TagChannel for TagEmulator {
    type Error = EmulatorError;

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self) -> Result<(), Self::Error> {
        self.connects += 1;
        self.connected = true;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), Self::Error> {
        self.timeout = Some(timeout);
        Ok(())
    }

    fn transceive(&mut self, frame: &[u8]) -> Result<Vec<u8>, Self::Error> {
        self.log.push(frame);
        match CommandApdu::parse(frame) {
            Ok(command) => Ok(self.handle(&command)),
            Err(_) => Ok(vec![0x67, 0x00]),
        }
    }
}

#[cfg(feature = "async-transport")]
mod async_channel {
    use std::future::Future;
    use std::time::Duration;

    use type4_chain::{AsyncTagChannel, TagChannel};

    use super::{EmulatorError, TagEmulator};

    /// The emulator behind the async channel trait; every call yields once.
    #[derive(Debug)]
    pub struct AsyncTagEmulator(pub TagEmulator);

    impl AsyncTagChannel for AsyncTagEmulator {
        type Error = EmulatorError;

        fn is_connected(&self) -> bool {
            self.0.is_connected()
        }

        fn connect(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send {
            let result = self.0.connect();
            async move {
                tokio::task::yield_now().await;
                result
            }
        }

        fn set_timeout(&mut self, timeout: Duration) -> impl Future<Output = Result<(), Self::Error>> + Send {
            let result = self.0.set_timeout(timeout);
            async move { result }
        }

        fn transceive(&mut self, command: &[u8]) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send {
            let result = self.0.transceive(command);
            async move {
                tokio::task::yield_now().await;
                result
            }
        }
    }
}

#[cfg(feature = "async-transport")]
pub use async_channel::AsyncTagEmulator;
