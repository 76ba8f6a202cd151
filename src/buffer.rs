//! Bounded storage for reassembled responses.
//!
//! The [`Buffer`] trait lets the reassembler work with different storage
//! implementations (heap-allocated `Vec`, stack-allocated `heapless::Vec`, ...).
//! [`ReassemblyBuffer`] puts the configured capacity on top of it: appending past the
//! capacity fails, it never truncates.

use alloc::vec::Vec;
use core::fmt::Debug;

#[cfg(feature = "heapless-buffer")]
use heapless::Vec as HeaplessVec;
use thiserror::Error;

use crate::error::ProtocolError;

/// The storage refused to grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("buffer capacity exceeded")]
pub struct CapacityExceeded;

/// Trait for types that can hold the bytes of a reassembled response.
pub trait Buffer: AsRef<[u8]> + Debug {
    /// Hard limit of the storage, or `None` if it grows on demand.
    fn storage_limit(&self) -> Option<usize>;

    /// Returns the current length of valid data in the buffer.
    fn len(&self) -> usize {
        self.as_ref().len()
    }

    /// Returns true if the buffer contains no valid data.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all data, keeping the allocation.
    fn clear(&mut self);

    /// Appends `data`, or leaves the buffer untouched if it does not fit.
    fn try_extend(&mut self, data: &[u8]) -> Result<(), CapacityExceeded>;
}

/// Buffer implementation for heap-allocated `Vec<u8>`.
impl Buffer for Vec<u8> {
    fn storage_limit(&self) -> Option<usize> {
        None
    }

    fn clear(&mut self) {
        Vec::clear(self)
    }

    fn try_extend(&mut self, data: &[u8]) -> Result<(), CapacityExceeded> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Buffer implementation for stack-allocated `heapless::Vec<u8, N>`.
#[cfg(feature = "heapless-buffer")]
impl<const N: usize> Buffer for HeaplessVec<u8, N> {
    fn storage_limit(&self) -> Option<usize> {
        Some(N)
    }

    fn clear(&mut self) {
        HeaplessVec::clear(self)
    }

    fn try_extend(&mut self, data: &[u8]) -> Result<(), CapacityExceeded> {
        if self.len() + data.len() > N {
            return Err(CapacityExceeded);
        }
        self.extend_from_slice(data).map_err(|_| CapacityExceeded)
    }
}

/// Accumulator for the body bytes of one chained response.
///
/// Belongs to a single transaction: it is reset when a response starts and drained
/// when the response completes.
#[derive(Debug)]
pub struct ReassemblyBuffer<B: Buffer> {
    storage: B,
    capacity: usize,
}

impl<B: Buffer> ReassemblyBuffer<B> {
    /// Wraps `storage`, capping it at `capacity` bytes.
    ///
    /// The effective capacity is the smaller of `capacity` and the storage limit.
    pub fn new(mut storage: B, capacity: usize) -> Self {
        storage.clear();
        let capacity = match storage.storage_limit() {
            Some(limit) => capacity.min(limit),
            None => capacity,
        };
        Self { storage, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.storage.as_ref()
    }

    pub fn reset(&mut self) {
        self.storage.clear();
    }

    /// Appends `data`, failing without modification if the capacity would be exceeded.
    pub fn append(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        let attempted = self.len() + data.len();
        if attempted > self.capacity {
            return Err(ProtocolError::ReassemblyOverflow { capacity: self.capacity, attempted });
        }
        self.storage
            .try_extend(data)
            .map_err(|CapacityExceeded| ProtocolError::ReassemblyOverflow { capacity: self.capacity, attempted })
    }

    /// Copies the accumulated bytes out and resets the buffer.
    pub fn take(&mut self) -> Vec<u8> {
        let bytes = self.storage.as_ref().to_vec();
        self.storage.clear();
        bytes
    }
}
