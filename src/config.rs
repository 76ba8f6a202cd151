//! Channel configuration.
//!
//! The configuration is fixed when the channel is established. Defaults match the
//! commissioning application on Type 4 Tags:
//!
//! | Setting                | Default                        |
//! |------------------------|--------------------------------|
//! | Max outbound fragment  | 245 bytes                      |
//! | Max inbound fragment   | 250 bytes                      |
//! | Reassembly capacity    | 2048 bytes                     |
//! | Exchange timeout       | 5000 ms                        |
//! | Application identifier | `A0 00 00 09 09 8A 77 E4 01`   |

use alloc::vec::Vec;
use core::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Well-known identifier of the commissioning application.
pub const DEFAULT_APPLICATION_ID: [u8; 9] = [0xA0, 0x00, 0x00, 0x09, 0x09, 0x8A, 0x77, 0xE4, 0x01];

/// Maximum payload bytes carried by one outbound fragment.
pub const DEFAULT_MAX_OUTBOUND_FRAGMENT: usize = 245;

/// Maximum payload bytes requested per inbound block.
pub const DEFAULT_MAX_INBOUND_FRAGMENT: usize = 250;

/// Capacity of the reassembly buffer for one chained response.
pub const DEFAULT_REASSEMBLY_CAPACITY: usize = 2048;

/// Default timeout of a single raw exchange.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_millis(5000);

/// ISO 7816-4 bounds on an application identifier length.
const AID_LEN: core::ops::RangeInclusive<usize> = 5..=16;

/// Settings of one commissioning channel.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChannelConfig {
    /// Maximum payload bytes per outbound fragment (Lc). Default: 245.
    pub max_outbound_fragment: usize,
    /// Maximum payload bytes per inbound block, sent as Le. Default: 250.
    pub max_inbound_fragment: usize,
    /// Timeout applied to every raw exchange. Default: 5 s.
    pub timeout: Duration,
    /// Application identifier selected at setup.
    pub application_id: Vec<u8>,
    /// Upper bound on the bytes of one reassembled response. Default: 2048.
    pub reassembly_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_outbound_fragment: DEFAULT_MAX_OUTBOUND_FRAGMENT,
            max_inbound_fragment: DEFAULT_MAX_INBOUND_FRAGMENT,
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
            application_id: DEFAULT_APPLICATION_ID.to_vec(),
            reassembly_capacity: DEFAULT_REASSEMBLY_CAPACITY,
        }
    }
}

impl ChannelConfig {
    pub fn with_max_outbound_fragment(mut self, size: usize) -> Self {
        self.max_outbound_fragment = size;
        self
    }

    pub fn with_max_inbound_fragment(mut self, size: usize) -> Self {
        self.max_inbound_fragment = size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_application_id(mut self, application_id: impl Into<Vec<u8>>) -> Self {
        self.application_id = application_id.into();
        self
    }

    pub fn with_reassembly_capacity(mut self, capacity: usize) -> Self {
        self.reassembly_capacity = capacity;
        self
    }

    /// Checks that every setting can be expressed on the wire.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=255).contains(&self.max_outbound_fragment) {
            return Err(ConfigError::OutboundFragment(self.max_outbound_fragment));
        }
        if !(1..=255).contains(&self.max_inbound_fragment) {
            return Err(ConfigError::InboundFragment(self.max_inbound_fragment));
        }
        if self.reassembly_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !AID_LEN.contains(&self.application_id.len()) {
            return Err(ConfigError::ApplicationId(self.application_id.len()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// The inbound fragment size as the Le byte. Only meaningful once validated.
    pub(crate) fn le(&self) -> u8 {
        self.max_inbound_fragment.min(255) as u8
    }
}
