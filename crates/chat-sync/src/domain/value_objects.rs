//! # Domain Value Objects
//!
//! Immutable value types: addresses, transaction references, event keys.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::errors::SyncError;

/// Milliseconds since the unix epoch.
pub type Timestamp = u64;

/// EVM chain identifier.
pub type ChainId = u64;

/// 20-byte account or contract address.
///
/// Stored as raw bytes so comparisons are case-insensitive by construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Is this the zero address?
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = SyncError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let bytes = decode_prefixed_hex(raw, "address")?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| SyncError::decode("address", "expected 20 bytes"))?;
        Ok(Address(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Transaction hash returned on submission.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxRef(pub [u8; 32]);

impl FromStr for TxRef {
    type Err = SyncError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let bytes = decode_prefixed_hex(raw, "transaction hash")?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SyncError::decode("transaction hash", "expected 32 bytes"))?;
        Ok(TxRef(array))
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxRef(0x{}..)", hex::encode(&self.0[..4]))
    }
}

impl Serialize for TxRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Session epoch identifier. Incremented on every wallet change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// The id following this one.
    pub fn next(self) -> Self {
        SessionId(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of an on-chain event: ordered by block, then log index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    /// Block containing the log.
    pub block_number: u64,
    /// Position of the log within the block.
    pub log_index: u32,
}

impl EventKey {
    /// Create a new key.
    pub fn new(block_number: u64, log_index: u32) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

/// Outcome of a mined transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    /// Executed successfully.
    Success,
    /// Reverted.
    Failure,
}

/// Decode `0x`-prefixed hex into bytes.
pub(crate) fn decode_prefixed_hex(raw: &str, field: &str) -> Result<Vec<u8>, SyncError> {
    let value = raw.trim();
    let without_prefix = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| SyncError::decode(field, "must be 0x-prefixed hex"))?;
    hex::decode(without_prefix).map_err(|e| SyncError::decode(field, e))
}
