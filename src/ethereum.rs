//! Ethereum address helpers.
//!
//! Transfer addresses are treated as opaque strings everywhere in the engine;
//! parsing only happens to recognise the null (burn) address and to validate
//! the contract address a fetch is issued for.

use alloy_primitives::Address;
use std::str::FromStr;
use thiserror::Error;

/// Destination of burn events
pub const NULL_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("Not a hex address: {0:?}")]
    InvalidFormat(String),

    #[error("Expected 40 hex digits, got {len}: {input:?}")]
    InvalidLength { input: String, len: usize },
}

/// A token contract address accepted by the fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContractAddress(Address);

impl ContractAddress {
    /// Accepts 40 hex digits with or without a `0x`/`0X` prefix, any case
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != 40 {
            return Err(AddressError::InvalidLength {
                input: input.to_string(),
                len: digits.len(),
            });
        }

        // alloy rejects mixed-case input with a bad checksum; compare on lowercase
        Address::from_str(&digits.to_ascii_lowercase())
            .map(Self)
            .map_err(|_| AddressError::InvalidFormat(input.to_string()))
    }

    /// Lowercase `0x`-prefixed form, as used in API queries
    pub fn to_query_string(&self) -> String {
        format!("{:#x}", self.0)
    }

    pub fn to_checksum(&self) -> String {
        self.0.to_checksum(None)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl FromStr for ContractAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

/// Whether a transfer's recipient is the all-zero address.
///
/// Strings that do not parse as an address are never the null address.
pub fn is_null_address(address: &str) -> bool {
    ContractAddress::parse(address).is_ok_and(|a| a.is_zero())
}
