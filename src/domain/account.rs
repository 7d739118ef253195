use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of an account identifier in bytes.
pub const ACCOUNT_ID_LEN: usize = 20;

/// Opaque 20-byte account identifier, written as `0x` followed by 40 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId([u8; ACCOUNT_ID_LEN]);

impl AccountId {
    /// The null identifier. Never a valid transfer recipient.
    pub const ZERO: AccountId = AccountId([0; ACCOUNT_ID_LEN]);

    pub const fn new(bytes: [u8; ACCOUNT_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ACCOUNT_ID_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = ParseAccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(ParseAccountIdError::MissingPrefix)?;

        if digits.len() != ACCOUNT_ID_LEN * 2 {
            return Err(ParseAccountIdError::InvalidLength(digits.len()));
        }

        let mut bytes = [0u8; ACCOUNT_ID_LEN];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| ParseAccountIdError::InvalidHex)?;
        Ok(Self(bytes))
    }
}

impl From<[u8; ACCOUNT_ID_LEN]> for AccountId {
    fn from(bytes: [u8; ACCOUNT_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAccountIdError {
    MissingPrefix,
    InvalidLength(usize),
    InvalidHex,
}

impl fmt::Display for ParseAccountIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAccountIdError::MissingPrefix => write!(f, "address must start with 0x"),
            ParseAccountIdError::InvalidLength(len) => write!(
                f,
                "address must have {} hex digits, got {}",
                ACCOUNT_ID_LEN * 2,
                len
            ),
            ParseAccountIdError::InvalidHex => write!(f, "address contains non-hex characters"),
        }
    }
}

impl std::error::Error for ParseAccountIdError {}
