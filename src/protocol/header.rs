//! Correlation header codec.
//!
//! A header is 8 bytes: big-endian slot `ID` followed by a big-endian random
//! `MagicCode`. On text channels it travels as 16 lowercase hex characters.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use thiserror::Error;

/// Size of an encoded header in bytes.
pub const HEADER_LEN: usize = 8;

/// Errors produced while decoding a header from text.
#[derive(Debug, Error, PartialEq)]
pub enum HeaderError {
    #[error("header is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("header too short: got {0} bytes, need {HEADER_LEN}")]
    TooShort(usize),
}

/// Fixed 8-byte correlation token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Header([u8; HEADER_LEN]);

impl Header {
    /// Encode `id` and `magic` into a header.
    ///
    /// A zero `magic` is replaced by a random non-zero value so that a
    /// recycled `id` is never enough to correlate on its own.
    pub fn encode(id: u32, magic: u32) -> Self {
        let magic = if magic == 0 { random_magic() } else { magic };
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&id.to_be_bytes());
        bytes[4..8].copy_from_slice(&magic.to_be_bytes());
        Self(bytes)
    }

    /// Build a header from raw bytes without touching the magic code.
    pub const fn from_bytes(bytes: [u8; HEADER_LEN]) -> Self {
        Self(bytes)
    }

    pub fn id(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn magic_code(&self) -> u32 {
        u32::from_be_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }

    pub fn as_bytes(&self) -> &[u8; HEADER_LEN] {
        &self.0
    }

    /// Decode a header from hex text. Extra trailing bytes are ignored.
    pub fn parse_hex(text: &str) -> Result<Self, HeaderError> {
        let raw = hex::decode(text.trim())?;
        if raw.len() < HEADER_LEN {
            return Err(HeaderError::TooShort(raw.len()));
        }
        let mut bytes = [0u8; HEADER_LEN];
        bytes.copy_from_slice(&raw[..HEADER_LEN]);
        Ok(Self(bytes))
    }
}

fn random_magic() -> u32 {
    rand::thread_rng().gen_range(1..=u32::MAX)
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("id", &self.id())
            .field("magic_code", &format_args!("{:#010x}", self.magic_code()))
            .finish()
    }
}

impl FromStr for Header {
    type Err = HeaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}
