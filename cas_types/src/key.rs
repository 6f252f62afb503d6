use std::fmt::{Debug, Display, Formatter, LowerHex};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::CasTypesError;

/// Number of bytes in a [`Key`].
pub const KEY_SIZE: usize = 32;

/// Length of the key prefix used to identify chunks in log and error messages.
pub const KEY_PREFIX_LEN: usize = 8;

/// A Key is the SHA-256 digest of a chunk; hex encoded it names the chunk object in storage.
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// The all-zero key, standing in for "no key".
    pub const ZERO: Key = Key([0u8; KEY_SIZE]);

    pub fn from_data(data: &[u8]) -> Self {
        Key(Sha256::digest(data).into())
    }

    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Key(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn hex(&self) -> String {
        format!("{self:x}")
    }

    /// Short hex prefix, handy for messages about a single chunk.
    pub fn prefix(&self) -> String {
        let mut h = self.hex();
        h.truncate(KEY_PREFIX_LEN);
        h
    }

    pub fn from_hex(h: &str) -> Result<Self, CasTypesError> {
        if h.len() != KEY_SIZE * 2 || !h.is_ascii() {
            return Err(CasTypesError::InvalidKey(h.to_owned()));
        }

        let mut bytes = [0u8; KEY_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = u8::from_str_radix(&h[2 * i..2 * i + 2], 16).map_err(|_| CasTypesError::InvalidKey(h.to_owned()))?;
        }
        Ok(Key(bytes))
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = CasTypesError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; KEY_SIZE] = value
            .try_into()
            .map_err(|_| CasTypesError::InvalidKey(format!("{} bytes", value.len())))?;
        Ok(Key(bytes))
    }
}

impl LowerHex for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:x}")
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key({self:x})")
    }
}

impl FromStr for Key {
    type Err = CasTypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::from_hex(s)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Key::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `echo -n "some data" | sha256sum`
    const TEST_SHA: &str = "1307990e6ba5ca145eb35e99182a9bec46531bc54ddf656a602c780fa0240dee";

    #[test]
    fn test_key_is_sha256() {
        let k = Key::from_data(b"some data");
        assert_eq!(k.hex(), TEST_SHA);
        assert_eq!(k.to_string(), TEST_SHA);
        assert_eq!(k.prefix(), "1307990e");
        assert!(!k.is_zero());
    }

    #[test]
    fn test_hex_parsing() {
        let k: Key = TEST_SHA.parse().unwrap();
        assert_eq!(k, Key::from_data(b"some data"));

        assert!(Key::from_hex("abcd").is_err());
        assert!(Key::from_hex(&"zz".repeat(KEY_SIZE)).is_err());
        assert_eq!(Key::from_hex(&"00".repeat(KEY_SIZE)).unwrap(), Key::ZERO);
    }

    #[test]
    fn test_serde_as_hex_string() {
        let k = Key::from_data(b"some data");
        let s = serde_json::to_string(&k).unwrap();
        assert_eq!(s, format!("\"{TEST_SHA}\""));
        assert_eq!(serde_json::from_str::<Key>(&s).unwrap(), k);
    }
}
