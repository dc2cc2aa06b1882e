//! Fixed-size byte buffers used for addresses and hashes.
//!
//! These get manual borsh codecs so they serialize as raw bytes in the
//! database, and hex serde so they read naturally in JSON and TOML.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, B256};
use borsh::{BorshDeserialize, BorshSerialize};

/// 20-byte buf, used for contract and account addresses.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Buf20(pub [u8; 20]);

/// 32-byte buf, used for hashes and claim digests.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Buf32(pub [u8; 32]);

macro_rules! impl_buf {
    ($name:ident, $len:expr) => {
        impl $name {
            pub const LEN: usize = $len;

            pub fn zero() -> Self {
                Self([0; $len])
            }

            pub fn as_slice(&self) -> &[u8] {
                &self.0
            }

            pub fn from_slice(slice: &[u8]) -> Option<Self> {
                <[u8; $len]>::try_from(slice).ok().map(Self)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(value: [u8; $len]) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let mut buf = [0u8; $len];
                hex::decode_to_slice(s, &mut buf)?;
                Ok(Self(buf))
            }
        }

        impl BorshSerialize for $name {
            fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
                writer.write_all(&self.0)
            }
        }

        impl BorshDeserialize for $name {
            fn deserialize_reader<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
                let mut buf = [0u8; $len];
                reader.read_exact(&mut buf)?;
                Ok(Self(buf))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
                if ser.is_human_readable() {
                    ser.serialize_str(&self.to_string())
                } else {
                    ser.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
                if de.is_human_readable() {
                    let s = <String as serde::Deserialize>::deserialize(de)?;
                    s.parse().map_err(serde::de::Error::custom)
                } else {
                    let raw = <Vec<u8> as serde::Deserialize>::deserialize(de)?;
                    Self::from_slice(&raw).ok_or_else(|| {
                        serde::de::Error::invalid_length(raw.len(), &stringify!($len))
                    })
                }
            }
        }
    };
}

impl_buf!(Buf20, 20);
impl_buf!(Buf32, 32);

impl From<Address> for Buf20 {
    fn from(value: Address) -> Self {
        Self(value.into_array())
    }
}

impl From<Buf20> for Address {
    fn from(value: Buf20) -> Self {
        Address::from(value.0)
    }
}

impl From<B256> for Buf32 {
    fn from(value: B256) -> Self {
        Self(value.0)
    }
}

impl From<Buf32> for B256 {
    fn from(value: Buf32) -> Self {
        B256::from(value.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let addr: Buf20 = "0x34416d44effb07ac0c31db485733aee0b5708f54"
            .parse()
            .unwrap();
        assert_eq!(
            addr.to_string(),
            "0x34416d44effb07ac0c31db485733aee0b5708f54"
        );

        let no_prefix: Buf20 = "34416d44effb07ac0c31db485733aee0b5708f54".parse().unwrap();
        assert_eq!(addr, no_prefix);
    }

    #[test]
    fn test_rejects_bad_length() {
        assert!("0x1234".parse::<Buf20>().is_err());
        assert!(Buf32::from_slice(&[0u8; 31]).is_none());
    }

    #[test]
    fn test_borsh_is_raw_bytes() {
        let h = Buf32::from([7u8; 32]);
        let enc = borsh::to_vec(&h).unwrap();
        assert_eq!(enc, vec![7u8; 32]);
        let dec: Buf32 = borsh::from_slice(&enc).unwrap();
        assert_eq!(dec, h);
    }

    #[test]
    fn test_serde_json_hex() {
        let addr = Buf20::from([0xaa; 20]);
        let enc = serde_json::to_string(&addr).unwrap();
        assert_eq!(enc, format!("\"0x{}\"", "aa".repeat(20)));
        let dec: Buf20 = serde_json::from_str(&enc).unwrap();
        assert_eq!(dec, addr);
    }
}
