use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{
    BILL_LEN, CARD_PK_LEN, CARD_SIG_LEN, NONCE_LEN, UUID_STR_LEN,
};
use crate::error::AtmError;

/// Validate a canonical 36-byte UUID string: 8-4-4-4-12 hex groups joined by hyphens.
fn validate_uuid_str(s: &str) -> Result<(), AtmError> {
    if s.len() != UUID_STR_LEN {
        return Err(AtmError::InvalidIdLength {
            expected: UUID_STR_LEN,
            got: s.len(),
        });
    }
    let groups: Vec<&str> = s.split('-').collect();
    let expected_lens = [8, 4, 4, 4, 12];
    if groups.len() != 5 || groups.iter().map(|g| g.len()).ne(expected_lens.iter().copied()) {
        return Err(AtmError::InvalidIdFormat(s.to_string()));
    }
    if !groups.iter().all(|g| g.chars().all(|c| c.is_ascii_hexdigit())) {
        return Err(AtmError::InvalidIdFormat(s.to_string()));
    }
    Ok(())
}

macro_rules! uuid_newtype {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Result<Self, AtmError> {
                let s = s.into();
                validate_uuid_str(&s)?;
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

uuid_newtype!(CardId);
uuid_newtype!(HsmId);

/// 32-byte challenge issued by one participant, signed/encrypted by another.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce32(#[serde(with = "serde_bytes_array")] pub [u8; NONCE_LEN]);

impl Nonce32 {
    pub fn from_slice(b: &[u8]) -> Result<Self, AtmError> {
        if b.len() != NONCE_LEN {
            return Err(AtmError::InvalidLength {
                what: "nonce",
                expected: NONCE_LEN,
                got: b.len(),
            });
        }
        let mut arr = [0u8; NONCE_LEN];
        arr.copy_from_slice(b);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

impl fmt::Debug for Nonce32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce32({}…)", hex::encode(&self.0[..4]))
    }
}

/// Ed25519-style card public key.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPublicKey(#[serde(with = "serde_bytes_array")] pub [u8; CARD_PK_LEN]);

impl CardPublicKey {
    pub fn from_slice(b: &[u8]) -> Result<Self, AtmError> {
        if b.len() != CARD_PK_LEN {
            return Err(AtmError::InvalidLength {
                what: "card public key",
                expected: CARD_PK_LEN,
                got: b.len(),
            });
        }
        let mut arr = [0u8; CARD_PK_LEN];
        arr.copy_from_slice(b);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; CARD_PK_LEN] {
        &self.0
    }
}

impl fmt::Debug for CardPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardPublicKey({})", hex::encode(self.0))
    }
}

/// Detached Ed25519-style signature over a 32-byte message.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSignature(#[serde(with = "serde_bytes_array")] pub [u8; CARD_SIG_LEN]);

impl CardSignature {
    pub fn from_slice(b: &[u8]) -> Result<Self, AtmError> {
        if b.len() != CARD_SIG_LEN {
            return Err(AtmError::InvalidLength {
                what: "card signature",
                expected: CARD_SIG_LEN,
                got: b.len(),
            });
        }
        let mut arr = [0u8; CARD_SIG_LEN];
        arr.copy_from_slice(b);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; CARD_SIG_LEN] {
        &self.0
    }
}

impl fmt::Debug for CardSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardSignature({}…)", hex::encode(&self.0[..4]))
    }
}

/// A single opaque, dispensable bill.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill(#[serde(with = "serde_bytes_array")] pub [u8; BILL_LEN]);

impl Bill {
    pub fn from_slice(b: &[u8]) -> Result<Self, AtmError> {
        if b.len() > BILL_LEN {
            return Err(AtmError::InvalidLength {
                what: "bill",
                expected: BILL_LEN,
                got: b.len(),
            });
        }
        let mut arr = [0u8; BILL_LEN];
        arr[..b.len()].copy_from_slice(b);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; BILL_LEN] {
        &self.0
    }
}

impl fmt::Debug for Bill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bill({})", hex::encode(self.0))
    }
}

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Number of bills, used both for a withdrawal amount and an ATM's stock.
pub type BillCount = u32;

/// Serde helper for fixed-size byte arrays (not natively supported by derive).
mod serde_bytes_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        data: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        data.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let vec = Vec::<u8>::deserialize(deserializer)?;
        vec.try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"fixed-size array"))
    }
}
