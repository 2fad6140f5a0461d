//! Byte-oriented serde helpers for wrapper types with canonical encodings.

use core::fmt;
use core::marker::PhantomData;

use serde::{de, Deserializer, Serializer};

/// Types reconstructible from their canonical byte encoding.
pub(crate) trait TryFromBytes: Sized {
    type Error: fmt::Display;
    fn try_from_bytes(bytes: &[u8]) -> Result<Self, Self::Error>;
}

pub(crate) fn serialize<S>(bytes: impl AsRef<[u8]>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_bytes(bytes.as_ref())
}

struct BytesVisitor<T>(PhantomData<T>);

impl<'de, T: TryFromBytes> de::Visitor<'de> for BytesVisitor<T> {
    type Value = T;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a byte string")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        T::try_from_bytes(v).map_err(de::Error::custom)
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        self.visit_bytes(&v)
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        T::try_from_bytes(&bytes).map_err(de::Error::custom)
    }
}

pub(crate) fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFromBytes,
{
    deserializer.deserialize_bytes(BytesVisitor::<T>(PhantomData))
}
