//! The on-disk record format: a 10-byte header followed by the key and,
//! for `Put` records, the value.
//!
//! ```text
//! +-----------+-------------+--------+-----+-------+
//! | KeySize:4 | ValueSize:4 | Mark:2 | Key | Value |
//! +-----------+-------------+--------+-----+-------+
//! ```
//!
//! All integers are big-endian. The codec is pure and stateless: it never
//! touches a file, so it needs no synchronization of its own.

use crate::error::{KvsError, Result};

/// Size in bytes of a record's fixed header.
pub const HEADER_SIZE: u64 = 10;

/// Size in bytes of the trailing checksum, only present when the
/// `checksum` feature is enabled. Changes the on-disk format, which is
/// why it is feature-gated rather than on by default (see spec §9 item 5).
#[cfg(feature = "checksum")]
pub const CHECKSUM_SIZE: u64 = 4;
#[cfg(not(feature = "checksum"))]
pub const CHECKSUM_SIZE: u64 = 0;

/// The two kinds of record a log can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// Installs `key` at this offset with `value`.
    Put = 0,
    /// Tombstones `key`; written with no value.
    Del = 1,
}

impl TryFrom<u16> for Mark {
    type Error = KvsError;

    fn try_from(raw: u16) -> Result<Self> {
        match raw {
            0 => Ok(Mark::Put),
            1 => Ok(Mark::Del),
            other => Err(KvsError::DecodeError(format!(
                "unrecognized record mark {other}"
            ))),
        }
    }
}

/// A single log record: a key, an optional value, and its mark.
///
/// `Del` records always carry an empty `value` — the absence of a value is
/// encoded purely by `ValueSize == 0`, there is no separate tombstone flag
/// in the header beyond `Mark`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record key. Never empty at the API level (the `Store` rejects
    /// empty keys before a record is ever built).
    pub key: Vec<u8>,
    /// Record value. Empty for `Del` records; may be empty for `Put`
    /// records too (an explicitly empty value is distinct from absence).
    pub value: Vec<u8>,
    /// Whether this installs or tombstones `key`.
    pub mark: Mark,
}

impl Record {
    /// Builds a `Put` record.
    pub fn put(key: Vec<u8>, value: Vec<u8>) -> Self {
        Record {
            key,
            value,
            mark: Mark::Put,
        }
    }

    /// Builds a `Del` record (tombstone) for `key`.
    pub fn del(key: Vec<u8>) -> Self {
        Record {
            key,
            value: Vec::new(),
            mark: Mark::Del,
        }
    }

    /// Total on-disk size of this record: header plus key plus value.
    pub fn encoded_len(&self) -> u64 {
        HEADER_SIZE + self.key.len() as u64 + self.value.len() as u64 + CHECKSUM_SIZE
    }

    /// Encodes this record to a freshly allocated buffer.
    ///
    /// Fails only if a size overflows the header's 32-bit width, which is
    /// unreachable given the caller constraints the `Store` enforces (keys
    /// and values are plain in-memory byte slices, never anywhere near
    /// 4 GiB), but callers that hand the codec raw untrusted lengths
    /// should still check.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let key_size: u32 = self.key.len().try_into().map_err(|_| {
            KvsError::EncodeError(format!("key length {} overflows u32", self.key.len()))
        })?;
        let value_size: u32 = self.value.len().try_into().map_err(|_| {
            KvsError::EncodeError(format!("value length {} overflows u32", self.value.len()))
        })?;

        let mut buf = Vec::with_capacity(self.encoded_len() as usize);
        buf.extend_from_slice(&key_size.to_be_bytes());
        buf.extend_from_slice(&value_size.to_be_bytes());
        buf.extend_from_slice(&(self.mark as u16).to_be_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        #[cfg(feature = "checksum")]
        {
            let checksum = checksum_of(&self.key, &self.value);
            buf.extend_from_slice(&checksum.to_be_bytes());
        }

        Ok(buf)
    }
}

/// Computes the CRC32 of `key ++ value`, used as the trailing checksum
/// when the `checksum` feature is enabled.
#[cfg(feature = "checksum")]
pub fn checksum_of(key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// Parses the 10-byte header into `(key_size, value_size, mark)`.
pub fn decode_header(bytes: &[u8; HEADER_SIZE as usize]) -> (u32, u32, u16) {
    let key_size = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    let value_size = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
    let mark = u16::from_be_bytes(bytes[8..10].try_into().unwrap());
    (key_size, value_size, mark)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_put() {
        let rec = Record::put(b"dbname".to_vec(), b"minibitcask".to_vec());
        let enc = rec.encode().unwrap();
        assert_eq!(enc.len() as u64, rec.encoded_len());

        let header: [u8; HEADER_SIZE as usize] = enc[0..10].try_into().unwrap();
        let (key_size, value_size, mark) = decode_header(&header);
        assert_eq!(key_size as usize, rec.key.len());
        assert_eq!(value_size as usize, rec.value.len());
        assert_eq!(Mark::try_from(mark).unwrap(), rec.mark);
        assert_eq!(&enc[10..10 + key_size as usize], &rec.key[..]);
        #[cfg(not(feature = "checksum"))]
        assert_eq!(&enc[10 + key_size as usize..], &rec.value[..]);
    }

    #[test]
    fn round_trip_del_has_no_value_bytes() {
        let rec = Record::del(b"k".to_vec());
        let enc = rec.encode().unwrap();
        assert_eq!(enc.len() as u64, rec.encoded_len());
        let header: [u8; HEADER_SIZE as usize] = enc[0..10].try_into().unwrap();
        let (key_size, value_size, mark) = decode_header(&header);
        assert_eq!(key_size, 1);
        assert_eq!(value_size, 0);
        assert_eq!(Mark::try_from(mark).unwrap(), Mark::Del);
    }

    #[test]
    fn empty_value_put_is_distinct_from_del() {
        let rec = Record::put(b"k".to_vec(), Vec::new());
        let enc = rec.encode().unwrap();
        let header: [u8; HEADER_SIZE as usize] = enc[0..10].try_into().unwrap();
        let (_, value_size, mark) = decode_header(&header);
        assert_eq!(value_size, 0);
        assert_eq!(Mark::try_from(mark).unwrap(), Mark::Put);
    }

    #[test]
    fn unrecognized_mark_is_rejected() {
        assert!(Mark::try_from(2).is_err());
    }
}
