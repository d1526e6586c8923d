use byteorder::{BigEndian, ByteOrder};
use crc32fast::Hasher as Crc32;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{DataFileError, Result};

/// Fixed byte length of the entry header: crc + timestamp + key_len + value_len.
pub const ENTRY_HEADER_BYTES: usize = 12;

const TIMESTAMP_OFF: usize = 4;
const KEY_LEN_OFF: usize = 8;
const VALUE_LEN_OFF: usize = 10;

/// A single key/value record as it appears in a data file.
///
/// The timestamp is seconds since epoch at creation and is informational
/// only; read-time authority always comes from the key directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub timestamp: u32,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// The decoded fixed header of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub crc: u32,
    pub timestamp: u32,
    pub key_len: u16,
    pub value_len: u16,
}

impl EntryHeader {
    /// Decodes the fixed header. Fails with [`DataFileError::InvalidEntryHeader`]
    /// when the slice is shorter than [`ENTRY_HEADER_BYTES`].
    pub fn decode(buf: &[u8]) -> Result<EntryHeader> {
        if buf.len() < ENTRY_HEADER_BYTES {
            return Err(DataFileError::InvalidEntryHeader);
        }
        Ok(EntryHeader {
            crc: BigEndian::read_u32(&buf[..4]),
            timestamp: BigEndian::read_u32(&buf[TIMESTAMP_OFF..]),
            key_len: BigEndian::read_u16(&buf[KEY_LEN_OFF..]),
            value_len: BigEndian::read_u16(&buf[VALUE_LEN_OFF..]),
        })
    }
}

impl Entry {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            timestamp: now_secs(),
            key,
            value,
        }
    }

    /// A deletion marker: an entry with no value bytes.
    pub fn tombstone(key: Vec<u8>) -> Self {
        Self::new(key, Vec::new())
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }

    /// Total serialized size of this entry.
    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_BYTES + self.key.len() + self.value.len()
    }

    /// Appends the serialized entry to `buf`. The CRC field is filled last,
    /// computed over everything after it.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&(self.key.len() as u16).to_be_bytes());
        buf.extend_from_slice(&(self.value.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let crc = checksum(&buf[start + TIMESTAMP_OFF..]);
        buf[start..start + 4].copy_from_slice(&crc.to_be_bytes());
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decodes and validates one entry from the front of `buf`, returning the
    /// entry and the number of bytes consumed.
    ///
    /// A truncated body or a CRC mismatch fails with
    /// [`DataFileError::EntryCorrupted`].
    pub fn decode(buf: &[u8]) -> Result<(Entry, usize)> {
        let header = EntryHeader::decode(buf)?;
        let total = ENTRY_HEADER_BYTES + header.key_len as usize + header.value_len as usize;
        if buf.len() < total {
            return Err(DataFileError::EntryCorrupted);
        }
        if checksum(&buf[TIMESTAMP_OFF..total]) != header.crc {
            return Err(DataFileError::EntryCorrupted);
        }

        let key_end = ENTRY_HEADER_BYTES + header.key_len as usize;
        let entry = Entry {
            timestamp: header.timestamp,
            key: buf[ENTRY_HEADER_BYTES..key_end].to_vec(),
            value: buf[key_end..total].to_vec(),
        };
        Ok((entry, total))
    }
}

/// CRC-32 (IEEE) over `data`, the entry bytes from the timestamp onward.
pub(crate) fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(data);
    hasher.finalize()
}

fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
