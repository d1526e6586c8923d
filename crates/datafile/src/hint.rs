use byteorder::{BigEndian, ByteOrder};
use keydir::Descriptor;

use crate::{DataFileError, Result};

/// Serialized size of a bare descriptor.
pub const DESCRIPTOR_BYTES: usize = 12;

/// Fixed portion of a hint record: descriptor + key_size.
pub const HINT_FIXED_BYTES: usize = DESCRIPTOR_BYTES + 2;

/// Appends the 12-byte big-endian form of `desc` to `buf`.
pub fn encode_descriptor_into(buf: &mut Vec<u8>, desc: &Descriptor) {
    buf.extend_from_slice(&desc.file_id.to_be_bytes());
    buf.extend_from_slice(&desc.value_size.to_be_bytes());
    buf.extend_from_slice(&desc.entry_offset.to_be_bytes());
    buf.extend_from_slice(&desc.value_offset.to_be_bytes());
}

/// Decodes a 12-byte descriptor block. Fails with
/// [`DataFileError::InvalidKeydirData`] when the slice is too short.
pub fn decode_descriptor(buf: &[u8]) -> Result<Descriptor> {
    if buf.len() < DESCRIPTOR_BYTES {
        return Err(DataFileError::InvalidKeydirData);
    }
    Ok(Descriptor {
        file_id: BigEndian::read_u16(&buf[0..]),
        value_size: BigEndian::read_u16(&buf[2..]),
        entry_offset: BigEndian::read_u32(&buf[4..]),
        value_offset: BigEndian::read_u32(&buf[8..]),
    })
}

/// One record of a hint file: a descriptor plus the key it indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintRecord {
    pub descriptor: Descriptor,
    pub key: Vec<u8>,
}

impl HintRecord {
    pub fn encoded_len(&self) -> usize {
        HINT_FIXED_BYTES + self.key.len()
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        encode_descriptor_into(buf, &self.descriptor);
        buf.extend_from_slice(&(self.key.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.key);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decodes one hint record from the front of `buf`, returning the record
    /// and the number of bytes consumed. A truncated fixed block or key fails
    /// with [`DataFileError::InvalidKeydirFileData`].
    pub fn decode(buf: &[u8]) -> Result<(HintRecord, usize)> {
        if buf.len() < HINT_FIXED_BYTES {
            return Err(DataFileError::InvalidKeydirFileData);
        }
        let descriptor = decode_descriptor(buf)?;
        let key_size = BigEndian::read_u16(&buf[DESCRIPTOR_BYTES..]) as usize;

        let total = HINT_FIXED_BYTES + key_size;
        if buf.len() < total {
            return Err(DataFileError::InvalidKeydirFileData);
        }
        let key = buf[HINT_FIXED_BYTES..total].to_vec();
        Ok((HintRecord { descriptor, key }, total))
    }
}
