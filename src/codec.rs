use crate::errors::{Error, Result};

/// Longest LEB128 encoding of a u64.
const MAX_VARINT_BYTES: usize = 10;

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[allow(dead_code)]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Cursor over one decompressed block (or the framed container stream).
/// Every read is bounds checked; running off the end is a decode error,
/// never a panic.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> ByteReader<'a> {
        ByteReader { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| Error::from("Unexpected end of block"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| Error::from("Unexpected end of block"))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        for shift_bytes in 0..MAX_VARINT_BYTES {
            let byte = self.read_byte()?;
            value |= u64::from(byte & 0x7f) << (7 * shift_bytes);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err("Varint longer than 10 bytes".into())
    }

    pub fn read_signed(&mut self) -> Result<i64> {
        Ok(zigzag_decode(self.read_varint()?))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = usize::try_from(self.read_varint()?)?;
        Ok(String::from_utf8(self.read_bytes(len)?.to_vec())?)
    }
}

/// Encoding counterparts, used by the decoder and pipeline tests to
/// synthesize wire data.
#[cfg(test)]
pub mod enc {
    use super::zigzag_encode;

    pub fn varint(buf: &mut Vec<u8>, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                buf.push(byte);
                return;
            }
            buf.push(byte | 0x80);
        }
    }

    pub fn signed(buf: &mut Vec<u8>, value: i64) {
        varint(buf, zigzag_encode(value));
    }

    pub fn string(buf: &mut Vec<u8>, value: &str) {
        varint(buf, value.len() as u64);
        buf.extend_from_slice(value.as_bytes());
    }
}
