use crate::crypto::{Hash, HASH_SIZE};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Invalid size")]
    InvalidSize,
    #[error("Invalid value")]
    InvalidValue,
    #[error("Invalid string data")]
    InvalidString,
    #[error("Invalid hex data")]
    InvalidHex,
    #[error("Unexpected end of input")]
    EndOfInput,
}

// Cursor over a borrowed byte slice, all reads are big endian
pub struct Reader<'a> {
    bytes: &'a [u8],
    total: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, total: 0 }
    }

    // Remaining bytes to read
    pub fn size(&self) -> usize {
        self.bytes.len() - self.total
    }

    // Total bytes consumed so far
    pub fn total_read(&self) -> usize {
        self.total
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, ReaderError> {
        Ok(self.next(count)?.to_vec())
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        Ok(self.next(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, ReaderError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        let bytes = self.next(2)?;
        Ok(u16::from_be_bytes(
            bytes.try_into().map_err(|_| ReaderError::InvalidSize)?,
        ))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        let bytes = self.next(4)?;
        Ok(u32::from_be_bytes(
            bytes.try_into().map_err(|_| ReaderError::InvalidSize)?,
        ))
    }

    pub fn read_u64(&mut self) -> Result<u64, ReaderError> {
        let bytes = self.next(8)?;
        Ok(u64::from_be_bytes(
            bytes.try_into().map_err(|_| ReaderError::InvalidSize)?,
        ))
    }

    pub fn read_string(&mut self) -> Result<String, ReaderError> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| ReaderError::InvalidString)
    }

    pub fn read_hash(&mut self) -> Result<Hash, ReaderError> {
        let bytes: [u8; HASH_SIZE] = self
            .next(HASH_SIZE)?
            .try_into()
            .map_err(|_| ReaderError::InvalidSize)?;
        Ok(Hash::new(bytes))
    }

    fn next(&mut self, count: usize) -> Result<&'a [u8], ReaderError> {
        if count > self.size() {
            return Err(ReaderError::EndOfInput);
        }

        let bytes = &self.bytes[self.total..self.total + count];
        self.total += count;
        Ok(bytes)
    }
}
