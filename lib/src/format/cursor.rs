use std::mem::size_of;

use thiserror::Error;
use zerocopy::FromBytes;

// Anti-corruption ceilings. The format carries no checksums, so declared
// counts are the only line of defense before allocating.
pub const MAX_VERTEX_COUNT: u32 = 1_000_000;
pub const MAX_INDEX_COUNT: u32 = 2_000_000;
pub const MAX_MODEL_COUNT: u32 = 10_000;
pub const MAX_COMPLEX_COUNT: u32 = 10_000;
pub const MAX_TEXTURE_REFS: u32 = 10_000;
pub const MAX_BINDING_DIM: u32 = 100;
pub const MAX_VERTEX_STRIDE: u32 = 1024;
pub const MAX_BLOB_BYTES: u32 = 1_000_000;
pub const MAX_SIGNATURE_LEN: u32 = 64;

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ParseError {
    #[error("read of {needed} bytes at offset {offset} exceeds buffer length {len}")]
    Truncated { offset: usize, needed: usize, len: usize },
    #[error("{kind} count {count} exceeds sanity ceiling {ceiling}")]
    UnreasonableSize { kind: &'static str, count: u64, ceiling: u64 },
    #[error("size arithmetic for {context} yields a negative or fractional result")]
    NegativeDerivedSize { context: &'static str },
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u16, vertex_count: u32 },
    #[error("bad container signature {found:02x?}")]
    BadSignature { found: [u8; 4] },
}

/// Validates a declared element count against its ceiling before any
/// allocation sized from it.
pub fn check_count(kind: &'static str, count: u32, ceiling: u32) -> Result<usize, ParseError> {
    if count > ceiling {
        return Err(ParseError::UnreasonableSize {
            kind,
            count: count as u64,
            ceiling: ceiling as u64,
        });
    }
    Ok(count as usize)
}

/// Bounds-checked forward view over a byte buffer.
///
/// Every read validates `offset + size <= len` up front and leaves the
/// cursor untouched on failure, so a caller can keep whatever it decoded
/// before the failure point.
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self { Self { data, offset: 0 } }

    pub fn at(data: &'a [u8], offset: usize) -> Result<Self, ParseError> {
        if offset > data.len() {
            return Err(ParseError::Truncated { offset: 0, needed: offset, len: data.len() });
        }
        Ok(Self { data, offset })
    }

    pub fn offset(&self) -> usize { self.offset }

    pub fn len(&self) -> usize { self.data.len() }

    pub fn remaining(&self) -> usize { self.data.len() - self.offset }

    pub fn is_empty(&self) -> bool { self.remaining() == 0 }

    pub fn remaining_slice(&self) -> &'a [u8] { &self.data[self.offset..] }

    fn check(&self, at: usize, needed: usize) -> Result<(), ParseError> {
        // usize overflow on `at + needed` counts as out of bounds too
        match at.checked_add(needed) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(ParseError::Truncated { offset: at, needed, len: self.data.len() }),
        }
    }

    /// Reads a fixed-layout value and advances past it.
    pub fn read<T: FromBytes>(&mut self) -> Result<T, ParseError> {
        let value = self.peek::<T>(0)?;
        self.offset += size_of::<T>();
        Ok(value)
    }

    /// Non-advancing read at `ahead` bytes past the current offset.
    pub fn peek<T: FromBytes>(&self, ahead: usize) -> Result<T, ParseError> {
        let at = self.offset + ahead;
        self.check(at, size_of::<T>())?;
        T::read_from_prefix(&self.data[at..]).ok_or(ParseError::Truncated {
            offset: at,
            needed: size_of::<T>(),
            len: self.data.len(),
        })
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        self.check(self.offset, n)?;
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ParseError> {
        self.check(self.offset, n)?;
        self.offset += n;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> { self.read::<u8>() }

    pub fn read_u16(&mut self) -> Result<u16, ParseError> {
        let b = self.read::<[u8; 2]>()?;
        Ok(u16::from_le_bytes(b))
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        let b = self.read::<[u8; 4]>()?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn read_f32(&mut self) -> Result<f32, ParseError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Reads a NUL-terminated string of at most `max` bytes (terminator
    /// excluded). The terminator is consumed.
    pub fn read_cstr(&mut self, max: usize) -> Result<&'a [u8], ParseError> {
        let slice = self.remaining_slice();
        let limit = slice.len().min(max + 1);
        match slice[..limit].iter().position(|&b| b == 0) {
            Some(n) => {
                let s = &slice[..n];
                self.offset += n + 1;
                Ok(s)
            }
            None if slice.len() <= max => Err(ParseError::Truncated {
                offset: self.data.len(),
                needed: 1,
                len: self.data.len(),
            }),
            None => Err(ParseError::UnreasonableSize {
                kind: "string length",
                count: max as u64 + 1,
                ceiling: max as u64,
            }),
        }
    }

    /// Reads a `#[binrw]` record (little-endian) through the cursor.
    pub fn read_binrw<T>(&mut self) -> Result<T, ParseError>
    where for<'b> T: binrw::BinRead<Args<'b> = ()> {
        let mut reader = std::io::Cursor::new(self.remaining_slice());
        match T::read_options(&mut reader, binrw::Endian::Little, ()) {
            Ok(value) => {
                self.offset += reader.position() as usize;
                Ok(value)
            }
            Err(_) => Err(ParseError::Truncated {
                offset: self.offset + reader.position() as usize,
                needed: 1,
                len: self.data.len(),
            }),
        }
    }
}
