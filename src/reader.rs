//! Random-access reader over the metadata section (C2).
//!
//! All reads take an explicit offset and hand back the offset just past
//! what they consumed; nothing here owns a shared, mutable cursor, so
//! recursive descents (C4, C5) thread position through return values
//! instead of fighting over `&mut self`.

use crate::endian::{read_uint, Endianness};
use crate::error::Error;

#[derive(Clone, Copy)]
pub struct MetadataReader<'s> {
    pub bytes: &'s [u8],
    pub endian: Endianness,
    pub size_t_size: u8,
    pub ptr_size: u8,
}

impl<'s> MetadataReader<'s> {
    pub fn new(bytes: &'s [u8], endian: Endianness, size_t_size: u8, ptr_size: u8) -> Self {
        Self {
            bytes,
            endian,
            size_t_size,
            ptr_size,
        }
    }

    /// `consume(n)`: the `n` raw bytes starting at `offset`.
    pub fn consume(&self, offset: usize, n: usize) -> Result<&'s [u8], Error> {
        self.bytes
            .get(offset..offset + n)
            .ok_or(Error::MetadataTruncated { offset, needed: n })
    }

    /// `consume_size_t()`: one size_t-wide unsigned integer at `offset`,
    /// returning the value and the offset immediately after it.
    ///
    /// The value is widened to `u128` rather than `u64` because
    /// `size_t_size` may legally be 16 bytes; sentinels and raw sizes at
    /// that width would otherwise be silently truncated.
    pub fn consume_size_t(&self, offset: usize) -> Result<(u128, usize), Error> {
        let n = self.size_t_size as usize;
        let raw = self.consume(offset, n)?;
        Ok((read_uint(raw, self.endian), offset + n))
    }

    /// One ptr_size-wide unsigned integer at `offset`.
    pub fn consume_ptr(&self, offset: usize) -> Result<(u128, usize), Error> {
        let n = self.ptr_size as usize;
        let raw = self.consume(offset, n)?;
        Ok((read_uint(raw, self.endian), offset + n))
    }

    /// `read_cstring_at(off)`: a UTF-8, NUL-terminated string (NUL excluded).
    pub fn read_cstring_at(&self, offset: usize) -> Result<String, Error> {
        let rest = self
            .bytes
            .get(offset..)
            .ok_or(Error::MetadataTruncated { offset, needed: 1 })?;
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::MetadataTruncated {
                offset,
                needed: rest.len() + 1,
            })?;
        std::str::from_utf8(&rest[..len])
            .map(|s| s.to_string())
            .map_err(|_| Error::InvalidUtf8 { offset })
    }
}
