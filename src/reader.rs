//! Random-access big-endian reads from a seekable byte source.

use std::{
    io::{self, Read, Seek, SeekFrom},
    mem,
};

use bytemuck::AnyBitPattern;

use crate::error::{Error, Result};

/// Reads fixed-width big-endian integers and byte blocks at absolute offsets.
///
/// Every read seeks to its own offset first, so the position left behind by one call never affects
/// the next one. The length of the source is determined once, on construction, and all reads are
/// bounds-checked against it before touching the source.
#[derive(Debug)]
pub struct StreamReader<R> {
    stream: R,
    len: u64,
}

impl<R: Read + Seek> StreamReader<R> {
    pub fn new(mut stream: R) -> Result<Self> {
        let len = stream.seek(SeekFrom::End(0)).map_err(Error::from)?;
        Ok(Self { stream, len })
    }

    /// Returns the total length of the underlying source in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fails with an out-of-range error unless `offset..offset + len` lies within the source.
    pub fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(Error::out_of_range(offset, len, self.len)),
        }
    }

    /// Reads exactly `len` bytes starting at `offset`.
    pub fn read_bytes(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    /// Fills `buf` with the bytes starting at `offset`.
    pub(crate) fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len() as u64)?;
        self.stream
            .seek(SeekFrom::Start(offset))
            .map_err(Error::from)?;
        self.stream.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                // The source shrank after we measured it.
                Error::out_of_range(offset, buf.len() as u64, self.len)
            } else {
                Error::from(e)
            }
        })
    }

    pub fn read_u8(&mut self, offset: u64) -> Result<u8> {
        let mut b = [0; 1];
        self.read_into(offset, &mut b)?;
        Ok(b[0])
    }

    pub fn read_u16(&mut self, offset: u64) -> Result<u16> {
        let mut b = [0; 2];
        self.read_into(offset, &mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    pub fn read_u32(&mut self, offset: u64) -> Result<u32> {
        let mut b = [0; 4];
        self.read_into(offset, &mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    /// Reads a big-endian unsigned integer that is 1, 2 or 4 bytes wide.
    ///
    /// # Panics
    ///
    /// Panics if `width` is not 1, 2 or 4.
    pub fn read_uint(&mut self, offset: u64, width: usize) -> Result<u32> {
        match width {
            1 => self.read_u8(offset).map(u32::from),
            2 => self.read_u16(offset).map(u32::from),
            4 => self.read_u32(offset),
            _ => panic!("unsupported integer width {width} (only 1, 2 and 4 are valid)"),
        }
    }

    /// Reads a plain-old-data structure made up entirely of bytes.
    pub(crate) fn read_obj<T: AnyBitPattern>(&mut self, offset: u64) -> Result<T> {
        assert_eq!(mem::align_of::<T>(), 1);

        let mut buf = [0; 64];
        let size = mem::size_of::<T>();
        assert!(size <= buf.len());
        self.read_into(offset, &mut buf[..size])?;
        Ok(bytemuck::pod_read_unaligned(&buf[..size]))
    }
}
