//! JPEG/JFIF marker stream walker.

#[cfg(test)]
mod tests;

use std::io::{Read, Seek};

use crate::{
    error::{Error, Result},
    marker::{Marker, MarkerCode},
    reader::StreamReader,
};

/// Number of bytes inspected by the first read of a marker search.
///
/// Markers usually follow right after the previous segment, so searches start small and only grow
/// their reads (up to [`SCAN_CHUNK`]) while crossing junk or entropy-coded data.
const FIRST_CHUNK: usize = 64;
const SCAN_CHUNK: usize = 4096;

/// Finds the first marker at or after `start`.
///
/// Returns the marker's type and the offset of the `0xFF` byte immediately preceding the type byte.
/// Any number of `0xFF` fill bytes may precede a marker and are skipped, as are stuffed `0xFF 0x00`
/// pairs, which encode a literal `0xFF` in entropy-coded data.
pub fn find_marker<R: Read + Seek>(
    reader: &mut StreamReader<R>,
    start: u64,
) -> Result<(MarkerCode, u64)> {
    let mut buf = [0; SCAN_CHUNK];
    let mut position = start;
    loop {
        let Some(ff) = next_ff(reader, position, &mut buf)? else {
            return Err(Error::from(format!(
                "no marker found after offset {start} before end of stream"
            )));
        };

        let mut code_offset = ff + 1;
        loop {
            if code_offset >= reader.len() {
                return Err(Error::from(format!(
                    "stream ends in the middle of the marker at offset {ff}"
                )));
            }
            match reader.read_u8(code_offset)? {
                0xFF => code_offset += 1,
                0x00 => break,
                code => return Ok((MarkerCode(code), code_offset - 1)),
            }
        }

        // Stuffed zero byte, keep looking after it.
        position = code_offset + 1;
    }
}

/// Returns the offset of the next `0xFF` byte at or after `position`.
fn next_ff<R: Read + Seek>(
    reader: &mut StreamReader<R>,
    mut position: u64,
    buf: &mut [u8; SCAN_CHUNK],
) -> Result<Option<u64>> {
    let mut chunk_len = FIRST_CHUNK;
    while position < reader.len() {
        let len = (reader.len() - position).min(chunk_len as u64) as usize;
        let chunk = &mut buf[..len];
        reader.read_into(position, chunk)?;
        if let Some(i) = chunk.iter().position(|&b| b == 0xFF) {
            return Ok(Some(position + i as u64));
        }
        position += len as u64;
        chunk_len = (chunk_len * 2).min(SCAN_CHUNK);
    }
    Ok(None)
}

/// A lazy, forward-only sequence of the marker segments in a stream.
///
/// The only state is the offset at which the next marker search starts. Each yielded marker moves
/// it to the end of that marker's segment. The sequence ends after the EOI marker or after the first
/// error. A stream that runs out before EOI yields a malformed-stream error from the marker search.
///
/// The parser never looks at the bytes following an SOS segment unless it is polled again, so
/// callers that only need the headers should stop iterating once they see SOS.
pub struct MarkerParser<'r, R> {
    reader: &'r mut StreamReader<R>,
    position: u64,
    done: bool,
}

impl<'r, R: Read + Seek> MarkerParser<'r, R> {
    pub fn new(reader: &'r mut StreamReader<R>) -> Self {
        Self::starting_at(reader, 0)
    }

    pub fn starting_at(reader: &'r mut StreamReader<R>, position: u64) -> Self {
        Self {
            reader,
            position,
            done: false,
        }
    }

    /// Returns the offset at which the search for the next marker will start.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    fn next_marker(&mut self) -> Result<Marker> {
        let (code, offset) = find_marker(self.reader, self.position)?;
        let marker = Marker::from_stream(code, self.reader, offset)?;
        self.position = marker.header().end();
        if code == MarkerCode::EOI {
            if self.position < self.reader.len() {
                log::debug!(
                    "ignoring {} trailing bytes after EOI",
                    self.reader.len() - self.position
                );
            }
            self.done = true;
        }
        Ok(marker)
    }
}

impl<'r, R: Read + Seek> Iterator for MarkerParser<'r, R> {
    type Item = Result<Marker>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let res = self.next_marker();
        if res.is_err() {
            self.done = true;
        }
        Some(res)
    }
}

impl<'r, R: Read + Seek> std::iter::FusedIterator for MarkerParser<'r, R> {}
