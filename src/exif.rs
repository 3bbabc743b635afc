//! Resolution tags of the TIFF structure embedded in an Exif APP1 segment.

use crate::{
    error::{Error, Result},
    marker::{dpi, DensityUnit},
    DEFAULT_DPI,
};

const X_RESOLUTION: u16 = 0x011A;
const Y_RESOLUTION: u16 = 0x011B;
const RESOLUTION_UNIT: u16 = 0x0128;

const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

/// Returns the horizontal and vertical DPI recorded in IFD0 of `tiff`.
///
/// A missing resolution tag yields [`DEFAULT_DPI`] for that axis. A missing unit means inches.
pub(crate) fn resolution(tiff: &[u8]) -> Result<(u32, u32)> {
    let tiff = Tiff::new(tiff)?;

    let mut xres = None;
    let mut yres = None;
    let mut unit = DensityUnit::DotsPerInch;

    let ifd = tiff.offset(4)?;
    let count = tiff.u16(ifd)?;
    for i in 0..usize::from(count) {
        let entry = add(ifd, 2 + i * 12)?;
        let tag = tiff.u16(entry)?;
        let ty = tiff.u16(add(entry, 2)?)?;
        match tag {
            X_RESOLUTION => xres = Some(tiff.rational(entry, ty)?),
            Y_RESOLUTION => yres = Some(tiff.rational(entry, ty)?),
            RESOLUTION_UNIT => {
                unit = match tiff.short(entry, ty)? {
                    1 => DensityUnit::None,
                    2 => DensityUnit::DotsPerInch,
                    3 => DensityUnit::DotsPerCm,
                    e => return Err(Error::from(format!("invalid TIFF resolution unit {e}"))),
                }
            }
            _ => {}
        }
    }

    let axis = |res: Option<f64>| res.map_or(DEFAULT_DPI, |res| dpi(unit, res));
    Ok((axis(xres), axis(yres)))
}

/// Adds a displacement to an offset taken from the TIFF data.
fn add(offset: usize, delta: usize) -> Result<usize> {
    offset
        .checked_add(delta)
        .ok_or_else(|| Error::from(format!("TIFF offset {offset} + {delta} overflows")))
}

struct Tiff<'a> {
    data: &'a [u8],
    big_endian: bool,
}

impl<'a> Tiff<'a> {
    fn new(data: &'a [u8]) -> Result<Self> {
        let big_endian = match data.get(..2) {
            Some(b"MM") => true,
            Some(b"II") => false,
            _ => return Err(Error::from("Exif data does not start with a TIFF header")),
        };
        let tiff = Self { data, big_endian };
        match tiff.u16(2)? {
            42 => Ok(tiff),
            magic => Err(Error::from(format!("invalid TIFF magic number {magic}"))),
        }
    }

    fn bytes<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        offset
            .checked_add(N)
            .and_then(|end| self.data.get(offset..end))
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                Error::from(format!(
                    "TIFF read of {N} bytes at offset {offset} exceeds {} bytes of Exif data",
                    self.data.len()
                ))
            })
    }

    fn u16(&self, offset: usize) -> Result<u16> {
        let b = self.bytes(offset)?;
        Ok(if self.big_endian {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    }

    fn u32(&self, offset: usize) -> Result<u32> {
        let b = self.bytes(offset)?;
        Ok(if self.big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        })
    }

    /// Reads a 32-bit offset to elsewhere in the TIFF data.
    fn offset(&self, at: usize) -> Result<usize> {
        let offset = self.u32(at)?;
        usize::try_from(offset)
            .map_err(|_| Error::from(format!("TIFF offset {offset} does not fit in memory")))
    }

    /// Reads the integer value stored inline in the IFD entry at `entry`.
    fn short(&self, entry: usize, ty: u16) -> Result<u32> {
        let value = add(entry, 8)?;
        match ty {
            TYPE_SHORT => self.u16(value).map(u32::from),
            TYPE_LONG => self.u32(value),
            _ => Err(Error::from(format!("unexpected TIFF field type {ty} for integer tag"))),
        }
    }

    /// Reads the RATIONAL value referenced by the IFD entry at `entry`.
    fn rational(&self, entry: usize, ty: u16) -> Result<f64> {
        if ty != TYPE_RATIONAL {
            return Err(Error::from(format!(
                "unexpected TIFF field type {ty} for resolution tag"
            )));
        }
        let offset = self.offset(add(entry, 8)?)?;
        let num = self.u32(offset)?;
        let den = self.u32(add(offset, 4)?)?;
        if den == 0 {
            return Err(Error::from("TIFF resolution has a zero denominator"));
        }
        Ok(f64::from(num) / f64::from(den))
    }
}
