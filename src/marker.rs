//! Typed JPEG marker segments.

#![allow(non_snake_case)]

use std::{
    fmt,
    io::{Read, Seek},
};

use bytemuck::AnyBitPattern;

use crate::{
    error::{Error, Result},
    exif,
    reader::StreamReader,
    DEFAULT_DPI,
};

/// The type byte of a `0xFF 0xXX` marker.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerCode(pub u8);

impl MarkerCode {
    /// Temporary private use in arithmetic coding.
    pub const TEM: Self = Self(0x01);

    /// Baseline DCT.
    pub const SOF0: Self = Self(0xC0);
    /// Extended Sequential DCT.
    pub const SOF1: Self = Self(0xC1);
    /// Progressive DCT.
    pub const SOF2: Self = Self(0xC2);
    /// Lossless sequential.
    pub const SOF3: Self = Self(0xC3);
    /// Define Huffman Tables.
    pub const DHT: Self = Self(0xC4);
    /// Differential sequential DCT.
    pub const SOF5: Self = Self(0xC5);
    /// Differential progressive DCT.
    pub const SOF6: Self = Self(0xC6);
    /// Differential lossless (sequential).
    pub const SOF7: Self = Self(0xC7);
    /// Reserved for JPEG extensions.
    pub const JPG: Self = Self(0xC8);
    /// Extended sequential DCT, arithmetic coding.
    pub const SOF9: Self = Self(0xC9);
    /// Progressive DCT, arithmetic coding.
    pub const SOF10: Self = Self(0xCA);
    /// Lossless (sequential), arithmetic coding.
    pub const SOF11: Self = Self(0xCB);
    /// Define Arithmetic Coding conditioning.
    pub const DAC: Self = Self(0xCC);
    /// Differential sequential DCT, arithmetic coding.
    pub const SOF13: Self = Self(0xCD);
    /// Differential progressive DCT, arithmetic coding.
    pub const SOF14: Self = Self(0xCE);
    /// Differential lossless (sequential), arithmetic coding.
    pub const SOF15: Self = Self(0xCF);

    pub const RST0: Self = Self(0xD0);
    pub const RST7: Self = Self(0xD7);

    /// Start Of Image.
    pub const SOI: Self = Self(0xD8);
    /// End Of Image.
    pub const EOI: Self = Self(0xD9);
    /// Start Of Scan.
    pub const SOS: Self = Self(0xDA);
    /// Define Quantization Tables.
    pub const DQT: Self = Self(0xDB);
    /// Define Number of Lines.
    pub const DNL: Self = Self(0xDC);
    /// Define Restart Interval.
    pub const DRI: Self = Self(0xDD);
    /// Define Hierarchical Progression.
    pub const DHP: Self = Self(0xDE);
    /// Expand Reference Components.
    pub const EXP: Self = Self(0xDF);

    /// Application segment 0, used by the JFIF header.
    pub const APP0: Self = Self(0xE0);
    /// Application segment 1, used by Exif.
    pub const APP1: Self = Self(0xE1);
    pub const APP15: Self = Self(0xEF);

    /// Comment.
    pub const COM: Self = Self(0xFE);

    /// Returns whether this marker stands alone, without a length field or payload.
    ///
    /// These are TEM, SOI, EOI and RST0-RST7.
    #[inline]
    pub fn is_standalone(self) -> bool {
        matches!(self.0, 0x01 | 0xD0..=0xD9)
    }

    /// Returns whether this is one of the 13 Start Of Frame markers.
    ///
    /// DHT, JPG and DAC share the `0xCX` range but are not frame headers.
    #[inline]
    pub fn is_sof(self) -> bool {
        matches!(self.0, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF)
    }

    /// Returns the mnemonic of this marker, if it has one.
    pub fn name(self) -> Option<&'static str> {
        const SOF: [&str; 16] = [
            "SOF0", "SOF1", "SOF2", "SOF3", "DHT", "SOF5", "SOF6", "SOF7", "JPG", "SOF9", "SOF10",
            "SOF11", "DAC", "SOF13", "SOF14", "SOF15",
        ];
        const RST: [&str; 8] = [
            "RST0", "RST1", "RST2", "RST3", "RST4", "RST5", "RST6", "RST7",
        ];
        const APP: [&str; 16] = [
            "APP0", "APP1", "APP2", "APP3", "APP4", "APP5", "APP6", "APP7", "APP8", "APP9",
            "APP10", "APP11", "APP12", "APP13", "APP14", "APP15",
        ];

        Some(match self.0 {
            0x01 => "TEM",
            n @ 0xC0..=0xCF => SOF[usize::from(n - 0xC0)],
            n @ 0xD0..=0xD7 => RST[usize::from(n - 0xD0)],
            0xD8 => "SOI",
            0xD9 => "EOI",
            0xDA => "SOS",
            0xDB => "DQT",
            0xDC => "DNL",
            0xDD => "DRI",
            0xDE => "DHP",
            0xDF => "EXP",
            n @ 0xE0..=0xEF => APP[usize::from(n - 0xE0)],
            0xFE => "COM",
            _ => return None,
        })
    }
}

impl fmt::Debug for MarkerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => f
                .debug_tuple("MarkerCode")
                .field(&format_args!("{:02x}", self.0))
                .finish(),
        }
    }
}

/// Position and extent of a marker segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    code: MarkerCode,
    offset: u64,
    segment_length: u16,
}

impl SegmentHeader {
    #[inline]
    pub fn code(&self) -> MarkerCode {
        self.code
    }

    /// Returns the offset of the `0xFF` byte that introduces the marker.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the declared length of the segment, which includes the two length bytes but not the
    /// marker itself. Standalone markers have a length of 0.
    #[inline]
    pub fn segment_length(&self) -> u16 {
        self.segment_length
    }

    /// Returns the offset of the first byte after this segment.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + 2 + u64::from(self.segment_length)
    }

    /// Offset of the segment payload, right after the length field.
    fn payload(&self) -> u64 {
        self.offset + 4
    }

    fn payload_len(&self) -> u16 {
        self.segment_length.saturating_sub(2)
    }
}

/// A parsed marker segment.
///
/// Only the segments needed to describe the image get their own variant; everything else is kept as
/// a [`SegmentHeader`] so that the stream can be walked past it.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Marker {
    Generic(SegmentHeader),
    App0(App0Marker),
    App1(App1Marker),
    Sof(SofMarker),
}

impl Marker {
    /// Reads the marker segment whose `0xFF` byte is at `offset`.
    ///
    /// `code` is the marker type that was found there. The segment's declared length is validated
    /// against the stream before any of its fields are decoded.
    pub fn from_stream<R: Read + Seek>(
        code: MarkerCode,
        reader: &mut StreamReader<R>,
        offset: u64,
    ) -> Result<Self> {
        if code.is_standalone() {
            return Ok(Self::Generic(SegmentHeader {
                code,
                offset,
                segment_length: 0,
            }));
        }

        let segment_length = reader.read_u16(offset + 2)?;
        if segment_length < 2 {
            return Err(Error::from(format!(
                "{code:?} segment at offset {offset} has invalid length {segment_length}"
            )));
        }
        reader.check_range(offset + 2, segment_length.into())?;

        let header = SegmentHeader {
            code,
            offset,
            segment_length,
        };
        let marker = if code == MarkerCode::APP0 {
            App0Marker::read(header, reader)?.map_or(Self::Generic(header), Self::App0)
        } else if code == MarkerCode::APP1 {
            App1Marker::read(header, reader)?.map_or(Self::Generic(header), Self::App1)
        } else if code.is_sof() {
            Self::Sof(SofMarker::read(header, reader)?)
        } else {
            Self::Generic(header)
        };
        log::trace!("{:?}", marker);
        Ok(marker)
    }

    #[inline]
    pub fn header(&self) -> &SegmentHeader {
        match self {
            Self::Generic(h) => h,
            Self::App0(m) => &m.header,
            Self::App1(m) => &m.header,
            Self::Sof(m) => &m.header,
        }
    }

    #[inline]
    pub fn code(&self) -> MarkerCode {
        self.header().code
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.header().offset
    }

    #[inline]
    pub fn segment_length(&self) -> u16 {
        self.header().segment_length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DensityUnit {
    None,
    DotsPerInch,
    DotsPerCm,
}

/// Converts a density in `unit` to dots per inch.
///
/// Densities without a unit only describe the aspect ratio, so they (and nonsensical zero
/// densities) fall back to [`DEFAULT_DPI`].
pub(crate) fn dpi(unit: DensityUnit, density: f64) -> u32 {
    let dpi = match unit {
        DensityUnit::None => return DEFAULT_DPI,
        DensityUnit::DotsPerInch => density.round(),
        DensityUnit::DotsPerCm => (density * 2.54).round(),
    };
    if dpi >= 1.0 && dpi <= f64::from(u32::MAX) {
        dpi as u32
    } else {
        DEFAULT_DPI
    }
}

#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
struct JfifHeader {
    identifier: [u8; 5],
    version: [u8; 2],
    unit: u8,
    Xdensity: [u8; 2],
    Ydensity: [u8; 2],
}

/// An APP0 segment holding a JFIF header.
#[derive(Debug, Clone, PartialEq)]
pub struct App0Marker {
    header: SegmentHeader,
    major_version: u8,
    minor_version: u8,
    unit: DensityUnit,
    xdensity: u16,
    ydensity: u16,
    horz_dpi: u32,
    vert_dpi: u32,
}

impl App0Marker {
    const JFIF: &'static [u8] = b"JFIF\0";

    /// Returns `None` for APP0 segments that don't carry a JFIF header.
    fn read<R: Read + Seek>(
        header: SegmentHeader,
        reader: &mut StreamReader<R>,
    ) -> Result<Option<Self>> {
        if usize::from(header.payload_len()) < std::mem::size_of::<JfifHeader>() {
            log::debug!(
                "APP0 segment at offset {} is too short for a JFIF header",
                header.offset
            );
            return Ok(None);
        }

        let jfif: JfifHeader = reader.read_obj(header.payload())?;
        if jfif.identifier[..] != *Self::JFIF {
            log::debug!(
                "skipping non-JFIF APP0 segment with identifier {:?}",
                jfif.identifier.escape_ascii().to_string()
            );
            return Ok(None);
        }

        let unit = match jfif.unit {
            0 => DensityUnit::None,
            1 => DensityUnit::DotsPerInch,
            2 => DensityUnit::DotsPerCm,
            e => {
                log::warn!("JFIF header specifies invalid density unit {e}, ignoring densities");
                DensityUnit::None
            }
        };
        let xdensity = u16::from_be_bytes(jfif.Xdensity);
        let ydensity = u16::from_be_bytes(jfif.Ydensity);

        Ok(Some(Self {
            header,
            major_version: jfif.version[0],
            minor_version: jfif.version[1],
            unit,
            xdensity,
            ydensity,
            horz_dpi: dpi(unit, xdensity.into()),
            vert_dpi: dpi(unit, ydensity.into()),
        }))
    }

    #[inline]
    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    #[inline]
    pub fn version(&self) -> (u8, u8) {
        (self.major_version, self.minor_version)
    }

    #[inline]
    pub fn unit(&self) -> DensityUnit {
        self.unit
    }

    #[inline]
    pub fn density_x(&self) -> u16 {
        self.xdensity
    }

    #[inline]
    pub fn density_y(&self) -> u16 {
        self.ydensity
    }

    /// Horizontal resolution in dots per inch, or [`DEFAULT_DPI`] if the header has no unit.
    #[inline]
    pub fn horz_dpi(&self) -> u32 {
        self.horz_dpi
    }

    /// Vertical resolution in dots per inch, or [`DEFAULT_DPI`] if the header has no unit.
    #[inline]
    pub fn vert_dpi(&self) -> u32 {
        self.vert_dpi
    }
}

/// An APP1 segment holding Exif data.
#[derive(Debug, Clone, PartialEq)]
pub struct App1Marker {
    header: SegmentHeader,
    horz_dpi: u32,
    vert_dpi: u32,
}

impl App1Marker {
    const EXIF: &'static [u8] = b"Exif\0\0";

    /// Returns `None` for APP1 segments that aren't Exif (XMP, for example).
    fn read<R: Read + Seek>(
        header: SegmentHeader,
        reader: &mut StreamReader<R>,
    ) -> Result<Option<Self>> {
        let len = usize::from(header.payload_len());
        if len < Self::EXIF.len()
            || reader.read_bytes(header.payload(), Self::EXIF.len())? != Self::EXIF
        {
            log::debug!("skipping non-Exif APP1 segment at offset {}", header.offset);
            return Ok(None);
        }

        let tiff_offset = header.payload() + Self::EXIF.len() as u64;
        let tiff = reader.read_bytes(tiff_offset, len - Self::EXIF.len())?;
        let (horz_dpi, vert_dpi) = match exif::resolution(&tiff) {
            Ok(dpi) => dpi,
            Err(e) => {
                log::warn!(
                    "ignoring resolution in Exif segment at offset {}: {e}",
                    header.offset
                );
                (DEFAULT_DPI, DEFAULT_DPI)
            }
        };

        Ok(Some(Self {
            header,
            horz_dpi,
            vert_dpi,
        }))
    }

    #[inline]
    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    #[inline]
    pub fn horz_dpi(&self) -> u32 {
        self.horz_dpi
    }

    #[inline]
    pub fn vert_dpi(&self) -> u32 {
        self.vert_dpi
    }
}

#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
struct FrameHeader {
    P: u8,
    Y: [u8; 2],
    X: [u8; 2],
    Nf: u8,
}

/// **SOF** Start Of Frame
#[derive(Debug, Clone, PartialEq)]
pub struct SofMarker {
    header: SegmentHeader,
    /// Sample precision in bits.
    P: u8,
    Y: u16,
    X: u16,
    Nf: u8,
}

impl SofMarker {
    fn read<R: Read + Seek>(header: SegmentHeader, reader: &mut StreamReader<R>) -> Result<Self> {
        if usize::from(header.payload_len()) < std::mem::size_of::<FrameHeader>() {
            return Err(Error::from(format!(
                "{:?} segment at offset {} is too short ({} bytes)",
                header.code, header.offset, header.segment_length
            )));
        }

        let frame: FrameHeader = reader.read_obj(header.payload())?;
        Ok(Self {
            header,
            P: frame.P,
            Y: u16::from_be_bytes(frame.Y),
            X: u16::from_be_bytes(frame.X),
            Nf: frame.Nf,
        })
    }

    #[inline]
    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    /// Returns the SOF marker, which identifies the coding process.
    #[inline]
    pub fn code(&self) -> MarkerCode {
        self.header.code
    }

    /// Returns the sample precision in bits.
    #[inline]
    pub fn precision(&self) -> u8 {
        self.P
    }

    /// Returns the number of samples per line (the width of the frame).
    #[inline]
    pub fn px_width(&self) -> u16 {
        self.X
    }

    /// Returns the number of lines in the image (the height of the frame).
    #[inline]
    pub fn px_height(&self) -> u16 {
        self.Y
    }

    #[inline]
    pub fn component_count(&self) -> u8 {
        self.Nf
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use expect_test::{expect, Expect};

    use crate::ErrorKind;

    use super::*;

    fn parse(bytes: &[u8]) -> Result<Marker> {
        let mut reader = StreamReader::new(Cursor::new(bytes))?;
        Marker::from_stream(MarkerCode(bytes[1]), &mut reader, 0)
    }

    fn check(bytes: &[u8], expect: Expect) {
        let out = match parse(bytes) {
            Ok(marker) => format!("{marker:?}"),
            Err(e) => format!("error: {e}"),
        };
        expect.assert_eq(&out);
    }

    #[test]
    fn codes() {
        assert!(MarkerCode::SOF0.is_sof());
        assert!(MarkerCode::SOF15.is_sof());
        assert!(!MarkerCode::DHT.is_sof());
        assert!(!MarkerCode::JPG.is_sof());
        assert!(!MarkerCode::DAC.is_sof());
        assert!(MarkerCode::SOI.is_standalone());
        assert!(MarkerCode::RST0.is_standalone());
        assert!(MarkerCode::RST7.is_standalone());
        assert!(MarkerCode::TEM.is_standalone());
        assert!(!MarkerCode::SOS.is_standalone());
        assert_eq!(format!("{:?}", MarkerCode(0xEE)), "APP14");
        assert_eq!(format!("{:?}", MarkerCode(0xD3)), "RST3");
        assert_eq!(format!("{:?}", MarkerCode(0x42)), "MarkerCode(42)");
    }

    #[test]
    fn standalone() {
        check(
            &[0xFF, 0xD8],
            expect![[r#"Generic(SegmentHeader { code: SOI, offset: 0, segment_length: 0 })"#]],
        );
    }

    #[test]
    fn app0() {
        check(
            &[
                0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x02, //
                0x02, 0x00, 0x64, 0x00, 0x64, // cm, 100x100
                0x00, 0x00, // no thumbnail
            ],
            expect![[r#"App0(App0Marker { header: SegmentHeader { code: APP0, offset: 0, segment_length: 16 }, major_version: 1, minor_version: 2, unit: DotsPerCm, xdensity: 100, ydensity: 100, horz_dpi: 254, vert_dpi: 254 })"#]],
        );
        check(
            &[
                0xFF, 0xE0, 0x00, 0x0E, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, //
                0x00, 0x00, 0x01, 0x00, 0x01, // aspect ratio only
            ],
            expect![[r#"App0(App0Marker { header: SegmentHeader { code: APP0, offset: 0, segment_length: 14 }, major_version: 1, minor_version: 1, unit: None, xdensity: 1, ydensity: 1, horz_dpi: 72, vert_dpi: 72 })"#]],
        );
        // JFXX extension segments are not JFIF headers.
        check(
            &[
                0xFF, 0xE0, 0x00, 0x0E, b'J', b'F', b'X', b'X', 0x00, 0x10, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00,
            ],
            expect![[r#"Generic(SegmentHeader { code: APP0, offset: 0, segment_length: 14 })"#]],
        );
        check(
            &[0xFF, 0xE0, 0x00, 0x02],
            expect![[r#"Generic(SegmentHeader { code: APP0, offset: 0, segment_length: 2 })"#]],
        );
    }

    #[test]
    fn sof() {
        check(
            &[
                0xFF, 0xC2, 0x00, 0x11, 0x08, 0x01, 0xE0, 0x02, 0x80, 0x03, //
                0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01,
            ],
            expect![[r#"Sof(SofMarker { header: SegmentHeader { code: SOF2, offset: 0, segment_length: 17 }, P: 8, Y: 480, X: 640, Nf: 3 })"#]],
        );
        check(
            &[0xFF, 0xC0, 0x00, 0x04, 0x08, 0x00],
            expect![[r#"error: SOF0 segment at offset 0 is too short (4 bytes)"#]],
        );
    }

    #[test]
    fn lengths() {
        check(
            &[0xFF, 0xDB, 0x00, 0x01],
            expect![[r#"error: DQT segment at offset 0 has invalid length 1"#]],
        );
        check(
            &[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x01, 0xE0, 0x02, 0x80],
            expect![[r#"error: read of 17 bytes at offset 2 exceeds stream length 9"#]],
        );
        assert_eq!(
            parse(&[0xFF, 0xFE, 0x00]).unwrap_err().kind(),
            ErrorKind::OutOfRange
        );
    }

    #[test]
    fn dpi_conversion() {
        assert_eq!(dpi(DensityUnit::DotsPerInch, 300.0), 300);
        assert_eq!(dpi(DensityUnit::DotsPerCm, 100.0), 254);
        assert_eq!(dpi(DensityUnit::DotsPerCm, 118.0), 300);
        assert_eq!(dpi(DensityUnit::None, 300.0), DEFAULT_DPI);
        assert_eq!(dpi(DensityUnit::DotsPerInch, 0.0), DEFAULT_DPI);
    }
}
