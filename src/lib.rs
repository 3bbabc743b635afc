//! Reads pixel dimensions and print resolution from JPEG/JFIF images.
//!
//! Only the marker segments in front of the first scan are examined. No image data is decoded.

mod error;
mod exif;
mod file;
mod marker;
mod metadata;
mod reader;

use std::{
    borrow::Cow,
    io::{Cursor, Read, Seek},
};

pub use error::{Error, ErrorKind, Result};
pub use file::{find_marker, MarkerParser};
pub use marker::{
    App0Marker, App1Marker, DensityUnit, Marker, MarkerCode, SegmentHeader, SofMarker,
};
pub use metadata::JfifMarkerSet;
pub use reader::StreamReader;

/// Resolution reported for images that don't record one.
///
/// This is a convention for screen images, not a measured value.
pub const DEFAULT_DPI: u32 = 72;

/// A JPEG image, described by the values a document needs to embed it.
#[derive(Debug, Clone)]
pub struct JfifImage<'a> {
    blob: Cow<'a, [u8]>,
    filename: String,
    px_width: u32,
    px_height: u32,
    horz_dpi: u32,
    vert_dpi: u32,
}

impl<'a> JfifImage<'a> {
    pub const CONTENT_TYPE: &'static str = "image/jpeg";
    pub const DEFAULT_EXT: &'static str = "jpg";

    /// Reads the image description from `stream`, which holds the same bytes as `blob`.
    ///
    /// Only the headers in front of the first scan are read. The stream is left open and may be
    /// positioned anywhere afterwards. `blob` is not inspected and is passed through unchanged.
    ///
    /// If this returns an error the data is either corrupt or not a JPEG image.
    pub fn from_stream<R: Read + Seek>(
        stream: &mut R,
        blob: impl Into<Cow<'a, [u8]>>,
        filename: impl Into<String>,
    ) -> Result<Self> {
        let markers = JfifMarkerSet::from_stream(stream)?;
        Ok(Self::from_markers(&markers, blob.into(), filename.into()))
    }

    /// Reads the image description from an in-memory JPEG file.
    pub fn from_bytes(blob: impl Into<Cow<'a, [u8]>>, filename: impl Into<String>) -> Result<Self> {
        let blob = blob.into();
        let markers = JfifMarkerSet::from_stream(Cursor::new(&*blob))?;
        Ok(Self::from_markers(&markers, blob, filename.into()))
    }

    fn from_markers(markers: &JfifMarkerSet, blob: Cow<'a, [u8]>, filename: String) -> Self {
        let sof = markers.sof();
        let (horz_dpi, vert_dpi) = markers.dpi();
        log::debug!(
            "{filename}: {:?} {}x{} at {}x{} dpi",
            sof.code(),
            sof.px_width(),
            sof.px_height(),
            horz_dpi,
            vert_dpi,
        );

        Self {
            blob,
            filename,
            px_width: sof.px_width().into(),
            px_height: sof.px_height().into(),
            horz_dpi,
            vert_dpi,
        }
    }

    #[inline]
    pub fn px_width(&self) -> u32 {
        self.px_width
    }

    #[inline]
    pub fn px_height(&self) -> u32 {
        self.px_height
    }

    #[inline]
    pub fn horz_dpi(&self) -> u32 {
        self.horz_dpi
    }

    #[inline]
    pub fn vert_dpi(&self) -> u32 {
        self.vert_dpi
    }

    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns the image file exactly as it was passed in.
    #[inline]
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn into_blob(self) -> Cow<'a, [u8]> {
        self.blob
    }
}
