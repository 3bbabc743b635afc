use std::io::{Read, Seek};

use crate::{
    error::{Error, Result},
    file::MarkerParser,
    marker::{App0Marker, App1Marker, Marker, MarkerCode, SofMarker},
    reader::StreamReader,
    DEFAULT_DPI,
};

/// The marker segments of a JPEG image up to and including its first SOS or EOI marker.
///
/// Construction fails unless a Start Of Frame segment was seen, so [`JfifMarkerSet::sof`] is always
/// available.
#[derive(Debug, Clone)]
pub struct JfifMarkerSet {
    markers: Vec<Marker>,
    sof: SofMarker,
    app0: Option<App0Marker>,
    app1: Option<App1Marker>,
}

impl JfifMarkerSet {
    pub fn from_stream<R: Read + Seek>(stream: R) -> Result<Self> {
        let mut reader = StreamReader::new(stream)?;
        Self::from_markers(MarkerParser::new(&mut reader))
    }

    /// Collects markers until SOS or EOI, without consuming anything after it.
    ///
    /// Running out of markers before either of them is a malformed-stream error.
    pub fn from_markers(markers: impl IntoIterator<Item = Result<Marker>>) -> Result<Self> {
        let mut collected = Vec::new();
        let mut sof = None;
        let mut app0 = None;
        let mut app1 = None;
        let mut terminated = false;

        for marker in markers {
            let marker = marker?;
            let code = marker.code();
            match &marker {
                Marker::Sof(m) if sof.is_none() => sof = Some(m.clone()),
                Marker::App0(m) if app0.is_none() => app0 = Some(m.clone()),
                Marker::App1(m) if app1.is_none() => app1 = Some(m.clone()),
                _ => {}
            }
            collected.push(marker);

            if code == MarkerCode::SOS || code == MarkerCode::EOI {
                terminated = true;
                break;
            }
        }

        if !terminated {
            return Err(Error::from("marker sequence ended before an SOS or EOI marker"));
        }

        let sof = sof.ok_or_else(|| Error::missing_segment("Start Of Frame"))?;
        Ok(Self {
            markers: collected,
            sof,
            app0,
            app1,
        })
    }

    #[inline]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Returns the first Start Of Frame segment.
    #[inline]
    pub fn sof(&self) -> &SofMarker {
        &self.sof
    }

    /// Returns the first JFIF APP0 segment, if any.
    #[inline]
    pub fn app0(&self) -> Option<&App0Marker> {
        self.app0.as_ref()
    }

    /// Returns the first Exif APP1 segment, if any.
    #[inline]
    pub fn app1(&self) -> Option<&App1Marker> {
        self.app1.as_ref()
    }

    /// Returns the horizontal and vertical resolution in dots per inch.
    ///
    /// The JFIF header takes precedence; a JFIF header without a density unit yields
    /// [`DEFAULT_DPI`] even if Exif data is present. Without a JFIF header the Exif resolution is
    /// used, and without either both values are [`DEFAULT_DPI`].
    pub fn dpi(&self) -> (u32, u32) {
        if let Some(app0) = self.app0() {
            (app0.horz_dpi(), app0.vert_dpi())
        } else if let Some(app1) = self.app1() {
            (app1.horz_dpi(), app1.vert_dpi())
        } else {
            (DEFAULT_DPI, DEFAULT_DPI)
        }
    }

    #[inline]
    pub fn horz_dpi(&self) -> u32 {
        self.dpi().0
    }

    #[inline]
    pub fn vert_dpi(&self) -> u32 {
        self.dpi().1
    }
}
