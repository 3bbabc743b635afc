use core::fmt;
use std::io;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error encountered while reading JPEG metadata.
///
/// None of these are recovered from internally. Use [`Error::kind`] to tell them apart.
pub struct Error {
    repr: Repr,
}

/// The category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A read extended past the end of the byte source.
    OutOfRange,
    /// The data is not a well-formed marker stream.
    MalformedStream,
    /// The headers reached SOS or EOI without a segment that is required.
    MissingSegment,
    /// The underlying byte source failed.
    Io,
}

pub(crate) enum Repr {
    OutOfRange { offset: u64, len: u64, size: u64 },
    Malformed(String),
    MissingSegment(&'static str),
    Io(io::Error),
}

impl From<String> for Repr {
    fn from(value: String) -> Self {
        Self::Malformed(value)
    }
}
impl<'a> From<&'a str> for Repr {
    fn from(value: &'a str) -> Self {
        Self::Malformed(value.into())
    }
}
impl From<io::Error> for Repr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl Error {
    pub(crate) fn from(e: impl Into<Repr>) -> Self {
        Self { repr: e.into() }
    }

    pub(crate) fn out_of_range(offset: u64, len: u64, size: u64) -> Self {
        Self {
            repr: Repr::OutOfRange { offset, len, size },
        }
    }

    pub(crate) fn missing_segment(name: &'static str) -> Self {
        Self {
            repr: Repr::MissingSegment(name),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            Repr::OutOfRange { .. } => ErrorKind::OutOfRange,
            Repr::Malformed(_) => ErrorKind::MalformedStream,
            Repr::MissingSegment(_) => ErrorKind::MissingSegment,
            Repr::Io(_) => ErrorKind::Io,
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Io(e) => fmt::Debug::fmt(e, f),
            _ => fmt::Display::fmt(self, f),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::OutOfRange { offset, len, size } => write!(
                f,
                "read of {len} bytes at offset {offset} exceeds stream length {size}"
            ),
            Repr::Malformed(s) => f.write_str(s),
            Repr::MissingSegment(name) => write!(f, "JPEG stream has no {name} segment"),
            Repr::Io(e) => write!(f, "failed to read JPEG stream: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.repr {
            Repr::Io(e) => Some(e),
            _ => None,
        }
    }
}
