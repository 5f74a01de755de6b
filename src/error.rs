

pub type Result<T> = std::result::Result<T, Error>;
pub type PassiveResult = Result<()>;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


/// Errors produced while encoding or decoding pixel data.
#[derive(Debug)]
pub enum Error {
    /// A compression mode, version, or combination of parameters this crate does not implement.
    NotSupported(String),

    /// The caller passed parameters that do not describe a valid request
    /// (e.g. an empty rectangle, or a channel layout a codec cannot represent).
    Invalid(String),

    /// Compressed data failed to parse: a corrupt header, an out-of-range
    /// symbol, a size that does not match what the header promised, or a
    /// bitstream that ends in the middle of a value.
    Corrupted(String),

    /// An arithmetic quantity (buffer offset, run length, plane size) would
    /// not fit in the type used to store it.
    Overflow(String),

    /// A stream declares a wire format version this crate does not decode.
    UnsupportedVersion(String),

    /// The channel list passed to a codec does not match what the compressed
    /// data was encoded with (count, sample types, or subsampling differ).
    ChannelMismatch(String),

    /// An external codec (e.g. the JPEG 2000 library backing HT-J2K) rejected
    /// the data it was given.
    ExternalCodec(String),

    /// This error can also occur when reading invalid files,
    /// where the number of bytes to read does not match the input stream length.
    Io(IoError),
}


impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::NotSupported(message.into())
    }

    pub fn corrupted(message: impl Into<String>) -> Self {
        Error::Corrupted(message.into())
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Error::Overflow(message.into())
    }

    pub fn external_codec(message: impl Into<String>) -> Self {
        Error::ExternalCodec(message.into())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotSupported(message) => write!(f, "not supported: {}", message),
            Error::Invalid(message) => write!(f, "invalid: {}", message),
            Error::Corrupted(message) => write!(f, "corrupted: {}", message),
            Error::Overflow(message) => write!(f, "overflow: {}", message),
            Error::UnsupportedVersion(message) => write!(f, "unsupported version: {}", message),
            Error::ChannelMismatch(message) => write!(f, "channel mismatch: {}", message),
            Error::ExternalCodec(message) => write!(f, "external codec error: {}", message),
            Error::Io(io) => write!(f, "io error: {}", io),
        }
    }
}

impl std::error::Error for Error {}

/// Enable using the `?` operator on io::Result
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}

/// Enable using the `?` operator on fallible `usize`/`u16`/`i32` narrowing conversions.
impl From<std::num::TryFromIntError> for Error {
    fn from(error: std::num::TryFromIntError) -> Self {
        Error::Overflow(error.to_string())
    }
}

#[inline]
pub fn usize_to_i32(value: usize) -> i32 {
    debug_assert!(value <= i32::MAX as usize, "value too large for i32: {}", value);
    value as i32
}

#[inline]
pub fn usize_to_u16(value: usize) -> std::result::Result<u16, std::num::TryFromIntError> {
    u16::try_from(value)
}
