//! Channel descriptions and small geometric attributes shared by every codec.
//!
//! This module intentionally only keeps the subset of the original EXR
//! attribute model that the pixel codecs need to know about a scan line:
//! which channels it carries, their sample type, their subsampling, and the
//! rectangle of pixels being encoded or decoded. Parsing full EXR headers,
//! offset tables, or multi-part file layout is out of scope here.

use crate::error::{Error, Result};
use crate::io::{Data, positive_i32};
use crate::math::Vec2;
use smallvec::SmallVec;
use std::io::{Read, Write};

/// A byte-string as used for channel names. Null-terminated on the wire,
/// validated to be non-empty and reasonably short.
#[derive(Clone, Default, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Text {
    bytes: SmallVec<[u8; 24]>,
}

impl Text {
    pub fn new_or_panic(str: impl Into<String>) -> Self {
        Self::new(str).expect("invalid text")
    }

    pub fn new(str: impl Into<String>) -> Result<Self> {
        let string = str.into();
        if string.is_empty() {
            return Err(Error::invalid("channel name must not be empty"));
        }

        Ok(Text { bytes: SmallVec::from_slice(string.as_bytes()) })
    }

    pub fn as_slice(&self) -> &[u8] { &self.bytes }
}

impl From<Text> for String {
    fn from(text: Text) -> Self {
        String::from_utf8_lossy(&text.bytes).into_owned()
    }
}

impl std::fmt::Display for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

/// The numeric representation a channel's samples are stored in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SampleType {
    U32,
    F16,
    F32,
}

impl SampleType {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleType::U32 => 4,
            SampleType::F16 => 2,
            SampleType::F32 => 4,
        }
    }
}

/// Describes one channel of an image: its name, how samples are encoded,
/// and whether it is subsampled relative to the other channels.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelDescription {
    pub name: Text,
    pub sample_type: SampleType,

    /// Whether the values should be quantized before lossy compression
    /// (chroma channels typically are not, luma channels typically are).
    pub quantize_linearly: bool,

    /// How many pixels are skipped along x and y for each stored sample.
    pub sampling: Vec2<usize>,
}

impl ChannelDescription {
    pub fn subsampled_resolution(&self, resolution: Vec2<usize>) -> Vec2<usize> {
        Vec2(
            resolution.0 / self.sampling.x(),
            resolution.1 / self.sampling.y(),
        )
    }
}

/// The full set of channels making up one image part, along with the
/// cached uniform sample type (if all channels share one) and the combined
/// byte size of a single pixel's worth of samples.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelList {
    pub list: SmallVec<[ChannelDescription; 5]>,
    pub bytes_per_pixel: usize,
    pub uniform_sample_type: Option<SampleType>,
}

impl ChannelList {
    pub fn new(list: SmallVec<[ChannelDescription; 5]>) -> Self {
        let bytes_per_pixel = list.iter()
            .map(|channel| channel.sample_type.bytes_per_sample())
            .sum();

        let uniform_sample_type = {
            let mut types = list.iter().map(|channel| channel.sample_type);
            let first = types.next();
            if let Some(first) = first {
                if types.all(|other| other == first) { Some(first) } else { None }
            } else {
                None
            }
        };

        ChannelList { list, bytes_per_pixel, uniform_sample_type }
    }
}

/// An axis-aligned integer rectangle, given by its top-left position and size.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IntegerBounds {
    pub position: Vec2<i32>,
    pub size: Vec2<usize>,
}

impl IntegerBounds {
    pub fn zero() -> Self {
        IntegerBounds { position: Vec2(0, 0), size: Vec2(0, 0) }
    }

    pub fn new(position: impl Into<Vec2<i32>>, size: impl Into<Vec2<usize>>) -> Self {
        IntegerBounds { position: position.into(), size: size.into() }
    }

    pub fn from_dimensions(size: impl Into<Vec2<usize>>) -> Self {
        Self::new(Vec2(0, 0), size)
    }

    pub fn end(self) -> Vec2<i32> {
        self.position + self.size.to_i32()
    }

    pub fn validate(&self) -> Result<()> {
        if self.size.0 == 0 || self.size.1 == 0 {
            return Err(Error::invalid("rectangle size must not be zero"));
        }

        Ok(())
    }

    pub fn contains(self, point: Vec2<i32>) -> bool {
        point.0 >= self.position.0 && point.1 >= self.position.1
            && point.0 < self.end().0 && point.1 < self.end().1
    }

    pub fn with_origin(self, origin: Vec2<i32>) -> Self {
        IntegerBounds { position: self.position + origin, size: self.size }
    }

    pub fn read(read: &mut impl Read) -> Result<Self> {
        let min_x = i32::read(read)?;
        let min_y = i32::read(read)?;
        let max_x = i32::read(read)?;
        let max_y = i32::read(read)?;

        let width = positive_i32(max_x - min_x + 1, "rectangle width")? as usize;
        let height = positive_i32(max_y - min_y + 1, "rectangle height")? as usize;

        Ok(IntegerBounds { position: Vec2(min_x, min_y), size: Vec2(width, height) })
    }

    pub fn write(self, write: &mut impl Write) -> Result<()> {
        let Vec2(min_x, min_y) = self.position;
        let Vec2(max_x, max_y) = self.end() - Vec2(1, 1);

        min_x.write(write)?;
        min_y.write(write)?;
        max_x.write(write)?;
        max_y.write(write)
    }
}

/// A rectangle with floating point bounds, used by a handful of attributes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FloatRect {
    pub min: (f32, f32),
    pub max: (f32, f32),
}
