

#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_copy_implementations,
    missing_debug_implementations,

    clippy::all,
)]

#![deny(
    unused_must_use,
    trivial_numeric_casts,
    redundant_semicolon
)]

// `deny` rather than `forbid`: the htj2k module needs a narrow, explicitly
// allowed exception to call into the external JPEG 2000 library.
#![deny(unsafe_code)]

// TODO #![warn(missing_docs)]


pub mod io; // public to allow for custom attribute byte parsing

pub mod math;
pub mod meta;
pub mod compression;
pub mod error;

#[macro_use]
extern crate smallvec;

/// Re-exports of the types commonly required to call a compression or decompression function.
pub mod prelude {
    pub use crate::meta;
    pub use crate::meta::{ChannelDescription, ChannelList, IntegerBounds, SampleType, Text};
    pub use crate::error;
    pub use crate::error::{Result, Error};
    pub use crate::compression::Compression;

    // re-export external stuff
    pub use half::f16;

    // export real types and attributes
    pub use crate::math::Vec2;
}
