pub mod audio_constants;
pub mod bits;
pub mod buffer;
pub mod error;
pub mod metadata;
pub mod options;
pub mod types;

pub use audio_constants::{f32_to_i32, i32_to_f32, quantize};
pub use bits::{BitReader, BitWriter};
pub use buffer::SampleBuffer;
pub use error::{HlacError, HlacResult};
pub use metadata::{decode_metadata, encode_metadata};
pub use options::{CompressionOptions, EncodingStrategy};
pub use types::*;
