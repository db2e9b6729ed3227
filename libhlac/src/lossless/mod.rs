//! Lossless block coding for hlac
//!
//! Three block strategies: fixed-width pcm, cycle delta and anchor/residual
//! diff. Every block decodes to exactly the integers it was built from.

pub mod codec;
pub mod decoder;
pub mod delta;
pub mod diff;
pub mod encoder;
pub mod pcm;

pub use codec::BlockCodec;
pub use decoder::{Decoder, DecoderState};
pub use encoder::{BlockGroup, EncodeSummary, Encoder, EncoderState};
