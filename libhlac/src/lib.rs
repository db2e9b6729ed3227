#![allow(clippy::needless_range_loop)]

//! hlac: lossless audio block codec
//!
//! Samples are cut into windows, each channel's window becomes one block
//! encoded as fixed-width pcm, cycle delta or anchor/residual diff, and the
//! blocks are framed into a stream that can be read back at random.
//!
//! ```no_run
//! use std::io::Cursor;
//! use libhlac::{CompressionOptions, SampleBuffer, StreamInfo, StreamReader, StreamWriter};
//!
//! # fn main() -> libhlac::HlacResult<()> {
//! let buffer = SampleBuffer::silence(2, 44100);
//! let info = StreamInfo::new(44100.0, 2, 16);
//! let mut writer = StreamWriter::new(Cursor::new(Vec::new()), info, CompressionOptions::delta())?;
//! writer.write(&buffer)?;
//! let (sink, summary) = writer.close_and_patch()?;
//! println!("ratio {:.3}", summary.compression_ratio);
//!
//! let mut reader = StreamReader::new(Cursor::new(sink.into_inner()))?;
//! assert_eq!(reader.read_all()?, buffer);
//! # Ok(())
//! # }
//! ```

use std::io::Cursor;

pub mod core;
pub mod helpers;
pub mod lossless;

mod reader;
mod writer;

pub use crate::core::{
    metadata::*, BlockMode, CompressedBlock, CompressionOptions, EncodingStrategy, HlacError,
    HlacResult, SampleBuffer, StreamHeader, StreamInfo, Trailer, MAGIC, VERSION,
};
pub use helpers::CompressionHelpers;
pub use lossless::{
    BlockCodec, BlockGroup, Decoder, DecoderState, EncodeSummary, Encoder, EncoderState,
};
pub use reader::{read_header, GroupEntry, SeekIndex, StreamReader};
pub use writer::StreamWriter;

/// library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Encode a whole buffer to an in-memory stream with a patched trailer.
pub fn encode_buffer(
    buffer: &SampleBuffer,
    info: StreamInfo,
    options: CompressionOptions,
) -> HlacResult<(Vec<u8>, EncodeSummary)> {
    let mut writer = StreamWriter::new(Cursor::new(Vec::new()), info, options)?;
    writer.write(buffer)?;
    let (sink, summary) = writer.close_and_patch()?;
    Ok((sink.into_inner(), summary))
}

/// Decode an in-memory stream completely.
pub fn decode_bytes(data: &[u8]) -> HlacResult<(StreamHeader, SampleBuffer)> {
    let mut reader = StreamReader::new(Cursor::new(data))?;
    let samples = reader.read_all()?;
    Ok((reader.header().clone(), samples))
}
