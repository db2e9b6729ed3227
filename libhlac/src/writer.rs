use std::io::{Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::core::{
    encode_metadata, CompressedBlock, CompressionOptions, HlacError, HlacResult, SampleBuffer,
    StreamHeader, StreamInfo, Trailer, END_MARKER_SIZE, END_MARKER_TAG, MAGIC,
};
use crate::lossless::{BlockGroup, EncodeSummary, Encoder};

/// bytes of the trailer at the end of the header: total(8) + ratio(4)
pub(crate) const TRAILER_SIZE: usize = 12;

/// Writes an hlac stream to any sink.
///
/// The header goes out on construction, or with the first `write` when dc
/// removal needs to see samples first. Only whole block groups are ever
/// written. Once cancelled the writer refuses further writes and will not
/// close, so a stream never ends with totals for groups it lacks.
pub struct StreamWriter<W: Write> {
    sink: W,
    info: StreamInfo,
    encoder: Encoder,
    header_written: bool,
    /// offset of the header trailer from the start of the stream
    trailer_offset: u64,
    bytes_written: u64,
    cancel: Option<Arc<AtomicBool>>,
    cancelled: bool,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(sink: W, info: StreamInfo, options: CompressionOptions) -> HlacResult<Self> {
        info.validate()?;
        let encoder = Encoder::new(info.num_channels as usize, info.bit_depth, options)?;
        let defer_header = encoder.options().remove_dc_offset;

        let mut writer = StreamWriter {
            sink,
            info,
            encoder,
            header_written: false,
            trailer_offset: 0,
            bytes_written: 0,
            cancel: None,
            cancelled: false,
        };
        if !defer_header {
            writer.write_header(None)?;
        }
        Ok(writer)
    }

    /// check `flag` between block groups and stop with `Cancelled` once set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// bytes handed to the sink so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Encode `buffer` and write every block group it completes.
    pub fn write(&mut self, buffer: &SampleBuffer) -> HlacResult<()> {
        self.check_cancelled()?;
        if !self.header_written {
            self.encoder.prime(buffer)?;
            let dc = self.encoder.dc_offsets().map(|d| d.to_vec());
            self.write_header(dc)?;
        }
        let groups = self.encoder.encode(buffer)?;
        self.write_groups(&groups)
    }

    /// Flush the encoder, write the end marker and hand back the sink.
    pub fn close(mut self) -> HlacResult<(W, EncodeSummary)> {
        let summary = self.finish()?;
        Ok((self.sink, summary))
    }

    /// true after a write stopped on the cancel flag
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn finish(&mut self) -> HlacResult<EncodeSummary> {
        if self.cancelled {
            return Err(HlacError::Cancelled);
        }
        if !self.header_written {
            let empty = SampleBuffer::silence(self.info.num_channels as usize, 0);
            self.encoder.prime(&empty)?;
            let dc = self.encoder.dc_offsets().map(|d| d.to_vec());
            self.write_header(dc)?;
        }

        let groups = self.encoder.flush()?;
        self.write_groups(&groups)?;

        let trailer = self.trailer();
        let mut marker = Vec::with_capacity(END_MARKER_SIZE);
        marker.push(END_MARKER_TAG);
        write_trailer(&mut marker, &trailer);
        self.emit(&marker)?;
        self.sink.flush()?;

        let summary = self.encoder.summary();
        debug!(
            total_samples = summary.total_samples,
            bytes = self.bytes_written,
            ratio = summary.compression_ratio,
            "stream closed"
        );
        Ok(summary)
    }

    fn trailer(&self) -> Trailer {
        Trailer {
            total_samples: self.encoder.total_samples(),
            compression_ratio: self.encoder.compression_ratio() as f32,
        }
    }

    fn write_header(&mut self, dc_offsets: Option<Vec<i32>>) -> HlacResult<()> {
        let header = StreamHeader::new(&self.info, dc_offsets);
        let bytes = header_bytes(&header)?;
        self.trailer_offset = (bytes.len() - TRAILER_SIZE) as u64;
        self.emit(&bytes)?;
        self.header_written = true;
        Ok(())
    }

    fn write_groups(&mut self, groups: &[BlockGroup]) -> HlacResult<()> {
        let mut buf = Vec::new();
        for group in groups {
            self.check_cancelled()?;
            buf.clear();
            for block in group {
                write_block(&mut buf, block);
            }
            self.emit(&buf)?;
        }
        Ok(())
    }

    /// the encoder may already count groups that were dropped, so a raised
    /// flag latches
    fn check_cancelled(&mut self) -> HlacResult<()> {
        if !self.cancelled {
            let raised = self
                .cancel
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed));
            if !raised {
                return Ok(());
            }
            debug!(bytes = self.bytes_written, "encoding cancelled");
            self.cancelled = true;
        }
        Err(HlacError::Cancelled)
    }

    fn emit(&mut self, bytes: &[u8]) -> HlacResult<()> {
        self.sink.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }
}

impl<W: Write + Seek> StreamWriter<W> {
    /// Like `close`, then also fills in the header trailer so readers can
    /// skip the block scan.
    pub fn close_and_patch(mut self) -> HlacResult<(W, EncodeSummary)> {
        let summary = self.finish()?;
        let trailer = self.trailer();

        let end = self.sink.stream_position()?;
        let start = end - self.bytes_written;
        let mut bytes = Vec::with_capacity(TRAILER_SIZE);
        write_trailer(&mut bytes, &trailer);

        self.sink.seek(SeekFrom::Start(start + self.trailer_offset))?;
        self.sink.write_all(&bytes)?;
        self.sink.seek(SeekFrom::Start(end))?;
        self.sink.flush()?;

        Ok((self.sink, summary))
    }
}

/// serialized stream header, trailer last
pub(crate) fn header_bytes(header: &StreamHeader) -> HlacResult<Vec<u8>> {
    let metadata = encode_metadata(&header.metadata)?;
    let mut buf = Vec::with_capacity(64 + metadata.len());

    // Magic "HLAC"
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&header.version.to_le_bytes());
    buf.extend_from_slice(&header.sample_rate.to_le_bytes());
    buf.extend_from_slice(&header.num_channels.to_le_bytes());
    buf.extend_from_slice(&(header.bit_depth as u16).to_le_bytes());

    match &header.dc_offsets {
        Some(offsets) => {
            buf.push(1);
            for dc in offsets {
                buf.extend_from_slice(&dc.to_le_bytes());
            }
        }
        None => buf.push(0),
    }

    buf.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
    buf.extend_from_slice(&metadata);

    write_trailer(&mut buf, &header.trailer);
    Ok(buf)
}

fn write_trailer(buf: &mut Vec<u8>, trailer: &Trailer) {
    buf.extend_from_slice(&trailer.total_samples.to_le_bytes());
    buf.extend_from_slice(&trailer.compression_ratio.to_le_bytes());
}

/// block header (14 bytes) followed by the payload
pub(crate) fn write_block(buf: &mut Vec<u8>, block: &CompressedBlock) {
    buf.push(block.mode as u8);
    buf.push(block.bit_width);
    buf.extend_from_slice(&block.sample_count.to_le_bytes());
    buf.extend_from_slice(&block.cycle_length.to_le_bytes());
    buf.extend_from_slice(&(block.payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&block.payload);
}
