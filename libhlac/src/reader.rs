use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use crate::core::metadata::MAX_METADATA_BYTES;
use crate::core::{
    decode_metadata, validate_block_header, BlockMode, CompressedBlock, HlacError, HlacResult,
    SampleBuffer, StreamHeader, Trailer, BLOCK_HEADER_SIZE, END_MARKER_SIZE, END_MARKER_TAG,
    MAGIC, MAX_BIT_DEPTH, VERSION,
};
use crate::lossless::{BlockCodec, Decoder, DecoderState};

/// where one block group lives in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupEntry {
    /// absolute offset of the group's first block header
    pub offset: u64,
    /// index of the group's first sample within each channel
    pub first_sample: u64,
    pub sample_count: u32,
}

/// Block groups of a stream, found by skipping payloads
#[derive(Debug, Clone, PartialEq)]
pub struct SeekIndex {
    pub groups: Vec<GroupEntry>,
    pub total_samples: u64,
    /// totals carried by the end marker
    pub end_marker: Trailer,
}

/// Reads an hlac stream with random access.
///
/// Only the header is parsed up front. The seek index is built on the first
/// call that needs it by walking block headers and skipping payloads.
pub struct StreamReader<R: Read + Seek> {
    source: R,
    header: StreamHeader,
    /// absolute offset of the first block
    data_start: u64,
    index: Option<SeekIndex>,
    decoder: Decoder,
}

impl<R: Read + Seek> StreamReader<R> {
    pub fn new(mut source: R) -> HlacResult<Self> {
        let header = read_header(&mut source)?;
        let data_start = source.stream_position()?;
        let decoder = Decoder::from_header(&header)?;

        Ok(StreamReader {
            source,
            header,
            data_start,
            index: None,
            decoder,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.header.metadata
    }

    pub fn num_channels(&self) -> usize {
        self.header.num_channels as usize
    }

    /// Samples per channel.
    ///
    /// Trusts the header trailer when it was patched and agrees with the end
    /// marker; otherwise counts the blocks.
    pub fn total_samples(&mut self) -> HlacResult<u64> {
        if let Some(index) = &self.index {
            return Ok(index.total_samples);
        }

        let trailer = self.header.trailer;
        if trailer.is_valid() {
            if let Some(marker) = self.peek_end_marker()? {
                if marker.total_samples == trailer.total_samples
                    && marker.compression_ratio.to_bits() == trailer.compression_ratio.to_bits()
                {
                    return Ok(trailer.total_samples);
                }
            }
            debug!("header trailer disagrees with end marker, counting blocks");
        } else {
            debug!("header trailer not patched, counting blocks");
        }

        Ok(self.index()?.total_samples)
    }

    /// number of blocks over all channels
    pub fn block_count(&mut self) -> HlacResult<usize> {
        let channels = self.num_channels();
        Ok(self.index()?.groups.len() * channels)
    }

    /// Seek index, built on first use.
    pub fn index(&mut self) -> HlacResult<&SeekIndex> {
        if self.index.is_none() {
            let index = self.build_index()?;
            self.index = Some(index);
        }
        self.index
            .as_ref()
            .ok_or_else(|| HlacError::CorruptStream("seek index unavailable".to_string()))
    }

    /// Up to `count` samples per channel starting at `start`. Empty past the
    /// end of the stream.
    ///
    /// A read that decodes the last group finishes the decoder; the next read
    /// rewinds it.
    pub fn read(&mut self, start: u64, count: usize) -> HlacResult<SampleBuffer> {
        self.index()?;
        let index = self
            .index
            .take()
            .ok_or_else(|| HlacError::CorruptStream("seek index unavailable".to_string()))?;
        let result = self.read_range(&index, start, count);
        self.index = Some(index);
        result
    }

    fn read_range(
        &mut self,
        index: &SeekIndex,
        start: u64,
        count: usize,
    ) -> HlacResult<SampleBuffer> {
        let channels = self.num_channels();
        let end = start.saturating_add(count as u64).min(index.total_samples);
        if start >= end {
            return Ok(SampleBuffer::silence(channels, 0));
        }
        if self.decoder.state() == DecoderState::Done {
            self.decoder.rewind();
        }

        let first = index
            .groups
            .partition_point(|g| g.first_sample + g.sample_count as u64 <= start);

        let mut out = SampleBuffer::silence(channels, 0);
        let mut decoded_from = None;
        let mut next = first;
        for entry in &index.groups[first..] {
            if entry.first_sample >= end {
                break;
            }
            let group = self.read_group(entry)?;
            let buffer = self.decoder.decode_group(&group)?;
            decoded_from.get_or_insert(entry.first_sample);
            out.append(&buffer)?;
            next += 1;
        }
        if next == index.groups.len() {
            self.decoder.finish();
        }

        let skip = (start - decoded_from.unwrap_or(start)) as usize;
        Ok(out.slice(skip, (end - start) as usize))
    }

    /// every sample of the stream
    pub fn read_all(&mut self) -> HlacResult<SampleBuffer> {
        let total = self.index()?.total_samples;
        self.read(0, total as usize)
    }

    /// samples per channel per second spent decoding
    pub fn decompression_throughput(&self) -> f64 {
        self.decoder.throughput()
    }

    pub fn realtime_factor(&self) -> f64 {
        self.decoder.realtime_factor()
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// the last bytes of the stream, if they look like an end marker
    fn peek_end_marker(&mut self) -> HlacResult<Option<Trailer>> {
        let len = self.source.seek(SeekFrom::End(0))?;
        if len < self.data_start + END_MARKER_SIZE as u64 {
            return Ok(None);
        }
        self.source.seek(SeekFrom::Start(len - END_MARKER_SIZE as u64))?;
        if read_u8(&mut self.source)? != END_MARKER_TAG {
            return Ok(None);
        }
        Ok(Some(read_trailer(&mut self.source)?))
    }

    fn build_index(&mut self) -> HlacResult<SeekIndex> {
        let len = self.source.seek(SeekFrom::End(0))?;
        self.source.seek(SeekFrom::Start(self.data_start))?;
        let channels = self.num_channels();

        let mut groups = Vec::new();
        let mut total = 0u64;
        loop {
            let offset = self.source.stream_position()?;
            let tag = read_u8(&mut self.source)?;
            if tag == END_MARKER_TAG {
                let end_marker = read_trailer(&mut self.source)?;
                if end_marker.total_samples != total {
                    return Err(HlacError::CorruptStream(format!(
                        "end marker counts {} samples, blocks hold {}",
                        end_marker.total_samples, total
                    )));
                }
                debug!(groups = groups.len(), total, "built seek index");
                return Ok(SeekIndex {
                    groups,
                    total_samples: total,
                    end_marker,
                });
            }

            let mut sample_count = 0;
            for ch in 0..channels {
                let tag = if ch == 0 { tag } else { read_u8(&mut self.source)? };
                if tag == END_MARKER_TAG {
                    return Err(HlacError::CorruptStream(format!(
                        "block group ends after {} of {} channels",
                        ch, channels
                    )));
                }
                let (block_header, payload_len) = read_block_header(tag, &mut self.source)?;
                if ch == 0 {
                    sample_count = block_header.sample_count;
                } else if block_header.sample_count != sample_count {
                    return Err(HlacError::CorruptStream(
                        "blocks of one group disagree on sample count".to_string(),
                    ));
                }

                let pos = self.source.stream_position()?;
                if pos + payload_len as u64 > len {
                    return Err(HlacError::CorruptStream(format!(
                        "block payload of {} bytes runs past the end",
                        payload_len
                    )));
                }
                self.source.seek(SeekFrom::Current(payload_len as i64))?;
            }

            groups.push(GroupEntry {
                offset,
                first_sample: total,
                sample_count,
            });
            total += sample_count as u64;
        }
    }

    fn read_group(&mut self, entry: &GroupEntry) -> HlacResult<Vec<CompressedBlock>> {
        self.source.seek(SeekFrom::Start(entry.offset))?;
        let mut group = Vec::with_capacity(self.num_channels());
        for _ in 0..self.num_channels() {
            let tag = read_u8(&mut self.source)?;
            let (mut block, payload_len) = read_block_header(tag, &mut self.source)?;
            block.payload = vec![0; payload_len as usize];
            self.source.read_exact(&mut block.payload)?;

            let expected = BlockCodec::payload_len(
                block.mode,
                block.bit_width,
                block.sample_count,
                block.cycle_length,
                &block.payload,
            )?;
            if expected != block.payload.len() {
                return Err(HlacError::CorruptStream(format!(
                    "{} payload is {} bytes, header implies {}",
                    block.mode.name(),
                    block.payload.len(),
                    expected
                )));
            }
            group.push(block);
        }
        Ok(group)
    }
}

/// Parse and validate a stream header.
pub fn read_header<R: Read>(source: &mut R) -> HlacResult<StreamHeader> {
    let mut magic = [0u8; 4];
    source.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(HlacError::CorruptStream("bad magic".to_string()));
    }

    let version = read_u16_le(source)?;
    if version != VERSION {
        return Err(HlacError::CorruptStream(format!(
            "unsupported version {}",
            version
        )));
    }

    let sample_rate = read_f64_le(source)?;
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(HlacError::CorruptStream(format!(
            "invalid sample rate {}",
            sample_rate
        )));
    }

    let num_channels = read_u16_le(source)?;
    if num_channels == 0 {
        return Err(HlacError::CorruptStream("zero channels".to_string()));
    }

    let bit_depth = read_u16_le(source)?;
    if bit_depth == 0 || bit_depth > MAX_BIT_DEPTH as u16 {
        return Err(HlacError::CorruptStream(format!(
            "bit depth {} outside 1..={}",
            bit_depth, MAX_BIT_DEPTH
        )));
    }

    let dc_offsets = match read_u8(source)? {
        0 => None,
        1 => {
            let mut offsets = Vec::with_capacity(num_channels as usize);
            for _ in 0..num_channels {
                offsets.push(read_i32_le(source)?);
            }
            Some(offsets)
        }
        flag => {
            return Err(HlacError::CorruptStream(format!(
                "invalid dc offset flag {}",
                flag
            )))
        }
    };

    let metadata_len = read_u32_le(source)? as usize;
    if metadata_len > MAX_METADATA_BYTES {
        return Err(HlacError::CorruptStream(format!(
            "metadata block of {} bytes",
            metadata_len
        )));
    }
    let mut metadata = vec![0u8; metadata_len];
    source.read_exact(&mut metadata)?;
    let metadata = decode_metadata(&metadata)?;

    let trailer = read_trailer(source)?;

    Ok(StreamHeader {
        version,
        sample_rate,
        num_channels,
        bit_depth: bit_depth as u8,
        dc_offsets,
        metadata,
        trailer,
    })
}

/// The rest of a block header after its tag, payload left unread.
fn read_block_header<R: Read>(tag: u8, source: &mut R) -> HlacResult<(CompressedBlock, u32)> {
    let mode = BlockMode::try_from(tag)?;
    let mut bytes = [0u8; BLOCK_HEADER_SIZE - 1];
    source.read_exact(&mut bytes)?;

    let bit_width = bytes[0];
    let sample_count = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    let cycle_length = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
    let payload_len = u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);
    validate_block_header(mode, bit_width, sample_count, cycle_length)?;

    Ok((
        CompressedBlock {
            mode,
            bit_width,
            sample_count,
            cycle_length,
            payload: Vec::new(),
        },
        payload_len,
    ))
}

fn read_trailer<R: Read>(source: &mut R) -> HlacResult<Trailer> {
    Ok(Trailer {
        total_samples: read_u64_le(source)?,
        compression_ratio: f32::from_le_bytes(read_array(source)?),
    })
}

// little endian helpers

fn read_array<R: Read, const N: usize>(source: &mut R) -> HlacResult<[u8; N]> {
    let mut bytes = [0u8; N];
    source.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn read_u8<R: Read>(source: &mut R) -> HlacResult<u8> {
    Ok(read_array::<R, 1>(source)?[0])
}

fn read_u16_le<R: Read>(source: &mut R) -> HlacResult<u16> {
    Ok(u16::from_le_bytes(read_array(source)?))
}

fn read_u32_le<R: Read>(source: &mut R) -> HlacResult<u32> {
    Ok(u32::from_le_bytes(read_array(source)?))
}

fn read_i32_le<R: Read>(source: &mut R) -> HlacResult<i32> {
    Ok(i32::from_le_bytes(read_array(source)?))
}

fn read_u64_le<R: Read>(source: &mut R) -> HlacResult<u64> {
    Ok(u64::from_le_bytes(read_array(source)?))
}

fn read_f64_le<R: Read>(source: &mut R) -> HlacResult<f64> {
    Ok(f64::from_le_bytes(read_array(source)?))
}
