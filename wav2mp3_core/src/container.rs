//! RIFF/WAVE container parsing.
//!
//! Decoding happens in two phases. [`parse_header`] validates the prelude and
//! the `fmt ` chunk and locates the `data` chunk without touching the sample
//! payload. [`decode_samples`] then reads the payload into per-channel
//! buffers. Files that are malformed or unsupported are rejected before any
//! sample buffer is allocated.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, warn};
use thiserror::Error;

use crate::FailureClass;

/// Format tag of linear PCM in the `fmt ` chunk.
pub const FORMAT_PCM: u16 = 1;

const RIFF_ID: [u8; 4] = *b"RIFF";
const WAVE_ID: [u8; 4] = *b"WAVE";
const FMT_ID: [u8; 4] = *b"fmt ";
const DATA_ID: [u8; 4] = *b"data";

const PRELUDE_LEN: usize = 12;
const FMT_CHUNK_LEN: u32 = 16;
const BYTES_PER_SAMPLE: u16 = 2;

/// Errors raised while validating or decoding a container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The file does not start with `RIFF`, a non-zero length and `WAVE`.
    #[error("missing or malformed RIFF/WAVE prelude")]
    BadPrelude,

    /// The chunk list ended before a `fmt ` chunk was found.
    #[error("no 'fmt ' chunk found")]
    MissingFormatChunk,

    /// The chunk list ended after the `fmt ` chunk without a `data` chunk.
    #[error("no 'data' chunk found after the 'fmt ' chunk")]
    MissingDataChunk,

    /// The `fmt ` chunk is too short to describe a PCM stream.
    #[error("'fmt ' chunk is {0} bytes long, expected at least 16")]
    FormatChunkTooShort(u32),

    /// The stream ended inside the `fmt ` chunk.
    #[error("container is truncated inside the 'fmt ' chunk")]
    TruncatedFormatChunk,

    /// The block alignment cannot hold one 16-bit sample per channel.
    #[error("block alignment of {block_align} bytes cannot hold {channels} 16-bit sample(s)")]
    InvalidBlockAlign { block_align: u16, channels: u16 },

    /// The format tag is not linear PCM.
    #[error("unsupported non-PCM format tag {0:#06x}")]
    UnsupportedFormatTag(u16),

    /// Only mono and stereo streams are handled.
    #[error("unsupported channel count {0} (only mono or stereo)")]
    UnsupportedChannelCount(u16),

    /// Only 16-bit samples are handled.
    #[error("unsupported bit depth {0} (only 16-bit samples)")]
    UnsupportedBitDepth(u16),

    /// Reading from the underlying stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ContainerError {
    /// Failure class used when reporting a skipped file.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::BadPrelude
            | Self::MissingFormatChunk
            | Self::MissingDataChunk
            | Self::FormatChunkTooShort(_)
            | Self::TruncatedFormatChunk
            | Self::InvalidBlockAlign { .. } => FailureClass::Format,
            Self::UnsupportedFormatTag(_)
            | Self::UnsupportedChannelCount(_)
            | Self::UnsupportedBitDepth(_) => FailureClass::UnsupportedFormat,
            Self::Io(_) => FailureClass::Io,
        }
    }
}

/// Stream description carried by the `fmt ` chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerHeader {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    /// Bytes per sample frame across all channels.
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl ContainerHeader {
    /// Whether the stream carries a right channel.
    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }

    /// Block alignment implied by the bit depth and channel count.
    pub fn expected_block_align(&self) -> u32 {
        u32::from(self.bits_per_sample) * u32::from(self.channels) / 8
    }

    fn check_layout(&self) -> Result<(), ContainerError> {
        if !matches!(self.channels, 1 | 2) {
            return Err(ContainerError::UnsupportedChannelCount(self.channels));
        }
        if self.block_align < BYTES_PER_SAMPLE * self.channels {
            return Err(ContainerError::InvalidBlockAlign {
                block_align: self.block_align,
                channels: self.channels,
            });
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ContainerError> {
        if self.format_tag != FORMAT_PCM {
            return Err(ContainerError::UnsupportedFormatTag(self.format_tag));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(ContainerError::UnsupportedChannelCount(self.channels));
        }
        if self.bits_per_sample != 16 {
            return Err(ContainerError::UnsupportedBitDepth(self.bits_per_sample));
        }
        self.check_layout()?;

        if u32::from(self.block_align) != self.expected_block_align() {
            warn!(
                "'fmt ' declares a block alignment of {} bytes but {} bit x {} channel(s) implies {}",
                self.block_align,
                self.bits_per_sample,
                self.channels,
                self.expected_block_align()
            );
        }
        Ok(())
    }
}

/// Location of the sample payload inside the container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataChunk {
    /// Absolute offset of the first payload byte.
    pub offset: u64,
    /// Declared payload length in bytes.
    pub len: u32,
}

/// Decoded 16-bit samples, one buffer per channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleBuffer {
    left: Vec<i16>,
    right: Option<Vec<i16>>,
}

impl SampleBuffer {
    /// Split interleaved frames into channel buffers.
    ///
    /// Each channel occupies `block_align / channels` bytes of a frame and its
    /// sample is read from the first two of them. A trailing partial frame is
    /// ignored.
    fn deinterleave(header: &ContainerHeader, payload: &[u8]) -> Self {
        let block_align = usize::from(header.block_align);
        let slot = block_align / usize::from(header.channels);
        let frames = payload.len() / block_align;

        let mut left = Vec::with_capacity(frames);
        let mut right = header.is_stereo().then(|| Vec::with_capacity(frames));

        for frame in payload.chunks_exact(block_align) {
            left.push(i16::from_le_bytes([frame[0], frame[1]]));
            if let Some(right) = right.as_mut() {
                right.push(i16::from_le_bytes([frame[slot], frame[slot + 1]]));
            }
        }

        Self { left, right }
    }

    /// Left channel, or the only channel of a mono stream.
    pub fn left(&self) -> &[i16] {
        &self.left
    }

    /// Right channel of a stereo stream.
    pub fn right(&self) -> Option<&[i16]> {
        self.right.as_deref()
    }

    pub fn channels(&self) -> usize {
        if self.right.is_some() {
            2
        } else {
            1
        }
    }

    /// Number of sample frames.
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Validate the container and locate its sample payload.
///
/// The stream is rewound first. Unrecognised chunks are skipped. The first
/// `fmt ` chunk wins, and the first `data` chunk following it wins.
pub fn parse_header<R: Read + Seek>(
    stream: &mut R,
) -> Result<(ContainerHeader, DataChunk), ContainerError> {
    stream.seek(SeekFrom::Start(0))?;
    read_prelude(stream)?;

    let header = loop {
        let Some((id, size)) = read_chunk_header(stream)? else {
            return Err(ContainerError::MissingFormatChunk);
        };
        if id == FMT_ID {
            break read_format_chunk(stream, size)?;
        }
        skip_chunk(stream, &id, size)?;
    };
    header.validate()?;

    let data = loop {
        let Some((id, size)) = read_chunk_header(stream)? else {
            return Err(ContainerError::MissingDataChunk);
        };
        if id == DATA_ID {
            break DataChunk {
                offset: stream.stream_position()?,
                len: size,
            };
        }
        skip_chunk(stream, &id, size)?;
    };

    debug!(
        "{} channel(s) at {} Hz, {} payload bytes at offset {}",
        header.channels, header.sample_rate, data.len, data.offset
    );
    Ok((header, data))
}

/// Read the payload located by [`parse_header`] into channel buffers.
///
/// If the stream ends before the declared payload length, the whole frames
/// that are available are decoded.
pub fn decode_samples<R: Read + Seek>(
    stream: &mut R,
    header: &ContainerHeader,
    data: &DataChunk,
) -> Result<SampleBuffer, ContainerError> {
    header.check_layout()?;

    stream.seek(SeekFrom::Start(data.offset))?;
    let mut payload = Vec::new();
    stream
        .by_ref()
        .take(u64::from(data.len))
        .read_to_end(&mut payload)?;

    if payload.len() < data.len as usize {
        warn!(
            "'data' chunk declares {} bytes but only {} are present",
            data.len,
            payload.len()
        );
    }

    Ok(SampleBuffer::deinterleave(header, &payload))
}

/// Open `path` and run both decoding phases.
pub fn read_container(path: &Path) -> Result<(ContainerHeader, SampleBuffer), ContainerError> {
    let mut reader = BufReader::new(File::open(path)?);
    let (header, data) = parse_header(&mut reader)?;
    let samples = decode_samples(&mut reader, &header, &data)?;
    Ok((header, samples))
}

fn read_prelude<R: Read>(stream: &mut R) -> Result<(), ContainerError> {
    let mut prelude = [0u8; PRELUDE_LEN];
    match stream.read_exact(&mut prelude) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
            return Err(ContainerError::BadPrelude)
        }
        Err(err) => return Err(err.into()),
    }

    let riff_len = u32_at(&prelude, 4);
    if prelude[0..4] != RIFF_ID || prelude[8..12] != WAVE_ID || riff_len == 0 {
        return Err(ContainerError::BadPrelude);
    }
    Ok(())
}

/// Read an 8-byte chunk header, or `None` at the end of the stream.
fn read_chunk_header<R: Read>(stream: &mut R) -> Result<Option<([u8; 4], u32)>, ContainerError> {
    let mut raw = [0u8; 8];
    match stream.read_exact(&mut raw) {
        Ok(()) => Ok(Some(([raw[0], raw[1], raw[2], raw[3]], u32_at(&raw, 4)))),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn read_format_chunk<R: Read + Seek>(
    stream: &mut R,
    size: u32,
) -> Result<ContainerHeader, ContainerError> {
    if size < FMT_CHUNK_LEN {
        return Err(ContainerError::FormatChunkTooShort(size));
    }

    let mut raw = [0u8; FMT_CHUNK_LEN as usize];
    match stream.read_exact(&mut raw) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
            return Err(ContainerError::TruncatedFormatChunk)
        }
        Err(err) => return Err(err.into()),
    }

    if size != FMT_CHUNK_LEN {
        warn!("'fmt ' chunk is {size} bytes long, ignoring everything past byte 16");
        skip_bytes(stream, size - FMT_CHUNK_LEN)?;
    }

    Ok(ContainerHeader {
        format_tag: u16_at(&raw, 0),
        channels: u16_at(&raw, 2),
        sample_rate: u32_at(&raw, 4),
        byte_rate: u32_at(&raw, 8),
        block_align: u16_at(&raw, 12),
        bits_per_sample: u16_at(&raw, 14),
    })
}

fn skip_chunk<R: Read + Seek>(stream: &mut R, id: &[u8; 4], size: u32) -> Result<(), ContainerError> {
    debug!(
        "skipping '{}' chunk of {size} bytes",
        String::from_utf8_lossy(id)
    );
    skip_bytes(stream, size)
}

/// Seek past the declared `len` bytes.
///
/// After an odd length a NUL byte is taken as RIFF padding and consumed too.
/// Chunk ids never start with NUL, so writers that omit the pad still parse.
fn skip_bytes<R: Read + Seek>(stream: &mut R, len: u32) -> Result<(), ContainerError> {
    stream.seek(SeekFrom::Current(i64::from(len)))?;
    if len % 2 == 1 {
        let mut pad = [0u8; 1];
        match stream.read(&mut pad)? {
            1 if pad[0] != 0 => {
                stream.seek(SeekFrom::Current(-1))?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
