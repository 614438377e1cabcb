//! The codec seam and its LAME implementation.

use std::ffi::CStr;
use std::fmt;

use log::debug;
use mp3lame_encoder::{Bitrate, Builder, DualPcm, FlushNoGap, MonoPcm, Quality};

use crate::container::{ContainerHeader, SampleBuffer};
use crate::Error;

/// File extension of the encoded output.
pub const MP3_EXTENSION: &str = "mp3";

/// LAME algorithm quality, `0` being best and slowest.
pub const DEFAULT_QUALITY: u8 = 3;

/// Constant bitrate in kilobits per second.
pub const DEFAULT_BITRATE_KBPS: u32 = 192;

/// Bitrates, in kbps, that LAME can be asked for.
pub const SUPPORTED_BITRATES: [u32; 16] = [
    8, 16, 24, 32, 40, 48, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];

// Upper bound on what a flush can emit, per the LAME documentation.
const FLUSH_BUFFER_LEN: usize = 7_200;

/// Errors reported by an [`Encoder`].
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The codec refused the stream parameters.
    #[error("encoder rejected the stream parameters: {0}")]
    Parameters(String),

    /// The codec failed while encoding or flushing.
    #[error("encoder failed: {0}")]
    Encode(String),

    /// The codec accepted the samples but produced nothing.
    #[error("encoder produced no data")]
    Empty,
}

/// Converts decoded samples into the bytes of an output file.
///
/// Implementations are shared by every worker of a run, hence `Sync`.
pub trait Encoder: Sync {
    /// Extension substituted into the input path to name the output file.
    fn extension(&self) -> &str;

    fn encode(
        &self,
        header: &ContainerHeader,
        samples: &SampleBuffer,
    ) -> Result<Vec<u8>, EncodeError>;
}

/// Quality and bitrate handed to LAME for every file of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncoderSettings {
    quality: u8,
    bitrate_kbps: u32,
}

impl EncoderSettings {
    pub fn new(quality: u8, bitrate_kbps: u32) -> Result<Self, Error> {
        if quality_preset(quality).is_none() {
            return Err(Error::InvalidQuality(quality));
        }
        if bitrate_preset(bitrate_kbps).is_none() {
            return Err(Error::UnsupportedBitrate(bitrate_kbps));
        }
        Ok(Self {
            quality,
            bitrate_kbps,
        })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
        }
    }
}

/// MP3 encoder backed by LAME.
///
/// A fresh LAME context is built for every file, so one instance can serve
/// all workers concurrently.
#[derive(Clone, Debug, Default)]
pub struct LameEncoder {
    settings: EncoderSettings,
}

impl LameEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> EncoderSettings {
        self.settings
    }

    fn build(&self, header: &ContainerHeader) -> Result<mp3lame_encoder::Encoder, EncodeError> {
        let channels = u8::try_from(header.channels)
            .map_err(|_| EncodeError::Parameters(format!("{} channels", header.channels)))?;
        // Both presets were checked when the settings were built.
        let bitrate = bitrate_preset(self.settings.bitrate_kbps).unwrap_or(Bitrate::Kbps192);
        let quality = quality_preset(self.settings.quality).unwrap_or(Quality::VeryNice);

        let mut builder = Builder::new()
            .ok_or_else(|| EncodeError::Parameters("failed to allocate LAME context".into()))?;
        builder.set_num_channels(channels).map_err(parameters)?;
        builder
            .set_sample_rate(header.sample_rate)
            .map_err(parameters)?;
        builder.set_brate(bitrate).map_err(parameters)?;
        builder.set_quality(quality).map_err(parameters)?;
        // CBR output, the Xing/Info frame would stay an unfilled placeholder.
        builder.set_to_write_vbr_tag(false).map_err(parameters)?;
        builder.build().map_err(parameters)
    }
}

impl Encoder for LameEncoder {
    fn extension(&self) -> &str {
        MP3_EXTENSION
    }

    fn encode(
        &self,
        header: &ContainerHeader,
        samples: &SampleBuffer,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut lame = self.build(header)?;

        let mut output = Vec::new();
        output.reserve(mp3lame_encoder::max_required_buffer_size(
            samples.frames() * samples.channels(),
        ));
        let encoded = match samples.right() {
            Some(right) => lame.encode_to_vec(
                DualPcm {
                    left: samples.left(),
                    right,
                },
                &mut output,
            ),
            None => lame.encode_to_vec(MonoPcm(samples.left()), &mut output),
        }
        .map_err(failed)?;

        output.reserve(FLUSH_BUFFER_LEN);
        let flushed = lame.flush_to_vec::<FlushNoGap>(&mut output).map_err(failed)?;

        if encoded + flushed == 0 {
            return Err(EncodeError::Empty);
        }
        debug!(
            "encoded {} frame(s) into {} bytes",
            samples.frames(),
            encoded + flushed
        );
        Ok(output)
    }
}

/// Version string of the linked LAME library.
pub fn lame_version() -> String {
    // SAFETY: LAME returns a pointer to a static NUL-terminated string.
    let version = unsafe { mp3lame_sys::get_lame_version() };
    if version.is_null() {
        return String::from("unknown");
    }
    // SAFETY: checked for null above; the string lives for the whole program.
    unsafe { CStr::from_ptr(version) }
        .to_string_lossy()
        .into_owned()
}

fn parameters<E: fmt::Debug>(err: E) -> EncodeError {
    EncodeError::Parameters(format!("{err:?}"))
}

fn failed<E: fmt::Debug>(err: E) -> EncodeError {
    EncodeError::Encode(format!("{err:?}"))
}

fn quality_preset(quality: u8) -> Option<Quality> {
    let preset = match quality {
        0 => Quality::Best,
        1 => Quality::SecondBest,
        2 => Quality::NearBest,
        3 => Quality::VeryNice,
        4 => Quality::Nice,
        5 => Quality::Good,
        6 => Quality::Decent,
        7 => Quality::Ok,
        8 => Quality::SecondWorst,
        9 => Quality::Worst,
        _ => return None,
    };
    Some(preset)
}

fn bitrate_preset(kbps: u32) -> Option<Bitrate> {
    let preset = match kbps {
        8 => Bitrate::Kbps8,
        16 => Bitrate::Kbps16,
        24 => Bitrate::Kbps24,
        32 => Bitrate::Kbps32,
        40 => Bitrate::Kbps40,
        48 => Bitrate::Kbps48,
        64 => Bitrate::Kbps64,
        80 => Bitrate::Kbps80,
        96 => Bitrate::Kbps96,
        112 => Bitrate::Kbps112,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        224 => Bitrate::Kbps224,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        _ => return None,
    };
    Some(preset)
}
