use crate::{
    audio::clip::BitDepth,
    error::{ImportError, WriteError},
};
use flacenc::{component::BitRepr, error::Verify};
use std::{fs::File, io, path::Path};
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use tracing::debug;

pub const FLAC_EXTENSION: &str = "FLAC";
pub const WAV_EXTENSION: &str = "wav";

#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
    pub bit_depth: Option<u32>,
}

impl DecodedAudio {
    pub fn num_frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }
}

/// Decodes a whole file to interleaved `f32` at its native rate.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, ImportError> {
    let file = File::open(path).map_err(|source| ImportError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|source| ImportError::Probe {
            path: path.to_path_buf(),
            source,
        })?;
    let mut format = probed.format;
    let track = format.default_track().ok_or_else(|| ImportError::NoTrack {
        path: path.to_path_buf(),
    })?;
    let track_id = track.id;
    let bit_depth = track.codec_params.bits_per_sample;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|source| ImportError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1usize)
        .max(1);
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(48_000u32);
    let mut samples = Vec::<f32>::with_capacity(
        track
            .codec_params
            .n_frames
            .map(|n| n as usize * channels)
            .unwrap_or_default(),
    );

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(source) => {
                return Err(ImportError::Decode {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping corrupt packet in '{}': {e}", path.display());
                continue;
            }
            Err(source) => {
                return Err(ImportError::Decode {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let spec = *decoded.spec();
        channels = spec.channels.count().max(1);
        sample_rate = spec.rate;
        let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buffer.samples());
    }

    if samples.is_empty() {
        return Err(ImportError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(DecodedAudio {
        samples,
        channels,
        sample_rate,
        bit_depth,
    })
}

fn quantize(sample: f32, bits: u32) -> i32 {
    let scale = (1_i64 << (bits - 1)) as f64;
    let max = scale - 1.0;
    (f64::from(sample) * scale).round().clamp(-scale, max) as i32
}

/// Encodes interleaved samples as FLAC at the given integer bit depth.
pub fn write_flac(
    path: &Path,
    samples: &[f32],
    channels: usize,
    sample_rate: u32,
    bit_depth: BitDepth,
) -> Result<(), WriteError> {
    let encode_error = |reason: String| WriteError::Encode {
        path: path.to_path_buf(),
        reason,
    };
    let bits = bit_depth.bits();
    let ints: Vec<i32> = samples.iter().map(|s| quantize(*s, bits)).collect();
    let config = flacenc::config::Encoder::default()
        .into_verified()
        .map_err(|(_, e)| encode_error(format!("invalid encoder config: {e:?}")))?;
    let source = flacenc::source::MemSource::from_samples(
        &ints,
        channels,
        bits as usize,
        sample_rate as usize,
    );
    let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
        .map_err(|e| encode_error(format!("{e:?}")))?;
    let mut sink = flacenc::bitsink::ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|e| encode_error(format!("{e:?}")))?;
    std::fs::write(path, sink.as_slice()).map_err(|source| WriteError::io(path, source))
}

fn hound_error(path: &Path, error: hound::Error) -> WriteError {
    match error {
        hound::Error::IoError(source) => WriteError::io(path, source),
        other => WriteError::Encode {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// Writes 32-bit float WAV. With `append` the samples are added to the end
/// of the existing file instead of replacing it.
pub fn write_wav(
    path: &Path,
    samples: &[f32],
    channels: usize,
    sample_rate: u32,
    append: bool,
) -> Result<(), WriteError> {
    let writer = if append && path.exists() {
        hound::WavWriter::append(path)
    } else {
        let spec = hound::WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        hound::WavWriter::create(path, spec)
    };
    let mut writer = writer.map_err(|e| hound_error(path, e))?;
    for sample in samples {
        writer
            .write_sample(*sample)
            .map_err(|e| hound_error(path, e))?;
    }
    writer.finalize().map_err(|e| hound_error(path, e))
}
