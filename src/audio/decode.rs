// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decoding of raw sample bytes into playable buffers.

use std::io::Cursor;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use super::AudioBuffer;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("no audio track found")]
    NoTrack,

    #[error("sample rate not specified")]
    UnknownSampleRate,

    #[error("no audio decoded")]
    Empty,

    #[error("audio format error: {0}")]
    Format(#[from] SymphoniaError),

    #[error("unable to create resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

/// Turns raw sample bytes into a playable buffer. Decoding is CPU bound and is run on the
/// blocking pool by the sample loader.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: Vec<u8>) -> Result<AudioBuffer, DecodeError>;
}

/// Decodes any format symphonia can probe (WAV, FLAC, MP3, Ogg, ...) and converts the
/// result to the output sample rate.
#[derive(Clone, Debug)]
pub struct SymphoniaDecoder {
    /// The sample rate of the output device, if buffers should be converted to it.
    target_sample_rate: Option<u32>,
}

impl SymphoniaDecoder {
    pub fn new(target_sample_rate: Option<u32>) -> SymphoniaDecoder {
        SymphoniaDecoder { target_sample_rate }
    }
}

impl Decoder for SymphoniaDecoder {
    fn decode(&self, bytes: Vec<u8>) -> Result<AudioBuffer, DecodeError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let probed = get_probe().format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoTrack)?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .filter(|rate| *rate > 0)
            .ok_or(DecodeError::UnknownSampleRate)?;

        let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let mut interleaved: Vec<f32> = Vec::new();
        let mut channel_count: u16 = 0;
        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    channel_count = spec.channels.count() as u16;
                    let mut sample_buffer =
                        SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    sample_buffer.copy_interleaved_ref(decoded);
                    interleaved.extend_from_slice(sample_buffer.samples());
                }
                // Corrupt packets are skipped rather than failing the whole sample.
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(err = e, "Skipping undecodable packet");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if channel_count == 0 || interleaved.is_empty() {
            return Err(DecodeError::Empty);
        }

        let buffer = AudioBuffer::from_interleaved(&interleaved, channel_count, sample_rate);
        debug!(
            channels = channel_count,
            sample_rate,
            frames = buffer.frames(),
            "Decoded sample"
        );

        match self.target_sample_rate {
            Some(target) if target != sample_rate && target > 0 => resample(&buffer, target),
            _ => Ok(buffer),
        }
    }
}

/// Converts a whole buffer to the target sample rate. The output holds exactly
/// `frames * target / source` frames (rounded), with the resampler delay trimmed off.
fn resample(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer, DecodeError> {
    let source_rate = buffer.sample_rate();
    let channel_count = buffer.channel_count() as usize;
    let frames = buffer.frames();
    let input: Vec<&[f32]> = (0..channel_count)
        .filter_map(|channel| buffer.channel(channel))
        .collect();

    let sinc_params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        target_rate as f64 / source_rate as f64,
        1.0,
        sinc_params,
        INPUT_BLOCK_SIZE,
        channel_count,
    )?;

    let expected = ((frames as u64 * target_rate as u64 + source_rate as u64 / 2)
        / source_rate as u64) as usize;
    let delay = resampler.output_delay();
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channel_count];

    let mut position = 0;
    while frames - position >= resampler.input_frames_next() {
        let next = position + resampler.input_frames_next();
        let block: Vec<&[f32]> = input.iter().map(|channel| &channel[position..next]).collect();
        append(&mut output, resampler.process(&block, None)?);
        position = next;
    }
    if position < frames {
        let block: Vec<&[f32]> = input.iter().map(|channel| &channel[position..]).collect();
        append(&mut output, resampler.process_partial(Some(&block), None)?);
    }

    // Flush the samples still held back by the filter delay.
    while output.first().map(Vec::len).unwrap_or(0) < expected + delay {
        let chunk = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
        if chunk.first().is_none_or(Vec::is_empty) {
            break;
        }
        append(&mut output, chunk);
    }

    let channels = output
        .into_iter()
        .map(|mut channel| {
            channel.drain(..delay.min(channel.len()));
            channel.resize(expected, 0.0);
            channel
        })
        .collect();

    debug!(
        source_rate,
        target_rate,
        frames = expected,
        "Resampled sample"
    );
    Ok(AudioBuffer::new(channels, target_rate))
}

fn append(output: &mut [Vec<f32>], chunk: Vec<Vec<f32>>) {
    for (channel, samples) in output.iter_mut().zip(chunk) {
        channel.extend(samples);
    }
}
