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
use std::{error::Error, io::Cursor};

use hound::{SampleFormat, WavSpec, WavWriter};

/// Encodes the given channels as a 16 bit WAV file held in memory. Channels are
/// truncated to the shortest.
pub fn wav_bytes(channels: &[Vec<i16>], sample_rate: u32) -> Result<Vec<u8>, Box<dyn Error>> {
    let channel_count = u16::try_from(channels.len())?;
    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(
            &mut cursor,
            WavSpec {
                channels: channel_count,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        )?;

        // WAV data is interleaved.
        for frame in 0..frames {
            for channel in channels {
                writer.write_sample(channel[frame])?;
            }
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
