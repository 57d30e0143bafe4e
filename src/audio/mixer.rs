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
// Core voice mixing logic that can be used by both CPAL and test implementations
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{AudioBuffer, DeviceError, PlaybackCommand, VoiceHandle};
use crate::playsync::CancelHandle;

/// Global atomic counter for generating unique voice IDs
static VOICE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Returns a new device-unique voice ID.
pub(crate) fn next_voice_id() -> u64 {
    VOICE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Checks that a command describes a playable voice.
pub(crate) fn validate(command: &PlaybackCommand) -> Result<(), DeviceError> {
    let valid = |seconds: f64| seconds.is_finite() && seconds >= 0.0;

    if !valid(command.start_time) {
        return Err(DeviceError::InvalidCommand(format!(
            "start time {} is not a valid device time",
            command.start_time
        )));
    }
    if !valid(command.start_offset)
        || !command.duration.is_none_or(valid)
        || !valid(command.loop_start)
        || !command.loop_end.is_none_or(valid)
    {
        return Err(DeviceError::InvalidCommand(
            "offsets, durations and loop bounds must be finite and non-negative".to_string(),
        ));
    }
    Ok(())
}

/// Converts seconds to a frame index at the given rate.
fn to_frames(seconds: f64, rate: u32) -> u64 {
    (seconds * rate as f64).round() as u64
}

/// Renders scheduled voices into interleaved output. The mixer's clock is the number of
/// frames it has rendered, so device time only advances as audio is actually produced.
#[derive(Clone)]
pub struct Mixer {
    /// Voices waiting to start or currently sounding.
    voices: Arc<Mutex<Vec<Voice>>>,
    /// Frames rendered so far.
    clock: Arc<AtomicU64>,
    /// Output sample rate.
    sample_rate: u32,
}

/// A submitted playback command, positioned in device frames.
struct Voice {
    id: u64,
    buffer: Arc<AudioBuffer>,
    /// The device frame the voice starts sounding at.
    start_frame: u64,
    /// The device frame the voice stops at, if bounded.
    end_frame: Option<u64>,
    /// Read position in buffer frames.
    position: usize,
    /// Loop region in buffer frames.
    loop_region: Option<(usize, usize)>,
    cancel_handle: CancelHandle,
}

impl Voice {
    /// Mixes this voice into the output block beginning at device frame `base_frame`.
    /// Returns false once the voice has finished.
    fn render(&mut self, output: &mut [f32], channels: usize, base_frame: u64) -> bool {
        let buffer_channels = self.buffer.channel_count() as usize;
        let buffer_frames = self.buffer.frames();

        for (offset, frame) in output.chunks_exact_mut(channels).enumerate() {
            let device_frame = base_frame + offset as u64;
            if device_frame < self.start_frame {
                continue;
            }
            if self.end_frame.is_some_and(|end| device_frame >= end) {
                return false;
            }

            match self.loop_region {
                Some((loop_start, loop_end)) if self.position >= loop_end => {
                    self.position = loop_start;
                }
                None if self.position >= buffer_frames => return false,
                _ => {}
            }

            for (channel, out) in frame.iter_mut().enumerate() {
                let source_channel = if buffer_channels == 1 { 0 } else { channel };
                if let Some(sample) = self
                    .buffer
                    .channel(source_channel)
                    .and_then(|data| data.get(self.position))
                {
                    *out += *sample;
                }
            }
            self.position += 1;
        }

        true
    }
}

impl Mixer {
    /// Creates a new mixer.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            voices: Arc::new(Mutex::new(Vec::new())),
            clock: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The mixer clock in seconds.
    pub fn now(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    /// The number of voices that are waiting or sounding.
    pub fn active_voices(&self) -> usize {
        self.voices.lock().len()
    }

    /// Adds a voice for the given command and returns its handle. The buffer must already
    /// be at the mixer's sample rate.
    pub fn submit(&self, command: PlaybackCommand) -> Result<VoiceHandle, DeviceError> {
        validate(&command)?;
        if command.buffer.sample_rate() != self.sample_rate {
            return Err(DeviceError::InvalidCommand(format!(
                "buffer sample rate {} does not match the output rate {}",
                command.buffer.sample_rate(),
                self.sample_rate
            )));
        }

        let rate = self.sample_rate;
        let buffer_frames = command.buffer.frames();

        // The end is rounded from the absolute end time so that a voice chained onto this
        // one starts on exactly the frame this one stops at.
        let start_frame = to_frames(command.start_time, rate);
        let end_frame = command
            .duration
            .map(|duration| to_frames(command.start_time + duration, rate));

        let loop_region = if command.looping {
            let loop_end = command
                .loop_end
                .map(|end| (to_frames(end, rate) as usize).min(buffer_frames))
                .unwrap_or(buffer_frames);
            let loop_start = to_frames(command.loop_start, rate) as usize;
            // An empty region loops the whole buffer.
            if loop_end > loop_start {
                Some((loop_start, loop_end))
            } else {
                Some((0, buffer_frames))
            }
        } else {
            None
        };

        // An empty buffer can never produce sound.
        let loop_region = loop_region.filter(|(start, end)| end > start);

        let id = next_voice_id();
        let cancel_handle = CancelHandle::new();
        let voice = Voice {
            id,
            position: to_frames(command.start_offset, rate) as usize,
            buffer: command.buffer,
            start_frame,
            end_frame,
            loop_region,
            cancel_handle: cancel_handle.clone(),
        };

        self.voices.lock().push(voice);
        Ok(VoiceHandle::new(id, cancel_handle))
    }

    /// Renders the next block of interleaved output and advances the clock.
    pub fn render(&self, output: &mut [f32], channels: usize) {
        output.fill(0.0);
        if channels == 0 {
            return;
        }

        let base_frame = self.clock.load(Ordering::Acquire);
        {
            let mut voices = self.voices.lock();
            voices.retain_mut(|voice| {
                !voice.cancel_handle.is_cancelled() && voice.render(output, channels, base_frame)
            });
        }

        let frames = (output.len() / channels) as u64;
        self.clock.fetch_add(frames, Ordering::Release);
    }

    /// Removes every voice. Used when the output shuts down.
    pub fn clear(&self) {
        let mut voices = self.voices.lock();
        voices.iter().for_each(|voice| {
            voice.cancel_handle.cancel();
        });
        voices.clear();
    }

    /// Returns true if the voice with the given ID is still waiting or sounding.
    pub fn has_voice(&self, id: u64) -> bool {
        self.voices.lock().iter().any(|voice| voice.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A mono buffer at the mixer rate whose sample value at frame n is n + 1.
    fn ramp(frames: usize) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::new(
            vec![(1..=frames).map(|n| n as f32).collect()],
            100,
        ))
    }

    fn render_frames(mixer: &Mixer, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0; frames];
        mixer.render(&mut output, 1);
        output
    }

    #[test]
    fn test_clock_advances_with_rendering() {
        let mixer = Mixer::new(100);
        assert_eq!(mixer.now(), 0.0);

        let mut output = vec![0.0; 100];
        mixer.render(&mut output, 2);
        assert_eq!(mixer.now(), 0.5);
    }

    #[test]
    fn test_voice_waits_for_start_time() {
        let mixer = Mixer::new(100);
        mixer
            .submit(PlaybackCommand::one_shot(ramp(4), 0.02))
            .expect("submit should succeed");

        let output = render_frames(&mixer, 6);
        assert_eq!(output, vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0]);

        // The voice is done once the buffer is exhausted.
        render_frames(&mixer, 1);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_offset_and_duration() {
        let mixer = Mixer::new(100);
        let command = PlaybackCommand {
            start_offset: 0.02,
            duration: Some(0.03),
            ..PlaybackCommand::one_shot(ramp(10), 0.0)
        };
        mixer.submit(command).expect("submit should succeed");

        let output = render_frames(&mixer, 6);
        assert_eq!(output, vec![3.0, 4.0, 5.0, 0.0, 0.0, 0.0]);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_looping_region() {
        let mixer = Mixer::new(100);
        let command = PlaybackCommand {
            start_offset: 0.01,
            looping: true,
            loop_start: 0.01,
            loop_end: Some(0.03),
            ..PlaybackCommand::one_shot(ramp(10), 0.0)
        };
        mixer.submit(command).expect("submit should succeed");

        let output = render_frames(&mixer, 6);
        assert_eq!(output, vec![2.0, 3.0, 2.0, 3.0, 2.0, 3.0]);
        assert_eq!(mixer.active_voices(), 1);
    }

    #[test]
    fn test_cancelled_voice_is_silent() {
        let mixer = Mixer::new(100);
        let handle = mixer
            .submit(PlaybackCommand::one_shot(ramp(10), 0.0))
            .expect("submit should succeed");

        assert_eq!(render_frames(&mixer, 2), vec![1.0, 2.0]);
        assert!(mixer.has_voice(handle.id()));

        handle.stop();
        assert_eq!(render_frames(&mixer, 2), vec![0.0, 0.0]);
        assert!(!mixer.has_voice(handle.id()));
    }

    #[test]
    fn test_mono_is_copied_to_all_channels() {
        let mixer = Mixer::new(100);
        mixer
            .submit(PlaybackCommand::one_shot(ramp(2), 0.0))
            .expect("submit should succeed");

        let mut output = vec![0.0; 4];
        mixer.render(&mut output, 2);
        assert_eq!(output, vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_invalid_command() {
        let mixer = Mixer::new(100);
        assert!(mixer
            .submit(PlaybackCommand::one_shot(ramp(2), f64::NAN))
            .is_err());
        assert!(mixer
            .submit(PlaybackCommand {
                duration: Some(-1.0),
                ..PlaybackCommand::one_shot(ramp(2), 0.0)
            })
            .is_err());
        assert!(mixer
            .submit(PlaybackCommand {
                start_offset: f64::NAN,
                duration: Some(f64::INFINITY),
                ..PlaybackCommand::one_shot(ramp(2), 0.0)
            })
            .is_err());
        assert!(mixer
            .submit(PlaybackCommand {
                looping: true,
                loop_end: Some(f64::NAN),
                ..PlaybackCommand::one_shot(ramp(2), 0.0)
            })
            .is_err());
        assert!(mixer
            .submit(PlaybackCommand::one_shot(
                Arc::new(AudioBuffer::new(vec![vec![1.0; 4]], 44100)),
                0.0
            ))
            .is_err());
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_chained_voices_share_boundary_frame() {
        let mixer = Mixer::new(100);
        let constant = |value: f32| Arc::new(AudioBuffer::new(vec![vec![value; 10]], 100));

        // 0.6 + 0.6 frames: rounding each part separately would end the first voice at
        // frame 2, one frame after the second starts.
        mixer
            .submit(PlaybackCommand {
                duration: Some(0.006),
                ..PlaybackCommand::one_shot(constant(1.0), 0.006)
            })
            .expect("submit should succeed");
        mixer
            .submit(PlaybackCommand::one_shot(constant(10.0), 0.012))
            .expect("submit should succeed");

        assert_eq!(render_frames(&mixer, 3), vec![0.0, 10.0, 10.0]);
    }
}
