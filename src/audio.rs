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
use std::{fmt, sync::Arc};

use crate::config;
use crate::playsync::CancelHandle;

pub mod buffer;
pub mod cpal;
pub mod decode;
pub mod mixer;
pub mod mock;

pub use buffer::AudioBuffer;
pub use decode::{DecodeError, Decoder, SymphoniaDecoder};

/// Errors raised by audio output devices.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no output device found with name {0}")]
    NotFound(String),

    #[error("unsupported sample format {0}")]
    UnsupportedFormat(String),

    #[error("invalid playback command: {0}")]
    InvalidCommand(String),

    #[error("unable to list devices: {0}")]
    Devices(#[from] ::cpal::DevicesError),

    #[error("unable to read device name: {0}")]
    Name(#[from] ::cpal::DeviceNameError),

    #[error("unable to read default output config: {0}")]
    DefaultConfig(#[from] ::cpal::DefaultStreamConfigError),

    #[error("unable to build output stream: {0}")]
    BuildStream(#[from] ::cpal::BuildStreamError),

    #[error("unable to start output stream: {0}")]
    PlayStream(#[from] ::cpal::PlayStreamError),

    #[error("output thread exited before the stream started")]
    OutputThread,
}

/// A single playback command. Once submitted, a command can only be cancelled; it cannot be
/// paused, moved or restarted.
#[derive(Clone)]
pub struct PlaybackCommand {
    /// The decoded audio to play.
    pub buffer: Arc<AudioBuffer>,
    /// The device time (in seconds) at which playback begins.
    pub start_time: f64,
    /// The position in the buffer (in seconds) to start playing from.
    pub start_offset: f64,
    /// How long to play for in seconds. None plays to the end of the buffer, or forever
    /// when looping.
    pub duration: Option<f64>,
    /// Whether the loop region should repeat.
    pub looping: bool,
    /// The start of the loop region in seconds.
    pub loop_start: f64,
    /// The end of the loop region in seconds. None loops to the end of the buffer.
    pub loop_end: Option<f64>,
}

impl PlaybackCommand {
    /// A one-shot command that plays the whole buffer at the given time.
    pub fn one_shot(buffer: Arc<AudioBuffer>, start_time: f64) -> PlaybackCommand {
        PlaybackCommand {
            buffer,
            start_time,
            start_offset: 0.0,
            duration: None,
            looping: false,
            loop_start: 0.0,
            loop_end: None,
        }
    }
}

impl fmt::Debug for PlaybackCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackCommand")
            .field("start_time", &self.start_time)
            .field("start_offset", &self.start_offset)
            .field("duration", &self.duration)
            .field("looping", &self.looping)
            .field("loop_start", &self.loop_start)
            .field("loop_end", &self.loop_end)
            .finish()
    }
}

/// The handle to a submitted playback command. Stopping it is permanent.
#[derive(Clone, Debug)]
pub struct VoiceHandle {
    id: u64,
    cancel_handle: CancelHandle,
}

impl VoiceHandle {
    pub(crate) fn new(id: u64, cancel_handle: CancelHandle) -> VoiceHandle {
        VoiceHandle { id, cancel_handle }
    }

    /// The device-unique ID of the voice.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops the voice. Safe to call more than once.
    pub fn stop(&self) {
        self.cancel_handle.cancel();
    }

    /// Returns true if the voice has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.cancel_handle.is_cancelled()
    }
}

pub trait Device: fmt::Display + Send + Sync {
    /// The monotonic device clock in seconds.
    fn now(&self) -> f64;

    /// Submits a playback command to the device.
    fn submit(&self, command: PlaybackCommand) -> Result<VoiceHandle, DeviceError>;

    /// The sample rate the device renders at.
    fn sample_rate(&self) -> u32;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, DeviceError> {
    cpal::Device::list()
}

/// Gets a device for the given configuration. Device names starting with "mock" produce a
/// device that renders nothing.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, DeviceError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(
            device,
            config.sample_rate().unwrap_or(mock::DEFAULT_SAMPLE_RATE),
        )));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
