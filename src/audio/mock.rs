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
use std::{fmt, sync::Arc, time::Instant};

use parking_lot::Mutex;
use tracing::{info, span, Level};

use super::{mixer, DeviceError, PlaybackCommand, VoiceHandle};
use crate::playsync::CancelHandle;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Where the mock device reads its clock from.
#[derive(Clone)]
enum Clock {
    /// Seconds since the device was created.
    Wall(Instant),
    /// A clock that only moves when told to.
    Manual(Arc<Mutex<f64>>),
}

/// A command that was submitted to the mock device.
#[derive(Clone, Debug)]
pub struct Submitted {
    pub command: PlaybackCommand,
    pub handle: VoiceHandle,
}

/// A mock device. Doesn't actually play anything, but keeps every command it was given.
#[derive(Clone)]
pub struct Device {
    name: String,
    clock: Clock,
    sample_rate: u32,
    submitted: Arc<Mutex<Vec<Submitted>>>,
}

impl Device {
    /// Gets the given mock device. Its clock follows the wall clock.
    pub fn get(name: &str, sample_rate: u32) -> Device {
        Device {
            name: name.to_string(),
            clock: Clock::Wall(Instant::now()),
            sample_rate,
            submitted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Gets a mock device whose clock starts at zero and only moves via `set_time`.
    #[cfg(test)]
    pub fn manual(name: &str) -> Device {
        Device {
            clock: Clock::Manual(Arc::new(Mutex::new(0.0))),
            ..Device::get(name, DEFAULT_SAMPLE_RATE)
        }
    }

    /// Sets the device clock. Has no effect on a wall clock device.
    #[cfg(test)]
    pub fn set_time(&self, time: f64) {
        if let Clock::Manual(clock) = &self.clock {
            *clock.lock() = time;
        }
    }

    /// Returns every command submitted so far, in submission order.
    pub fn submitted(&self) -> Vec<Submitted> {
        self.submitted.lock().clone()
    }

    /// Returns true if any submitted voice has not been stopped.
    pub fn is_playing(&self) -> bool {
        self.submitted
            .lock()
            .iter()
            .any(|submitted| !submitted.handle.is_stopped())
    }
}

impl crate::audio::Device for Device {
    fn now(&self) -> f64 {
        match &self.clock {
            Clock::Wall(start) => start.elapsed().as_secs_f64(),
            Clock::Manual(clock) => *clock.lock(),
        }
    }

    /// Validates the command and records it.
    fn submit(&self, command: PlaybackCommand) -> Result<VoiceHandle, DeviceError> {
        let span = span!(Level::INFO, "submit (mock)");
        let _enter = span.enter();

        info!(
            device = self.name,
            start_time = command.start_time,
            start_offset = command.start_offset,
            duration = ?command.duration,
            looping = command.looping,
            "Submitting voice."
        );

        mixer::validate(&command)?;
        let handle = VoiceHandle::new(mixer::next_voice_id(), CancelHandle::new());

        self.submitted.lock().push(Submitted {
            command,
            handle: handle.clone(),
        });
        Ok(handle)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
