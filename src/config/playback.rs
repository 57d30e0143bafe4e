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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::ConfigError;

const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(50);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(15);

/// Scheduler timing configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Playback {
    /// How far ahead of the device clock the first segment of a schedule starts.
    lookahead: Option<String>,

    /// How often the playback state is recomputed and published.
    poll_interval: Option<String>,
}

impl Playback {
    pub fn new(lookahead: Option<&str>, poll_interval: Option<&str>) -> Playback {
        Playback {
            lookahead: lookahead.map(str::to_string),
            poll_interval: poll_interval.map(str::to_string),
        }
    }

    /// Returns the scheduling lookahead (default: 50ms).
    pub fn lookahead(&self) -> Result<Duration, ConfigError> {
        parse_duration(self.lookahead.as_deref(), DEFAULT_LOOKAHEAD)
    }

    /// Returns the progress poll interval (default: 15ms).
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(self.poll_interval.as_deref(), DEFAULT_POLL_INTERVAL)
    }
}

fn parse_duration(value: Option<&str>, default: Duration) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => DurationString::from_string(value.to_string())
            .map(Duration::from)
            .map_err(|e| ConfigError::Duration {
                value: value.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}
