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
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::model::{Project, ProjectInfo};

mod audio;
mod error;
mod playback;
mod samples;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::playback::Playback;
pub use self::samples::Samples;

/// The configuration for the player.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Player {
    /// The audio output configuration.
    #[serde(default)]
    audio: Audio,
    /// Scheduler timing.
    #[serde(default)]
    playback: Playback,
    /// Sample storage.
    #[serde(default)]
    samples: Samples,
}

impl Player {
    pub fn new(audio: Audio, playback: Playback, samples: Samples) -> Player {
        Player {
            audio,
            playback,
            samples,
        }
    }

    /// Loads the player configuration from a file. Values may be overridden by environment
    /// variables such as BLOOP_AUDIO__DEVICE.
    pub fn load(path: &Path) -> Result<Player, ConfigError> {
        let config = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(
                ::config::Environment::with_prefix("BLOOP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }
}

/// A project document on disk: the project identity alongside its songs.
#[derive(Deserialize)]
struct ProjectDocument {
    #[serde(flatten)]
    info: ProjectInfo,
    #[serde(flatten)]
    project: Project,
}

/// Parses a project from a YAML or JSON file.
pub fn parse_project(file: &Path) -> Result<(ProjectInfo, Project), ConfigError> {
    let contents = fs::read_to_string(file)?;
    let document: ProjectDocument = match file.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => serde_yml::from_str(&contents)?,
        Some("json") => serde_json::from_str(&contents)?,
        _ => return Err(ConfigError::UnsupportedProjectFormat(file.to_path_buf())),
    };
    Ok((document.info, document.project))
}
