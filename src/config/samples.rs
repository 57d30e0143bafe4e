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
use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_SAMPLES_PATH: &str = "samples";

/// Where sample files are read from.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Samples {
    /// The root directory. Samples live at <path>/<project id>/<sample id>.<ext>.
    path: Option<String>,
}

impl Samples {
    pub fn new(path: &str) -> Samples {
        Samples {
            path: Some(path.to_string()),
        }
    }

    /// Returns the sample root directory (default: ./samples).
    pub fn path(&self) -> PathBuf {
        PathBuf::from(self.path.as_deref().unwrap_or(DEFAULT_SAMPLES_PATH))
    }
}
