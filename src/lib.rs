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

//! Section-based sample playback.
//!
//! A project is a set of songs, each an ordered list of sections over a single sample.
//! The [`engine::Engine`] keeps decoded samples in line with the current project and
//! plays a song from any section onward, chaining sections on the device clock and
//! publishing which section is sounding.

pub mod audio;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod model;
pub mod playsync;
pub mod progress;
pub mod samples;
pub mod scheduler;
#[cfg(test)]
mod testutil;
