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

//! Sample acquisition for the playback scheduler.
//!
//! This module provides:
//! - The sample cache, holding one entry per sample referenced by the current project
//! - The loader, which reconciles the cache against a project and runs per-sample
//!   fetch and decode tasks
//! - The fetch capability and a filesystem implementation of it

mod cache;
mod fetch;
mod loader;

pub use cache::{LoadState, SampleCache};
pub use fetch::{FetchError, FilesystemFetcher, SampleFetcher};
pub use loader::SampleLoader;
