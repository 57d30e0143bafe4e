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
use std::collections::{HashMap, HashSet};
use std::{fmt, sync::Arc};

use parking_lot::RwLock;

use crate::audio::AudioBuffer;
use crate::model::SampleId;

/// How far a sample has got through acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadState {
    Loading,
    Converting,
    Loaded,
    Error,
}

impl LoadState {
    /// Returns true if a single load attempt may move from this state to `next`.
    pub fn can_advance_to(self, next: LoadState) -> bool {
        matches!(
            (self, next),
            (LoadState::Loading, LoadState::Converting)
                | (LoadState::Loading, LoadState::Error)
                | (LoadState::Converting, LoadState::Loaded)
                | (LoadState::Converting, LoadState::Error)
        )
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadState::Loading => "loading",
            LoadState::Converting => "converting",
            LoadState::Loaded => "loaded",
            LoadState::Error => "error",
        })
    }
}

struct Entry {
    state: LoadState,
    buffer: Option<Arc<AudioBuffer>>,
    /// The load attempt that owns this entry. Results from any other attempt are stale.
    attempt: u64,
}

/// One entry per sample referenced by the current project. Readers can clone the cache
/// freely; only the loader mutates it.
#[derive(Clone, Default)]
pub struct SampleCache {
    entries: Arc<RwLock<HashMap<SampleId, Entry>>>,
}

impl SampleCache {
    pub fn new() -> SampleCache {
        SampleCache::default()
    }

    /// The state of the given sample, if it's cached.
    pub fn state(&self, sample_id: &SampleId) -> Option<LoadState> {
        self.entries.read().get(sample_id).map(|entry| entry.state)
    }

    /// The decoded buffer of the given sample, if it has finished loading.
    pub fn buffer(&self, sample_id: &SampleId) -> Option<Arc<AudioBuffer>> {
        self.entries
            .read()
            .get(sample_id)
            .filter(|entry| entry.state == LoadState::Loaded)
            .and_then(|entry| entry.buffer.clone())
    }

    pub fn contains(&self, sample_id: &SampleId) -> bool {
        self.entries.read().contains_key(sample_id)
    }

    /// The identities of every cached sample.
    pub fn sample_ids(&self) -> HashSet<SampleId> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Starts a new attempt for the sample in the loading state, replacing any existing entry.
    pub(super) fn begin(&self, sample_id: &SampleId, attempt: u64) {
        self.entries.write().insert(
            sample_id.clone(),
            Entry {
                state: LoadState::Loading,
                buffer: None,
                attempt,
            },
        );
    }

    /// Moves the sample to the next state of the given attempt. Returns false, changing
    /// nothing, if the entry was removed, belongs to another attempt, or the move would go
    /// backwards.
    pub(super) fn advance(
        &self,
        sample_id: &SampleId,
        attempt: u64,
        state: LoadState,
        buffer: Option<Arc<AudioBuffer>>,
    ) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(sample_id) {
            Some(entry) if entry.attempt == attempt && entry.state.can_advance_to(state) => {
                entry.state = state;
                entry.buffer = buffer;
                true
            }
            _ => false,
        }
    }

    /// Inserts an already decoded sample.
    #[cfg(test)]
    pub(crate) fn insert_loaded(&self, sample_id: &SampleId, buffer: Arc<AudioBuffer>) {
        self.entries.write().insert(
            sample_id.clone(),
            Entry {
                state: LoadState::Loaded,
                buffer: Some(buffer),
                attempt: 0,
            },
        );
    }

    /// Removes the sample. Returns true if it was cached.
    pub(super) fn remove(&self, sample_id: &SampleId) -> bool {
        self.entries.write().remove(sample_id).is_some()
    }
}

impl fmt::Debug for SampleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_map()
            .entries(entries.iter().map(|(id, entry)| (id, entry.state)))
            .finish()
    }
}
