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
use tracing::debug;

use crate::model::SampleId;
use crate::samples::LoadState;
use crate::scheduler::PlaybackState;

/// Events pushed to the host.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A sample moved to a new cache state.
    SampleStateChanged {
        sample_id: SampleId,
        state: LoadState,
    },

    /// The section currently sounding, or None when nothing is audible.
    Playback(Option<PlaybackState>),
}

/// A sink for events. Implementations must not block; events are pushed from the audio
/// scheduling path.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, event: Event);
}

impl Dispatch for crossbeam_channel::Sender<Event> {
    fn dispatch(&self, event: Event) {
        if let Err(e) = self.try_send(event) {
            debug!(err = e.to_string(), "Dropping event");
        }
    }
}

/// Discards every event.
pub struct NullDispatch;

impl Dispatch for NullDispatch {
    fn dispatch(&self, _: Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_dispatch() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let dispatch: &dyn Dispatch = &tx;

        dispatch.dispatch(Event::Playback(None));
        // The channel is full, so this one is dropped rather than blocking.
        dispatch.dispatch(Event::SampleStateChanged {
            sample_id: SampleId::from("s1"),
            state: LoadState::Loading,
        });

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![Event::Playback(None)]);
    }
}
