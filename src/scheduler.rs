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

//! Turns songs into timed playback on the output device.
//!
//! Playing a section plans one segment per section from the start section onward,
//! converting beat positions into seconds at the song's tempo, and submits every segment
//! to the device up front, each chained onto the end of the last. A looping section ends
//! the chain. While a schedule is active, a poll task republishes which section is
//! sounding through the progress notifier.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info, span, warn, Instrument, Level, Span};

use crate::audio::{AudioBuffer, Device, DeviceError, PlaybackCommand, VoiceHandle};
use crate::model::{Project, SectionId, Song, SongId};
use crate::progress::ProgressNotifier;
use crate::samples::SampleCache;

/// Reasons a section can't be played. None of these change what's currently playing.
#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    #[error("no project loaded")]
    NoProject,

    #[error("song {0} not found")]
    SongNotFound(SongId),

    #[error("song {0} has no sample")]
    NoSample(SongId),

    #[error("song {0} has an invalid tempo")]
    InvalidTempo(SongId),

    #[error("sample for song {0} is not loaded")]
    SampleNotLoaded(SongId),

    #[error("section {section_id} not found in song {song_id}")]
    SectionNotFound {
        song_id: SongId,
        section_id: SectionId,
    },

    #[error("no segment could be submitted: {0}")]
    Submit(#[from] DeviceError),
}

/// The section currently sounding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackState {
    pub song_id: SongId,
    pub section_id: SectionId,
}

/// A section placed on the device timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledSegment {
    /// Device time the section starts sounding.
    pub start: f64,
    /// Device time the section stops sounding. None for looping sections and for a final
    /// section that plays out to the end of the sample.
    pub end: Option<f64>,
    pub song_id: SongId,
    pub section_id: SectionId,
}

impl ScheduledSegment {
    fn contains(&self, time: f64) -> bool {
        self.start <= time && self.end.is_none_or(|end| time < end)
    }
}

/// A section's position within its sample, in seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedSegment {
    pub section_id: SectionId,
    pub start_pos: f64,
    /// The start of the following section, if there is one.
    pub end_pos: Option<f64>,
    pub looping: bool,
}

impl PlannedSegment {
    /// How long the segment plays before the next one takes over. None if it loops or
    /// runs to the end of the sample.
    pub fn duration(&self) -> Option<f64> {
        if self.looping {
            return None;
        }
        self.end_pos.map(|end| end - self.start_pos)
    }
}

/// Plans the segments to play when starting at the given section: that section and every
/// one after it, up to and including the first looping section.
pub fn plan_segments(song: &Song, start_index: usize) -> Vec<PlannedSegment> {
    let beat_interval = song.tempo.beat_interval();
    let mut planned = Vec::new();

    for (index, section) in song.sections.iter().enumerate().skip(start_index) {
        planned.push(PlannedSegment {
            section_id: section.id.clone(),
            start_pos: section.start * beat_interval,
            end_pos: song
                .sections
                .get(index + 1)
                .map(|next| next.start * beat_interval),
            looping: section.looping,
        });
        if section.looping {
            break;
        }
    }

    planned
}

/// Returns the first segment sounding at the given device time.
pub fn current_section(segments: &[ScheduledSegment], now: f64) -> Option<PlaybackState> {
    segments
        .iter()
        .find(|segment| segment.contains(now))
        .map(|segment| PlaybackState {
            song_id: segment.song_id.clone(),
            section_id: segment.section_id.clone(),
        })
}

struct ActiveSchedule {
    id: u64,
    segments: Arc<Vec<ScheduledSegment>>,
    voices: Vec<VoiceHandle>,
    poll: JoinHandle<()>,
}

/// Dropping a schedule silences its voices and ends its poll task.
impl Drop for ActiveSchedule {
    fn drop(&mut self) {
        for voice in &self.voices {
            voice.stop();
        }
        self.poll.abort();
    }
}

/// Everything a successful `play` needs, resolved before touching the current schedule.
struct Resolved {
    song: Song,
    start_index: usize,
    buffer: Arc<AudioBuffer>,
}

/// Schedules songs onto an output device. Only one schedule is active at a time.
pub struct Scheduler {
    device: Arc<dyn Device>,
    cache: SampleCache,
    project: parking_lot::RwLock<Option<Arc<Project>>>,
    /// The active schedule. Submission and clearing both happen under this lock.
    active: Arc<Mutex<Option<ActiveSchedule>>>,
    notifier: Arc<ProgressNotifier<Option<PlaybackState>>>,
    lookahead: Duration,
    poll_interval: Duration,
    next_schedule_id: AtomicU64,
    span: Span,
}

impl Scheduler {
    pub fn new(
        device: Arc<dyn Device>,
        cache: SampleCache,
        notifier: Arc<ProgressNotifier<Option<PlaybackState>>>,
        lookahead: Duration,
        poll_interval: Duration,
    ) -> Scheduler {
        Scheduler {
            device,
            cache,
            project: parking_lot::RwLock::new(None),
            active: Arc::new(Mutex::new(None)),
            notifier,
            lookahead,
            // A zero period would make the poll task spin.
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            next_schedule_id: AtomicU64::new(1),
            span: span!(Level::INFO, "scheduler"),
        }
    }

    /// Replaces the project used by the next call to `play`. An active schedule keeps
    /// playing as it was planned.
    pub fn set_project(&self, project: Option<Arc<Project>>) {
        *self.project.write() = project;
    }

    pub fn project(&self) -> Option<Arc<Project>> {
        self.project.read().clone()
    }

    /// Stops anything playing and schedules the song from the given section onward.
    /// If the song can't be played the error is logged and returned and the current
    /// schedule is left alone.
    pub async fn play(&self, song_id: &SongId, section_id: &SectionId) -> Result<(), PlayError> {
        self.play_section(song_id, section_id)
            .instrument(self.span.clone())
            .await
    }

    async fn play_section(&self, song_id: &SongId, section_id: &SectionId) -> Result<(), PlayError> {
        let resolved = match self.resolve(song_id, section_id) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(song = %song_id, section = %section_id, err = %e, "Unable to play section");
                return Err(e);
            }
        };

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!(schedule = previous.id, "Replacing active schedule");
        }
        self.notifier.update(None);

        let planned = plan_segments(&resolved.song, resolved.start_index);
        let mut segments = Vec::with_capacity(planned.len());
        let mut voices = Vec::with_capacity(planned.len());
        let mut start_time = self.device.now() + self.lookahead.as_secs_f64();
        let mut submit_error = None;

        for plan in &planned {
            let duration = plan.duration();
            let command = PlaybackCommand {
                buffer: resolved.buffer.clone(),
                start_time,
                start_offset: plan.start_pos,
                duration,
                looping: plan.looping,
                loop_start: plan.start_pos,
                loop_end: plan.end_pos,
            };

            match self.device.submit(command) {
                Ok(voice) => voices.push(voice),
                Err(e) => {
                    error!(section = %plan.section_id, err = %e, "Failed to submit segment");
                    submit_error = Some(e);
                    break;
                }
            }

            segments.push(ScheduledSegment {
                start: start_time,
                end: duration.map(|duration| start_time + duration),
                song_id: resolved.song.id.clone(),
                section_id: plan.section_id.clone(),
            });

            match duration {
                Some(duration) => start_time += duration,
                None => break,
            }
        }

        if segments.is_empty() {
            return match submit_error {
                Some(e) => Err(e.into()),
                None => Ok(()),
            };
        }

        let finishes_at = Self::finishes_at(&segments, &planned, &resolved.buffer);
        let id = self.next_schedule_id.fetch_add(1, Ordering::Relaxed);
        let segments = Arc::new(segments);

        info!(
            song = %song_id,
            section = %section_id,
            schedule = id,
            segments = segments.len(),
            finishes_at = ?finishes_at,
            "Scheduled playback"
        );

        let poll = tokio::spawn(
            Self::poll(
                id,
                Arc::downgrade(&self.active),
                self.device.clone(),
                self.notifier.clone(),
                segments.clone(),
                finishes_at,
                self.poll_interval,
            )
            .instrument(span!(parent: &self.span, Level::DEBUG, "poll", schedule = id)),
        );

        *active = Some(ActiveSchedule {
            id,
            segments,
            voices,
            poll,
        });

        Ok(())
    }

    fn resolve(&self, song_id: &SongId, section_id: &SectionId) -> Result<Resolved, PlayError> {
        let project = self.project().ok_or(PlayError::NoProject)?;
        let song = project
            .song(song_id)
            .ok_or_else(|| PlayError::SongNotFound(song_id.clone()))?;
        if !(song.tempo.bpm.is_finite() && song.tempo.bpm > 0.0) {
            return Err(PlayError::InvalidTempo(song_id.clone()));
        }
        let sample = song
            .sample
            .as_ref()
            .ok_or_else(|| PlayError::NoSample(song_id.clone()))?;
        let buffer = self
            .cache
            .buffer(&sample.id)
            .ok_or_else(|| PlayError::SampleNotLoaded(song_id.clone()))?;
        let start_index =
            song.section_index(section_id)
                .ok_or_else(|| PlayError::SectionNotFound {
                    song_id: song_id.clone(),
                    section_id: section_id.clone(),
                })?;

        if !song.sections_ordered() {
            warn!(song = %song_id, "Section starts are out of order");
        }

        Ok(Resolved {
            song: song.clone(),
            start_index,
            buffer,
        })
    }

    /// The device time at which the schedule falls silent, or None if it loops forever.
    fn finishes_at(
        segments: &[ScheduledSegment],
        planned: &[PlannedSegment],
        buffer: &AudioBuffer,
    ) -> Option<f64> {
        let last = segments.last()?;
        if let Some(end) = last.end {
            return Some(end);
        }
        let plan = &planned[segments.len() - 1];
        if plan.looping {
            return None;
        }
        Some(last.start + (buffer.duration() - plan.start_pos).max(0.0))
    }

    async fn poll(
        id: u64,
        active: Weak<Mutex<Option<ActiveSchedule>>>,
        device: Arc<dyn Device>,
        notifier: Arc<ProgressNotifier<Option<PlaybackState>>>,
        segments: Arc<Vec<ScheduledSegment>>,
        finishes_at: Option<f64>,
        poll_interval: Duration,
    ) {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let Some(shared) = active.upgrade() else {
                return;
            };
            let mut schedule = shared.lock().await;
            if schedule.as_ref().map(|schedule| schedule.id) != Some(id) {
                return;
            }

            let now = device.now();
            if finishes_at.is_some_and(|end| now >= end) {
                schedule.take();
                info!("Playback finished");
                notifier.update(None);
                return;
            }

            notifier.update(current_section(&segments, now));
        }
    }

    /// Stops every submitted voice and clears the schedule. Does nothing harmful when
    /// nothing is playing.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(schedule) => {
                info!(parent: &self.span, schedule = schedule.id, "Stopped playback");
            }
            None => debug!(parent: &self.span, "Nothing to stop"),
        }
        self.notifier.update(None);
    }

    /// Returns true if a schedule is active.
    pub async fn is_playing(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// The segments of the active schedule.
    pub async fn segments(&self) -> Vec<ScheduledSegment> {
        match self.active.lock().await.as_ref() {
            Some(schedule) => schedule.segments.as_ref().clone(),
            None => Vec::new(),
        }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // A poll task holding the lock sees the scheduler gone on its next tick.
        if let Ok(mut active) = self.active.try_lock() {
            if active.take().is_some() {
                self.notifier.update(None);
            }
        }
    }
}
