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
use std::{error::Error, sync::Arc, time::Duration};

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, span, Level, Span};

use crate::audio::{self, Decoder, Device, SymphoniaDecoder};
use crate::config;
use crate::dispatch::{Dispatch, Event};
use crate::model::{Project, ProjectInfo, SampleId, SectionId, SongId};
use crate::progress::{ProgressNotifier, Subscription};
use crate::samples::{FilesystemFetcher, LoadState, SampleCache, SampleFetcher, SampleLoader};
use crate::scheduler::{PlayError, PlaybackState, Scheduler};

/// The entry point for hosts. Owns the sample loader, the scheduler and the playback
/// notifier, and forwards playback state to the host's dispatch sink.
pub struct Engine {
    loader: SampleLoader,
    scheduler: Scheduler,
    notifier: Arc<ProgressNotifier<Option<PlaybackState>>>,
    project: RwLock<Option<Arc<Project>>>,
    /// Forwards notifier updates to the dispatch sink for as long as the engine lives.
    _forward: Subscription,
    span: Span,
}

impl Engine {
    pub fn new(
        device: Arc<dyn Device>,
        fetcher: Arc<dyn SampleFetcher>,
        decoder: Arc<dyn Decoder>,
        dispatch: Arc<dyn Dispatch>,
        lookahead: Duration,
        poll_interval: Duration,
    ) -> Engine {
        let notifier = Arc::new(ProgressNotifier::new(None));
        let loader = SampleLoader::new(fetcher, decoder, dispatch.clone());
        let scheduler = Scheduler::new(
            device,
            loader.cache().clone(),
            notifier.clone(),
            lookahead,
            poll_interval,
        );
        let forward = notifier.subscribe(move |state: &Option<PlaybackState>| {
            dispatch.dispatch(Event::Playback(state.clone()))
        });

        Engine {
            loader,
            scheduler,
            notifier,
            project: RwLock::new(None),
            _forward: forward,
            span: span!(Level::INFO, "engine"),
        }
    }

    /// Builds an engine from the player configuration: the configured output device,
    /// samples read from the configured directory and decoded at the device's rate.
    pub fn from_config(
        config: &config::Player,
        dispatch: Arc<dyn Dispatch>,
    ) -> Result<Engine, Box<dyn Error>> {
        let device = audio::get_device(config.audio())?;
        let decoder = SymphoniaDecoder::new(Some(device.sample_rate()));
        let fetcher = FilesystemFetcher::new(config.samples().path());

        info!(
            device = %device,
            samples = ?fetcher.root(),
            "Created engine"
        );

        Ok(Engine::new(
            device,
            Arc::new(fetcher),
            Arc::new(decoder),
            dispatch,
            config.playback().lookahead()?,
            config.playback().poll_interval()?,
        ))
    }

    /// Replaces the project. Samples are reconciled against it, and the next `play` uses
    /// it. Whatever is playing keeps playing. Returns the handles of any loads started.
    pub fn set_project(&self, project: Project) -> Vec<JoinHandle<()>> {
        let _enter = self.span.enter();
        let project = Arc::new(project);
        info!(songs = project.songs.len(), "Setting project");

        *self.project.write() = Some(project.clone());
        self.scheduler.set_project(Some(project.clone()));
        self.loader.reconcile(&project)
    }

    /// Sets the project context used to fetch samples, then reconciles so any deferred
    /// loads start.
    pub fn set_project_info(&self, project_info: Option<ProjectInfo>) -> Vec<JoinHandle<()>> {
        let _enter = self.span.enter();
        info!(project = ?project_info.as_ref().map(|info| &info.id), "Setting project info");

        self.loader.set_project_info(project_info);
        match self.project.read().clone() {
            Some(project) => self.loader.reconcile(&project),
            None => Vec::new(),
        }
    }

    /// Evicts the sample and reconciles, loading it again if the project still needs it.
    pub fn reload_sample(&self, sample_id: &SampleId) -> Vec<JoinHandle<()>> {
        self.loader.evict(sample_id);
        match self.project.read().clone() {
            Some(project) => self.loader.reconcile(&project),
            None => Vec::new(),
        }
    }

    pub async fn play(&self, song_id: &SongId, section_id: &SectionId) -> Result<(), PlayError> {
        self.scheduler.play(song_id, section_id).await
    }

    pub async fn stop(&self) {
        self.scheduler.stop().await
    }

    pub async fn is_playing(&self) -> bool {
        self.scheduler.is_playing().await
    }

    /// Registers a callback for playback state updates.
    pub fn subscribe_progress<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Option<PlaybackState>) + Send + Sync + 'static,
    {
        self.notifier.subscribe(callback)
    }

    /// The last published playback state.
    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.notifier.current()
    }

    pub fn sample_state(&self, sample_id: &SampleId) -> Option<LoadState> {
        self.loader.cache().state(sample_id)
    }

    pub fn samples(&self) -> &SampleCache {
        self.loader.cache()
    }

    pub fn project(&self) -> Option<Arc<Project>> {
        self.project.read().clone()
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        self.scheduler.device()
    }
}
