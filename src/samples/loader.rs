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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, span, warn, Instrument, Level, Span};

use super::{LoadState, SampleCache, SampleFetcher};
use crate::audio::{AudioBuffer, Decoder};
use crate::dispatch::{Dispatch, Event};
use crate::model::{Project, ProjectInfo, SampleId};

/// Keeps the sample cache in line with the current project. Every sample goes through
/// its own load task: fetch, then decode on the blocking pool. A tokio runtime must be
/// running when loads are started.
pub struct SampleLoader {
    cache: SampleCache,
    fetcher: Arc<dyn SampleFetcher>,
    decoder: Arc<dyn Decoder>,
    dispatch: Arc<dyn Dispatch>,
    /// The project context passed to the fetcher. Loads are deferred until it's set.
    project_info: RwLock<Option<ProjectInfo>>,
    next_attempt: AtomicU64,
    span: Span,
}

impl SampleLoader {
    pub fn new(
        fetcher: Arc<dyn SampleFetcher>,
        decoder: Arc<dyn Decoder>,
        dispatch: Arc<dyn Dispatch>,
    ) -> SampleLoader {
        SampleLoader {
            cache: SampleCache::new(),
            fetcher,
            decoder,
            dispatch,
            project_info: RwLock::new(None),
            next_attempt: AtomicU64::new(1),
            span: span!(Level::INFO, "sample loader"),
        }
    }

    /// A read handle on the cache.
    pub fn cache(&self) -> &SampleCache {
        &self.cache
    }

    pub fn project_info(&self) -> Option<ProjectInfo> {
        self.project_info.read().clone()
    }

    /// Sets the project context used by subsequent loads. Cached entries are untouched.
    pub fn set_project_info(&self, project_info: Option<ProjectInfo>) {
        *self.project_info.write() = project_info;
    }

    /// Brings the cache in line with the samples the project references. Samples no
    /// longer referenced are evicted and newly referenced samples start loading. Calling
    /// this twice with the same project does nothing the second time.
    ///
    /// Returns the handles of the loads that were started.
    pub fn reconcile(&self, project: &Project) -> Vec<JoinHandle<()>> {
        let _enter = self.span.enter();

        let required = project.sample_ids();
        let cached = self.cache.sample_ids();

        let mut removed: Vec<&SampleId> = cached.difference(&required).collect();
        removed.sort();
        for sample_id in removed {
            self.evict(sample_id);
        }

        let mut added: Vec<&SampleId> = required.difference(&cached).collect();
        if added.is_empty() {
            return Vec::new();
        }
        if self.project_info.read().is_none() {
            info!(
                samples = added.len(),
                "No project set, deferring sample loads"
            );
            return Vec::new();
        }

        added.sort();
        added
            .into_iter()
            .filter_map(|sample_id| self.load(sample_id))
            .collect()
    }

    /// Starts a fresh load of the sample, superseding any load already in progress.
    /// Returns None, starting nothing, if no project context is set.
    pub fn load(&self, sample_id: &SampleId) -> Option<JoinHandle<()>> {
        let project = match self.project_info.read().clone() {
            Some(project) => project,
            None => {
                warn!(sample_id = %sample_id, "Cannot load sample without a project");
                return None;
            }
        };

        let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        self.cache.begin(sample_id, attempt);
        self.dispatch.dispatch(Event::SampleStateChanged {
            sample_id: sample_id.clone(),
            state: LoadState::Loading,
        });
        debug!(sample_id = %sample_id, attempt, "Loading sample");

        let load = Load {
            cache: self.cache.clone(),
            fetcher: self.fetcher.clone(),
            decoder: self.decoder.clone(),
            dispatch: self.dispatch.clone(),
            project,
            sample_id: sample_id.clone(),
            attempt,
        };
        let span = span!(parent: &self.span, Level::INFO, "load", sample_id = %sample_id);
        Some(tokio::spawn(load.run().instrument(span)))
    }

    /// Removes the sample from the cache. A load in flight for it is discarded when it
    /// completes. Returns true if the sample was cached.
    pub fn evict(&self, sample_id: &SampleId) -> bool {
        let removed = self.cache.remove(sample_id);
        if removed {
            debug!(sample_id = %sample_id, "Evicted sample");
        }
        removed
    }
}

/// A single load attempt.
struct Load {
    cache: SampleCache,
    fetcher: Arc<dyn SampleFetcher>,
    decoder: Arc<dyn Decoder>,
    dispatch: Arc<dyn Dispatch>,
    project: ProjectInfo,
    sample_id: SampleId,
    attempt: u64,
}

impl Load {
    async fn run(self) {
        let bytes = match self.fetcher.fetch(&self.project, &self.sample_id).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!(project = %self.project.id, "Sample not found");
                self.advance(LoadState::Error, None);
                return;
            }
            Err(e) => {
                warn!(err = %e, "Failed to fetch sample");
                self.advance(LoadState::Error, None);
                return;
            }
        };

        if !self.advance(LoadState::Converting, None) {
            return;
        }

        let decoder = self.decoder.clone();
        match tokio::task::spawn_blocking(move || decoder.decode(bytes)).await {
            Ok(Ok(buffer)) => {
                let frames = buffer.frames();
                let duration = buffer.duration();
                if self.advance(LoadState::Loaded, Some(Arc::new(buffer))) {
                    info!(frames, duration, "Loaded sample");
                }
            }
            Ok(Err(e)) => {
                warn!(err = %e, "Failed to decode sample");
                self.advance(LoadState::Error, None);
            }
            Err(e) => {
                error!(err = %e, "Decode task failed");
                self.advance(LoadState::Error, None);
            }
        }
    }

    /// Records the transition and notifies the host. Returns false if this attempt has
    /// been evicted or superseded.
    fn advance(&self, state: LoadState, buffer: Option<Arc<AudioBuffer>>) -> bool {
        if !self
            .cache
            .advance(&self.sample_id, self.attempt, state, buffer)
        {
            debug!(attempt = self.attempt, state = %state, "Discarding stale load");
            return false;
        }
        self.dispatch.dispatch(Event::SampleStateChanged {
            sample_id: self.sample_id.clone(),
            state,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::error::Error;

    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::audio::DecodeError;
    use crate::model::{test::sample, ProjectId, Song, Tempo};
    use crate::samples::FetchError;

    #[derive(Default)]
    struct TestFetcher {
        samples: HashMap<SampleId, Result<Vec<u8>, String>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl TestFetcher {
        fn with(mut self, sample_id: &str, bytes: Result<&[u8], &str>) -> TestFetcher {
            self.samples.insert(
                SampleId::from(sample_id),
                bytes.map(|b| b.to_vec()).map_err(|e| e.to_string()),
            );
            self
        }
    }

    impl SampleFetcher for TestFetcher {
        fn fetch(
            &self,
            _: &ProjectInfo,
            sample_id: &SampleId,
        ) -> BoxFuture<'static, Result<Option<Vec<u8>>, FetchError>> {
            let result = match self.samples.get(sample_id) {
                None => Ok(None),
                Some(Ok(bytes)) => Ok(Some(bytes.clone())),
                Some(Err(e)) => Err(FetchError::Other(e.clone())),
            };
            let gate = self.gate.clone();
            async move {
                if let Some(gate) = gate {
                    gate.acquire()
                        .await
                        .map_err(|e| FetchError::Other(e.to_string()))?
                        .forget();
                }
                result
            }
            .boxed()
        }
    }

    /// One frame per byte. The bytes "bad" fail to decode.
    struct TestDecoder;

    impl Decoder for TestDecoder {
        fn decode(&self, bytes: Vec<u8>) -> Result<AudioBuffer, DecodeError> {
            if bytes == b"bad" {
                return Err(DecodeError::Empty);
            }
            Ok(AudioBuffer::new(
                vec![bytes.iter().map(|b| *b as f32 / 255.0).collect()],
                100,
            ))
        }
    }

    fn loader(fetcher: TestFetcher) -> (SampleLoader, crossbeam_channel::Receiver<Event>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let loader = SampleLoader::new(Arc::new(fetcher), Arc::new(TestDecoder), Arc::new(tx));
        loader.set_project_info(Some(ProjectInfo {
            id: ProjectId::from("p1"),
            name: "Project".to_string(),
        }));
        (loader, rx)
    }

    fn project(sample_ids: &[&str]) -> Project {
        Project::new(
            sample_ids
                .iter()
                .map(|id| Song::new(id, Tempo::default()).with_sample(sample(id, 1, Tempo::default())))
                .collect(),
        )
    }

    fn states(rx: &crossbeam_channel::Receiver<Event>, sample_id: &str) -> Vec<LoadState> {
        rx.try_iter()
            .filter_map(|event| match event {
                Event::SampleStateChanged {
                    sample_id: id,
                    state,
                } if id.as_str() == sample_id => Some(state),
                _ => None,
            })
            .collect()
    }

    async fn join(handles: Vec<JoinHandle<()>>) -> Result<(), Box<dyn Error>> {
        for handle in handles {
            handle.await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_load() -> Result<(), Box<dyn Error>> {
        let (loader, rx) = loader(TestFetcher::default().with("s1", Ok(b"abcd")));
        let id = SampleId::from("s1");

        join(loader.load(&id).into_iter().collect()).await?;

        assert_eq!(
            states(&rx, "s1"),
            vec![LoadState::Loading, LoadState::Converting, LoadState::Loaded]
        );
        assert_eq!(loader.cache().state(&id), Some(LoadState::Loaded));
        assert_eq!(loader.cache().buffer(&id).map(|b| b.frames()), Some(4));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_failures() -> Result<(), Box<dyn Error>> {
        let (loader, rx) = loader(
            TestFetcher::default()
                .with("broken", Err("connection reset"))
                .with("corrupt", Ok(b"bad")),
        );

        join(loader.reconcile(&project(&["missing", "broken", "corrupt"]))).await?;

        let errors = rx
            .try_iter()
            .filter(|event| {
                matches!(
                    event,
                    Event::SampleStateChanged {
                        state: LoadState::Error,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(errors, 3);
        for id in ["missing", "broken", "corrupt"] {
            let id = SampleId::from(id);
            assert_eq!(loader.cache().state(&id), Some(LoadState::Error));
            assert!(loader.cache().buffer(&id).is_none());
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_transitions() -> Result<(), Box<dyn Error>> {
        let (loader, rx) = loader(TestFetcher::default().with("corrupt", Ok(b"bad")));

        join(loader.load(&SampleId::from("missing")).into_iter().collect()).await?;
        assert_eq!(
            states(&rx, "missing"),
            vec![LoadState::Loading, LoadState::Error]
        );

        join(loader.load(&SampleId::from("corrupt")).into_iter().collect()).await?;
        assert_eq!(
            states(&rx, "corrupt"),
            vec![LoadState::Loading, LoadState::Converting, LoadState::Error]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_reconcile_converges() -> Result<(), Box<dyn Error>> {
        let (loader, rx) = loader(
            TestFetcher::default()
                .with("s1", Ok(b"1"))
                .with("s2", Ok(b"22"))
                .with("s3", Ok(b"333")),
        );

        let first = project(&["s1", "s2"]);
        let handles = loader.reconcile(&first);
        assert_eq!(handles.len(), 2);
        join(handles).await?;
        rx.try_iter().for_each(drop);

        // Nothing to do the second time around.
        assert!(loader.reconcile(&first).is_empty());
        assert_eq!(rx.try_iter().count(), 0);

        join(loader.reconcile(&project(&["s2", "s3"]))).await?;
        assert_eq!(
            loader.cache().sample_ids(),
            HashSet::from([SampleId::from("s2"), SampleId::from("s3")])
        );
        assert_eq!(
            loader.cache().state(&SampleId::from("s3")),
            Some(LoadState::Loaded)
        );

        assert!(loader.reconcile(&Project::default()).is_empty());
        assert!(loader.cache().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_reconcile_without_project_info() -> Result<(), Box<dyn Error>> {
        let (loader, _rx) = loader(TestFetcher::default().with("s1", Ok(b"1")));
        loader.set_project_info(None);

        assert!(loader.reconcile(&project(&["s1"])).is_empty());
        assert!(loader.cache().is_empty());
        assert!(loader.load(&SampleId::from("s1")).is_none());

        loader.set_project_info(Some(ProjectInfo {
            id: ProjectId::from("p1"),
            name: String::new(),
        }));
        join(loader.reconcile(&project(&["s1"]))).await?;
        assert_eq!(
            loader.cache().state(&SampleId::from("s1")),
            Some(LoadState::Loaded)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_evicted_load_is_discarded() -> Result<(), Box<dyn Error>> {
        let gate = Arc::new(Semaphore::new(0));
        let (loader, rx) = loader(TestFetcher {
            gate: Some(gate.clone()),
            ..TestFetcher::default().with("s1", Ok(b"1"))
        });
        let id = SampleId::from("s1");

        let handle = loader.load(&id);
        assert_eq!(loader.cache().state(&id), Some(LoadState::Loading));
        assert!(loader.evict(&id));

        gate.add_permits(1);
        join(handle.into_iter().collect()).await?;

        assert!(!loader.cache().contains(&id));
        assert_eq!(states(&rx, "s1"), vec![LoadState::Loading]);
        Ok(())
    }

    #[tokio::test]
    async fn test_reload_supersedes() -> Result<(), Box<dyn Error>> {
        let gate = Arc::new(Semaphore::new(0));
        let (loader, rx) = loader(TestFetcher {
            gate: Some(gate.clone()),
            ..TestFetcher::default().with("s1", Ok(b"1"))
        });
        let id = SampleId::from("s1");

        let mut handles: Vec<JoinHandle<()>> = loader.load(&id).into_iter().collect();
        handles.extend(loader.load(&id));

        gate.add_permits(2);
        join(handles).await?;

        assert_eq!(loader.cache().state(&id), Some(LoadState::Loaded));
        assert_eq!(
            states(&rx, "s1"),
            vec![
                LoadState::Loading,
                LoadState::Loading,
                LoadState::Converting,
                LoadState::Loaded
            ]
        );
        Ok(())
    }
}
