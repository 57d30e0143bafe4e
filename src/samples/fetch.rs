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
use std::io;
use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::debug;

use crate::model::{ProjectInfo, SampleId};

/// Extensions tried, in order, when looking a sample up on disk.
const EXTENSIONS: [&str; 6] = ["wav", "flac", "ogg", "mp3", "m4a", "aac"];

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("I/O error fetching sample: {0}")]
    Io(#[from] io::Error),

    #[error("fetch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

/// Retrieves the raw bytes of a sample within a project. `Ok(None)` means the sample
/// does not exist.
pub trait SampleFetcher: Send + Sync {
    fn fetch(
        &self,
        project: &ProjectInfo,
        sample_id: &SampleId,
    ) -> BoxFuture<'static, Result<Option<Vec<u8>>, FetchError>>;
}

/// Fetches samples from `<root>/<project id>/<sample id>.<ext>`.
#[derive(Clone, Debug)]
pub struct FilesystemFetcher {
    root: PathBuf,
}

impl FilesystemFetcher {
    pub fn new(root: impl Into<PathBuf>) -> FilesystemFetcher {
        FilesystemFetcher { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn read_sample(dir: PathBuf, sample_id: SampleId) -> Result<Option<Vec<u8>>, FetchError> {
    for extension in EXTENSIONS {
        let path = dir.join(format!("{}.{}", sample_id, extension));
        match std::fs::read(&path) {
            Ok(bytes) => {
                debug!(path = ?path, bytes = bytes.len(), "Read sample");
                return Ok(Some(bytes));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

impl SampleFetcher for FilesystemFetcher {
    fn fetch(
        &self,
        project: &ProjectInfo,
        sample_id: &SampleId,
    ) -> BoxFuture<'static, Result<Option<Vec<u8>>, FetchError>> {
        let dir = self.root.join(project.id.as_str());
        let sample_id = sample_id.clone();
        async move { tokio::task::spawn_blocking(move || read_sample(dir, sample_id)).await? }
            .boxed()
    }
}
