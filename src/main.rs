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
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use parking_lot::Mutex;
use tracing::info;

use bloop::audio;
use bloop::config::{self, Player};
use bloop::dispatch::NullDispatch;
use bloop::engine::Engine;
use bloop::model::{SectionId, SongId};
use bloop::scheduler::PlaybackState;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A section-based sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Loads every sample referenced by a project and reports its state.
    Samples {
        /// The path to the player config.
        player_path: String,
        /// The path to the project file (YAML or JSON).
        project_path: String,
    },
    /// Plays a song from the given section through the configured device.
    Play {
        /// The path to the player config.
        player_path: String,
        /// The path to the project file (YAML or JSON).
        project_path: String,
        /// The ID of the song to play.
        song: String,
        /// The ID of the section to start from. Defaults to the first section.
        section: Option<String>,
    },
}

/// Loads the config and project and waits for every sample to finish loading.
async fn load(player_path: &str, project_path: &str) -> Result<Engine, Box<dyn Error>> {
    let player = Player::load(&PathBuf::from(player_path))?;
    let (project_info, project) = config::parse_project(&PathBuf::from(project_path))?;

    let engine = Engine::from_config(&player, Arc::new(NullDispatch))?;
    engine.set_project_info(Some(project_info));
    for handle in engine.set_project(project) {
        handle.await?;
    }
    Ok(engine)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Samples {
            player_path,
            project_path,
        } => {
            let engine = load(&player_path, &project_path).await?;

            let mut sample_ids: Vec<_> = engine.samples().sample_ids().into_iter().collect();
            if sample_ids.is_empty() {
                println!("No samples referenced by {}.", project_path);
                return Ok(());
            }

            sample_ids.sort();
            println!("Samples (count: {}):", sample_ids.len());
            for sample_id in sample_ids {
                let state = engine
                    .sample_state(&sample_id)
                    .map(|state| state.to_string())
                    .unwrap_or_else(|| "missing".to_string());
                match engine.samples().buffer(&sample_id) {
                    Some(buffer) => println!(
                        "- {}: {} ({} channels, {:.2}s)",
                        sample_id,
                        state,
                        buffer.channel_count(),
                        buffer.duration()
                    ),
                    None => println!("- {}: {}", sample_id, state),
                }
            }
        }
        Commands::Play {
            player_path,
            project_path,
            song,
            section,
        } => {
            let engine = load(&player_path, &project_path).await?;
            let song_id = SongId::new(song);

            let section_id = match section {
                Some(section) => SectionId::new(section),
                None => engine
                    .project()
                    .and_then(|project| {
                        project
                            .song(&song_id)
                            .and_then(|song| song.sections.first())
                            .map(|section| section.id.clone())
                    })
                    .ok_or_else(|| format!("song {} has no sections", song_id))?,
            };

            let last: Arc<Mutex<Option<PlaybackState>>> = Arc::new(Mutex::new(None));
            let _subscription = engine.subscribe_progress(move |state| {
                let mut last = last.lock();
                if *last != *state {
                    match state {
                        Some(state) => println!("Playing {}", state.section_id),
                        None => println!("Stopped"),
                    }
                    *last = state.clone();
                }
            });

            engine.play(&song_id, &section_id).await?;
            info!(device = %engine.device(), "Playing until the schedule finishes");
            while engine.is_playing().await {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }

    Ok(())
}
