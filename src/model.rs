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

//! The project data consumed by the sample loader and the scheduler.
//!
//! A project is a list of songs. Each song layers an ordered list of sections over
//! a single sample. Section lengths are never stored: they are derived from the
//! start of the following section, or from the end of the sample.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Identifies a project.
    ProjectId
);
string_id!(
    /// Identifies a song within a project.
    SongId
);
string_id!(
    /// Identifies a section within a song.
    SectionId
);
string_id!(
    /// Identifies a sample. Sample bytes are fetched and cached by this identity.
    SampleId
);

/// A tempo in beats per minute.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    pub bpm: f64,
}

impl Tempo {
    pub fn new(bpm: f64) -> Tempo {
        Tempo { bpm }
    }

    /// Seconds per beat.
    pub fn beat_interval(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Beats per second.
    pub fn beat_frequency(&self) -> f64 {
        self.bpm / 60.0
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo { bpm: 120.0 }
    }
}

/// The metronome setting of a song. Carried through from project data; the
/// scheduler does not render a click.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Metronome {
    #[default]
    Default,
    CountIn,
    On,
    Off,
}

/// The identity of the project currently being edited. This is the context passed
/// to the sample fetcher.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub id: ProjectId,
    #[serde(default)]
    pub name: String,
}

/// Audio sample metadata. The decoded audio lives in the sample cache.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: SampleId,
    #[serde(default)]
    pub name: String,
    pub sample_rate: u32,
    pub sample_count: u64,
    pub channel_count: u16,
    #[serde(default)]
    pub tempo: Tempo,
}

impl Sample {
    /// The length of the sample in beats at the sample's own tempo.
    pub fn beat_length(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count as f64 * self.tempo.beat_frequency() / self.sample_rate as f64
    }
}

/// A named span of a song, starting at a beat offset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: SectionId,
    #[serde(default)]
    pub name: String,
    /// The start of the section in beats.
    pub start: f64,
    #[serde(default, rename = "loop")]
    pub looping: bool,
    #[serde(default)]
    pub metronome: bool,
}

impl Section {
    pub fn new(id: &str, start: f64) -> Section {
        Section {
            id: SectionId::from(id),
            name: id.to_string(),
            start,
            looping: false,
            metronome: false,
        }
    }

    pub fn with_loop(mut self, looping: bool) -> Section {
        self.looping = looping;
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: SongId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tempo: Tempo,
    #[serde(default)]
    pub metronome: Metronome,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub sample: Option<Sample>,
}

impl Song {
    pub fn new(id: &str, tempo: Tempo) -> Song {
        Song {
            id: SongId::from(id),
            name: id.to_string(),
            tempo,
            metronome: Metronome::Default,
            sections: Vec::new(),
            sample: None,
        }
    }

    pub fn with_sections(mut self, sections: Vec<Section>) -> Song {
        self.sections = sections;
        self
    }

    pub fn with_sample(mut self, sample: Sample) -> Song {
        self.sample = Some(sample);
        self
    }

    /// Returns the index of the section with the given ID.
    pub fn section_index(&self, section_id: &SectionId) -> Option<usize> {
        self.sections
            .iter()
            .position(|section| &section.id == section_id)
    }

    /// The length of the section at the given index in beats. The final section runs
    /// to the end of the sample, if there is one.
    pub fn section_beat_length(&self, index: usize) -> Option<f64> {
        let section = self.sections.get(index)?;
        let end = match self.sections.get(index + 1) {
            Some(next) => next.start,
            None => self.sample.as_ref()?.beat_length(),
        };
        Some((end - section.start).max(0.0))
    }

    /// Returns true if section starts never decrease along the section list.
    pub fn sections_ordered(&self) -> bool {
        self.sections
            .windows(2)
            .all(|pair| pair[0].start <= pair[1].start)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Project {
    #[serde(default)]
    pub songs: Vec<Song>,
}

impl Project {
    pub fn new(songs: Vec<Song>) -> Project {
        Project { songs }
    }

    pub fn song(&self, song_id: &SongId) -> Option<&Song> {
        self.songs.iter().find(|song| &song.id == song_id)
    }

    /// All sample identities referenced by any song in the project.
    pub fn sample_ids(&self) -> HashSet<SampleId> {
        self.songs
            .iter()
            .filter_map(|song| song.sample.as_ref())
            .map(|sample| sample.id.clone())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// A mono sample of the given length in seconds at 44.1kHz.
    pub fn sample(id: &str, seconds: u64, tempo: Tempo) -> Sample {
        Sample {
            id: SampleId::from(id),
            name: id.to_string(),
            sample_rate: 44100,
            sample_count: seconds * 44100,
            channel_count: 1,
            tempo,
        }
    }

    #[test]
    fn test_sample_beat_length() {
        let sample = sample("s", 20, Tempo::new(60.0));
        assert_eq!(sample.beat_length(), 20.0);

        let sample = super::Sample {
            sample_rate: 48000,
            sample_count: 48000 * 30,
            ..sample
        };
        assert_eq!(sample.beat_length(), 30.0);

        let fast = super::Sample {
            tempo: Tempo::new(120.0),
            ..sample.clone()
        };
        assert_eq!(fast.beat_length(), 60.0);
    }

    #[test]
    fn test_section_beat_length() {
        let song = Song::new("song", Tempo::new(60.0))
            .with_sections(vec![
                Section::new("intro", 0.0),
                Section::new("verse", 8.0),
            ])
            .with_sample(sample("s", 20, Tempo::new(60.0)));

        assert_eq!(song.section_beat_length(0), Some(8.0));
        assert_eq!(song.section_beat_length(1), Some(12.0));
        assert_eq!(song.section_beat_length(2), None);
        assert!(song.sections_ordered());

        let no_sample = Song {
            sample: None,
            ..song
        };
        assert_eq!(no_sample.section_beat_length(0), Some(8.0));
        assert_eq!(no_sample.section_beat_length(1), None);
    }

    #[test]
    fn test_project_sample_ids() {
        let project = Project::new(vec![
            Song::new("a", Tempo::default()).with_sample(sample("s1", 1, Tempo::default())),
            Song::new("b", Tempo::default()).with_sample(sample("s1", 1, Tempo::default())),
            Song::new("c", Tempo::default()).with_sample(sample("s2", 1, Tempo::default())),
            Song::new("d", Tempo::default()),
        ]);

        let ids = project.sample_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&SampleId::from("s1")));
        assert!(ids.contains(&SampleId::from("s2")));
    }

    #[test]
    fn test_deserialize_song() {
        let json = r#"{
            "id": "song-1",
            "name": "Song 1",
            "tempo": {"bpm": 90.0},
            "sections": [
                {"id": "a", "name": "A", "start": 0.0},
                {"id": "b", "name": "B", "start": 16.0, "loop": true}
            ],
            "sample": {
                "id": "sample-1",
                "sampleRate": 48000,
                "sampleCount": 480000,
                "channelCount": 2,
                "tempo": {"bpm": 90.0}
            }
        }"#;

        let song: Song = serde_json::from_str(json).expect("song should parse");
        assert_eq!(song.id, SongId::from("song-1"));
        assert_eq!(song.tempo.bpm, 90.0);
        assert_eq!(song.metronome, Metronome::Default);
        assert!(!song.sections[0].looping);
        assert!(song.sections[1].looping);
        assert_eq!(
            song.sample.map(|sample| sample.id),
            Some(SampleId::from("sample-1"))
        );
    }
}
