//! Test fixture creation
//!
//! Builds MIDI files, ZIP datasets, mapper files and WAV recordings in
//! memory, and writes them to a temporary directory for tests that go
//! through the file-picking paths.

use super::constants::SONGS;
use midly::num::{u15, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// A single-track MIDI file playing `keys` one after another, a beat each,
/// at the default tempo (120 bpm, so half a second per note).
pub fn midi_bytes(keys: &[u8]) -> Vec<u8> {
    let note = |message| TrackEventKind::Midi {
        channel: u4::new(0),
        message,
    };
    let mut events = Vec::new();
    for key in keys {
        events.push((
            0,
            note(MidiMessage::NoteOn {
                key: u7::new(*key),
                vel: u7::new(100),
            }),
        ));
        events.push((
            480,
            note(MidiMessage::NoteOff {
                key: u7::new(*key),
                vel: u7::new(0),
            }),
        ));
    }
    events.push((0, TrackEventKind::Meta(MetaMessage::EndOfTrack)));

    let track = events
        .into_iter()
        .map(|(delta, kind)| TrackEvent {
            delta: u28::new(delta),
            kind,
        })
        .collect();
    let smf = Smf {
        header: Header::new(Format::SingleTrack, Timing::Metrical(u15::new(480))),
        tracks: vec![track],
    };
    let mut out = Vec::new();
    smf.write_std(&mut out).expect("Failed to write MIDI");
    out
}

pub fn zip_of(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in members {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("Failed to start ZIP member");
        writer.write_all(content).expect("Failed to write ZIP member");
    }
    writer.finish().expect("Failed to finish ZIP").into_inner()
}

pub fn mapper_json() -> Vec<u8> {
    let songs: Vec<serde_json::Value> = SONGS
        .iter()
        .map(|(title, singer, genre, cover, midi)| {
            serde_json::json!({
                "song": title,
                "singer": singer,
                "genre": genre,
                "album": cover,
                "audio": midi,
            })
        })
        .collect();
    serde_json::to_vec(&serde_json::json!({ "songs": songs })).expect("Failed to write mapper")
}

/// One MIDI file per fixture song, inside `midi/`.
pub fn audio_dataset() -> Vec<u8> {
    let members: Vec<(String, Vec<u8>)> = SONGS
        .iter()
        .enumerate()
        .map(|(i, (_, _, _, _, midi))| (format!("midi/{}", midi), midi_bytes(&[60 + i as u8, 64, 67])))
        .collect();
    let refs: Vec<(&str, Vec<u8>)> = members
        .iter()
        .map(|(name, data)| (name.as_str(), data.clone()))
        .collect();
    zip_of(&refs)
}

pub fn image_dataset() -> Vec<u8> {
    let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    let members: Vec<(&str, Vec<u8>)> = SONGS
        .iter()
        .map(|(_, _, _, cover, _)| (*cover, png.clone()))
        .collect();
    zip_of(&members)
}

pub fn wav_bytes(sample_rate: u32, seconds: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("Failed to start WAV");
        let frames = (sample_rate as f32 * seconds) as usize;
        for i in 0..frames {
            let sample = ((i as f32 * 0.05).sin() * 8_000.0) as i16;
            writer.write_sample(sample).expect("Failed to write sample");
        }
        writer.finalize().expect("Failed to finish WAV");
    }
    cursor.into_inner()
}

/// Fixture files on disk.
pub struct FixtureFiles {
    pub mapper: PathBuf,
    pub audio_dataset: PathBuf,
    pub image_dataset: PathBuf,
    pub bad_dataset: PathBuf,
    pub audio_query: PathBuf,
    pub image_query: PathBuf,
    pub recording: PathBuf,
    _dir: TempDir,
}

pub fn write_fixture_files() -> anyhow::Result<FixtureFiles> {
    let dir = TempDir::new()?;
    let write = |name: &str, data: Vec<u8>| -> anyhow::Result<PathBuf> {
        let path = dir.path().join(name);
        std::fs::write(&path, data)?;
        Ok(path)
    };

    Ok(FixtureFiles {
        mapper: write("mapper.json", mapper_json())?,
        audio_dataset: write("midi.zip", audio_dataset())?,
        image_dataset: write("covers.zip", image_dataset())?,
        bad_dataset: write(
            "mixed.zip",
            zip_of(&[
                ("a.mid", midi_bytes(&[60])),
                ("readme.txt", b"not a song".to_vec()),
                ("b.mid", midi_bytes(&[62])),
            ]),
        )?,
        audio_query: write("query.mid", midi_bytes(&[64, 67]))?,
        image_query: write("query.png", vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])?,
        recording: write("hum.wav", wav_bytes(8_000, 0.5))?,
        _dir: dir,
    })
}
