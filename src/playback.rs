// Playback synchronization
// Follows the audio player's clock and publishes the global token currently spoken,
// using the word timepoints delivered with each synthesized audio chunk.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, TahkikError};
use crate::records::AudioChunkRecord;

static MARK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^w(\d+)$").unwrap());

/// The word currently highlighted by playback, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackPosition {
    pub global_token_index: Option<usize>,
}

impl PlaybackPosition {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn at(token: usize) -> Self {
        PlaybackPosition {
            global_token_index: Some(token),
        }
    }

    pub fn is_at(&self, token: usize) -> bool {
        self.global_token_index == Some(token)
    }
}

/// A word boundary inside an audio chunk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timepoint {
    pub token: usize,
    /// Seconds from the start of the chunk
    pub time: f64,
}

/// Parse a timepoint mark of the form `w<int>`
pub fn parse_mark(mark: &str) -> Option<usize> {
    MARK_RE
        .captures(mark.trim())
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Token of the latest timepoint at or before `time`, scanning from the end.
/// Returns None for times before the first timepoint or for non-finite times.
pub fn token_at(timepoints: &[Timepoint], time: f64) -> Option<usize> {
    if !time.is_finite() {
        return None;
    }
    timepoints
        .iter()
        .rev()
        .find(|tp| tp.time <= time)
        .map(|tp| tp.token)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub audio: Vec<u8>,
    /// Sorted ascending by time
    pub timepoints: Vec<Timepoint>,
}

impl AudioChunk {
    pub fn new(audio: Vec<u8>, mut timepoints: Vec<Timepoint>) -> Self {
        timepoints.retain(|tp| tp.time.is_finite());
        timepoints.sort_by(|a, b| a.time.total_cmp(&b.time));
        AudioChunk { audio, timepoints }
    }

    /// Build a chunk from its external record; malformed marks are dropped
    pub fn from_record(record: AudioChunkRecord) -> Self {
        let timepoints = record
            .timepoints
            .iter()
            .filter_map(|tp| match parse_mark(&tp.mark) {
                Some(token) => Some(Timepoint {
                    token,
                    time: tp.time,
                }),
                None => {
                    tracing::warn!(mark = %tp.mark, "dropping malformed timepoint mark");
                    None
                }
            })
            .collect();
        AudioChunk::new(record.audio_bytes, timepoints)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Playing,
    Paused,
}

/// Drives the playback position from audio time updates across a queue of chunks
#[derive(Debug)]
pub struct PlaybackSynchronizer {
    chunks: Vec<AudioChunk>,
    current: usize,
    state: PlayerState,
    rate: f32,
    position: PlaybackPosition,
}

impl PlaybackSynchronizer {
    pub fn new(rate: f32) -> Result<Self> {
        let mut sync = PlaybackSynchronizer {
            chunks: Vec::new(),
            current: 0,
            state: PlayerState::Stopped,
            rate: 1.0,
            position: PlaybackPosition::none(),
        };
        sync.set_rate(rate)?;
        Ok(sync)
    }

    pub fn enqueue(&mut self, chunk: AudioChunk) {
        self.chunks.push(chunk);
    }

    pub fn chunks(&self) -> &[AudioChunk] {
        &self.chunks
    }

    pub fn current_chunk(&self) -> Option<&AudioChunk> {
        self.chunks.get(self.current)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn position(&self) -> PlaybackPosition {
        self.position
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f32) -> Result<()> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(TahkikError::InvalidPlaybackRate(rate));
        }
        self.rate = rate;
        Ok(())
    }

    /// Start (or restart from chunk 0 after a stop). Returns the chunk to play.
    pub fn play(&mut self) -> Option<&AudioChunk> {
        match self.state {
            PlayerState::Playing => {}
            PlayerState::Paused => self.state = PlayerState::Playing,
            PlayerState::Stopped => {
                if self.chunks.is_empty() {
                    return None;
                }
                self.current = 0;
                self.state = PlayerState::Playing;
            }
        }
        self.current_chunk()
    }

    pub fn pause(&mut self) {
        if self.state == PlayerState::Playing {
            self.state = PlayerState::Paused;
        }
    }

    /// Clear the position; queued chunks are kept so play can start over without refetching
    pub fn stop(&mut self) {
        self.state = PlayerState::Stopped;
        self.current = 0;
        self.position = PlaybackPosition::none();
    }

    /// Handle an audio time update (seconds into the current chunk).
    /// When no timepoint matches, the previous position is kept.
    pub fn on_time_update(&mut self, time: f64) -> PlaybackPosition {
        if self.state != PlayerState::Playing {
            return self.position;
        }
        if let Some(token) = self
            .current_chunk()
            .and_then(|chunk| token_at(&chunk.timepoints, time))
        {
            self.position = PlaybackPosition::at(token);
        }
        self.position
    }

    /// Advance to the next queued chunk. At the end of the queue playback stops.
    pub fn on_chunk_ended(&mut self) -> Option<&AudioChunk> {
        if self.state == PlayerState::Stopped {
            return None;
        }
        if self.current + 1 < self.chunks.len() {
            self.current += 1;
            self.current_chunk()
        } else {
            self.stop();
            None
        }
    }
}
