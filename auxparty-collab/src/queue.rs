use std::collections::HashSet;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::{PrimaryKey, SongData, TrackHit};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Song is not in the queue")]
    SongNotFound,
    #[error("Index {0} is out of bounds")]
    OutOfBounds(usize),
}

/// The authoritative queue and vote tally of a single room.
///
/// Every mutation goes through the inner lock, so concurrent calls for the
/// same room apply one at a time in arrival order, and the "one entry per
/// uri" and "votes == voter set size" invariants hold by construction.
pub struct VoteQueue {
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: Vec<QueueEntry>,
    currently_playing: Option<usize>,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    uri: String,
    metadata: SongMetadata,
    /// Who voted for this song. The tally is always derived from this set.
    voters: HashSet<PrimaryKey>,
}

/// Display metadata carried along with a song, opaque to the engine
#[derive(Debug, Clone)]
pub struct SongMetadata {
    pub title: String,
    pub artist: String,
    pub artwork: Option<String>,
}

/// A song as it appears in events and snapshots
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SerializedSong {
    pub uri: String,
    pub title: String,
    pub artist: String,
    pub artwork: Option<String>,
    pub votes: usize,
}

impl From<TrackHit> for SongMetadata {
    fn from(hit: TrackHit) -> Self {
        Self {
            title: hit.title,
            artist: hit.artist,
            artwork: hit.artwork,
        }
    }
}

impl QueueEntry {
    fn serialized(&self) -> SerializedSong {
        SerializedSong {
            uri: self.uri.clone(),
            title: self.metadata.title.clone(),
            artist: self.metadata.artist.clone(),
            artwork: self.metadata.artwork.clone(),
            votes: self.voters.len(),
        }
    }
}

impl QueueState {
    /// Re-sorts every entry after the pinned position by descending vote
    /// count. The sort is stable, so ties keep their insertion order.
    ///
    /// The pin is the currently playing entry, or the head when nothing is
    /// playing yet, since the head is the next thing to play.
    fn resort(&mut self) {
        let pin = self.currently_playing.unwrap_or(0);
        let tail = pin + 1;

        if tail < self.entries.len() {
            self.entries[tail..].sort_by(|a, b| b.voters.len().cmp(&a.voters.len()));
        }
    }

    fn serialized(&self) -> Vec<SerializedSong> {
        self.entries.iter().map(|e| e.serialized()).collect()
    }
}

impl VoteQueue {
    pub fn new() -> Self {
        Self {
            state: Default::default(),
        }
    }

    /// Restores a queue from its persisted form
    pub fn from_data(songs: Vec<SongData>) -> Self {
        let entries = songs
            .into_iter()
            .map(|s| QueueEntry {
                uri: s.uri,
                metadata: SongMetadata {
                    title: s.title,
                    artist: s.artist,
                    artwork: s.artwork,
                },
                voters: s.voters.into_iter().collect(),
            })
            .collect();

        Self {
            state: Mutex::new(QueueState {
                entries,
                currently_playing: None,
            }),
        }
    }

    /// Appends a song with zero votes at the tail of the queue.
    ///
    /// Adding a uri that is already queued is a no-op, and the existing entry
    /// is returned so the caller can still surface a "song added" event.
    pub fn add_song(&self, uri: String, metadata: SongMetadata) -> SerializedSong {
        let mut state = self.state.lock();

        if let Some(existing) = state.entries.iter().find(|e| e.uri == uri) {
            return existing.serialized();
        }

        let entry = QueueEntry {
            uri,
            metadata,
            voters: Default::default(),
        };

        let serialized = entry.serialized();
        state.entries.push(entry);

        serialized
    }

    /// Registers a vote and returns the reordered queue.
    ///
    /// A user voting twice for the same song is a no-op, not an error.
    pub fn add_vote(&self, user_id: &str, uri: &str) -> Result<Vec<SerializedSong>, QueueError> {
        let mut state = self.state.lock();

        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.uri == uri)
            .ok_or(QueueError::SongNotFound)?;

        entry.voters.insert(user_id.to_string());

        state.resort();
        Ok(state.serialized())
    }

    /// Moves the playback pointer, after validating it lands in the queue
    pub fn set_currently_playing(&self, index: usize) -> Result<(), QueueError> {
        let mut state = self.state.lock();

        if index >= state.entries.len() {
            return Err(QueueError::OutOfBounds(index));
        }

        state.currently_playing = Some(index);
        Ok(())
    }

    pub fn currently_playing(&self) -> Option<usize> {
        self.state.lock().currently_playing
    }

    /// First-occurrence lookup of a uri. Duplicates are possible across queue
    /// rebuilds, so the earliest match wins.
    pub fn position_of_first(&self, uri: &str) -> Option<usize> {
        self.state
            .lock()
            .entries
            .iter()
            .position(|e| e.uri == uri)
    }

    pub fn songs(&self) -> Vec<SerializedSong> {
        self.state.lock().serialized()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// The queue in its persisted form
    pub fn to_data(&self) -> Vec<SongData> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|e| SongData {
                uri: e.uri.clone(),
                title: e.metadata.title.clone(),
                artist: e.metadata.artist.clone(),
                artwork: e.metadata.artwork.clone(),
                voters: e.voters.iter().cloned().collect(),
            })
            .collect()
    }
}

impl Default for VoteQueue {
    fn default() -> Self {
        Self::new()
    }
}
