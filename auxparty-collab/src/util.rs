use std::fmt::Debug;
use std::marker::PhantomData;

use crossbeam::atomic::AtomicCell;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Matches a canonical Spotify track uri, like `spotify:track:4uLU6hMCjMI75M1A2tKUQC`
    pub static ref TRACK_URI_REGEX: Regex =
        Regex::new(r"^spotify:track:[0-9A-Za-z]{22}$").expect("regex compiles");
}

/// Returns true if the given string is a valid track uri
pub fn is_track_uri(uri: &str) -> bool {
    TRACK_URI_REGEX.is_match(uri)
}

static ID_COUNTER: AtomicCell<u64> = AtomicCell::new(1);

/// A process-unique id, tagged with the type it identifies.
///
/// Used for ephemeral things like connections, which have no persisted key.
pub struct Id<T> {
    value: u64,
    kind: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new() -> Self {
        Self {
            value: ID_COUNTER.fetch_add(1),
            kind: PhantomData,
        }
    }
}

// Derives would put bounds on T, which is only a tag
impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}
impl<T> Eq for Id<T> {}
