use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::live::LiveAudioService;
use crate::live::StoredTranscript;
use crate::summarize::{Diagnosis, SummaryClient};

/// Shared application state for HTTP handlers
///
/// Accumulation vectors sit behind sync locks because the live session's
/// callbacks append to them from non-async context.
#[derive(Clone)]
pub struct AppState {
    /// The single live session this service hosts
    pub live: Arc<LiveAudioService>,

    /// Streaming summarizer shared by the summary routes
    pub summarizer: Arc<SummaryClient>,

    /// Reconciled transcripts accumulated since the last session start
    pub transcript: Arc<RwLock<Vec<StoredTranscript>>>,

    /// Assistant reply text, one entry per turn
    pub assistant_turns: Arc<RwLock<Vec<String>>>,

    /// Differential carried between diagnosis refreshes
    pub prev_diagnoses: Arc<RwLock<Vec<Diagnosis>>>,

    /// Transcript text last handed to the summarizer
    pub last_transcript: Arc<RwLock<String>>,

    /// Most recent out-of-band failure, surfaced in status
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(live: Arc<LiveAudioService>, summarizer: Arc<SummaryClient>) -> Self {
        Self {
            live,
            summarizer,
            transcript: Arc::new(RwLock::new(Vec::new())),
            assistant_turns: Arc::new(RwLock::new(Vec::new())),
            prev_diagnoses: Arc::new(RwLock::new(Vec::new())),
            last_transcript: Arc::new(RwLock::new(String::new())),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

pub(super) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(super) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
