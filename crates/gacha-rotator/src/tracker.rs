//! Picks the next wallpaper so that nothing repeats within a cycle.
//!
//! Every local image has one history row with a `shown` flag. Selection
//! draws uniformly from the unshown rows; once all rows are shown the flags
//! are cleared and a new cycle starts. The flag is persisted before the
//! caller tries to display the image, so a crash in between never makes the
//! same image come straight back.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use gacha_store::{HistoryStore, StoreError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::RotatorError;

pub struct RotationTracker<R: Rng = StdRng> {
    history: HistoryStore,
    rng: R,
}

impl RotationTracker<StdRng> {
    pub fn new(history: HistoryStore) -> Self {
        Self::with_rng(history, StdRng::from_entropy())
    }
}

impl<R: Rng> RotationTracker<R> {
    pub fn with_rng(history: HistoryStore, rng: R) -> Self {
        Self { history, rng }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Make the history match the files present locally. Returns the names
    /// that were new.
    pub fn sync_local_inventory(
        &mut self,
        present: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Result<BTreeSet<String>, RotatorError> {
        let delta = self.history.reconcile(present, now)?;
        if !delta.is_empty() {
            info!(
                added = delta.added.len(),
                removed = delta.removed.len(),
                "Local inventory changed"
            );
        }
        Ok(delta.added)
    }

    /// Choose the next image and mark it shown.
    pub fn select_next(&mut self, now: DateTime<Utc>) -> Result<String, RotatorError> {
        let mut candidates = self.history.unshown()?;

        if candidates.is_empty() {
            if self.history.count()? == 0 {
                return Err(RotatorError::NoImagesAvailable);
            }
            let reset = self.history.start_new_cycle(now)?;
            let cycle = self.history.rotation_state()?.cycle;
            info!(reset, cycle, "Every image shown, starting a new cycle");
            candidates = self.history.unshown()?;
        }

        let chosen = candidates
            .choose(&mut self.rng)
            .cloned()
            .ok_or(RotatorError::NoImagesAvailable)?;

        if !self.history.mark_shown(&chosen, now)? {
            return Err(StoreError::NotFound.into());
        }

        debug!(file = %chosen, remaining = candidates.len() - 1, "Selected image");
        Ok(chosen)
    }
}
