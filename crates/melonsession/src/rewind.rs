//! Rolling rewind history.
//!
//! Every `frames_per_capture` frames the session saves the core into an
//! in-memory checkpoint together with a copy of the display texture. The
//! window is bounded twice: by `window_seconds / period_seconds` entries and
//! by a memory budget divided by the size of one entry. Oldest entries are
//! evicted first, and their buffers are recycled for the next capture.

use std::collections::VecDeque;

use melonconf::RewindConfig;
use tracing::{debug, info};

use crate::core::EmulatorCore;
use crate::savestate::{MemoryTarget, SavestateManager, TransactionError};

/// One checkpoint in the window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewindEntry {
    frame: u64,
    state: Vec<u8>,
    thumbnail: Vec<u32>,
}

impl RewindEntry {
    /// Frame counter value when the checkpoint was taken.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Opaque core state blob.
    pub fn state(&self) -> &[u8] {
        &self.state
    }

    /// Copy of the display texture (top screen then bottom screen).
    pub fn thumbnail(&self) -> &[u32] {
        &self.thumbnail
    }

    /// Bytes held by this entry.
    pub fn size_bytes(&self) -> usize {
        self.state.len() + self.thumbnail.len() * std::mem::size_of::<u32>()
    }
}

/// Capture cadence and bounds derived from [`RewindConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RewindPolicy {
    /// Frames between checkpoints; 0 disables capture.
    pub frames_per_capture: u64,
    /// Maximum entries kept.
    pub capacity: usize,
    /// Memory budget for all entries.
    pub max_memory_bytes: usize,
}

impl RewindPolicy {
    /// Convert a seconds-based config into frames using the core's frame rate.
    pub fn from_config(config: &RewindConfig, frames_per_second: f32) -> Self {
        if !config.enabled || config.period_seconds == 0 {
            return Self::disabled();
        }

        let frames_per_capture = (config.period_seconds as f32 * frames_per_second).round() as u64;

        Self {
            frames_per_capture,
            capacity: config.capacity(),
            max_memory_bytes: config.max_memory_bytes,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.frames_per_capture > 0 && self.capacity > 0
    }

    /// True exactly on frames that are positive multiples of the capture spacing.
    pub fn should_capture(&self, frame: u64) -> bool {
        self.is_enabled() && frame > 0 && frame % self.frames_per_capture == 0
    }
}

/// Errors from restoring a checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum RewindError {
    #[error("no rewind entry at index {index} (window holds {len})")]
    NoSuchEntry { index: usize, len: usize },

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Bounded, frame-ordered checkpoint window.
#[derive(Debug, Default)]
pub struct RewindWindow {
    entries: VecDeque<RewindEntry>,
    policy: RewindPolicy,
    /// One evicted entry kept around so its buffers can be reused.
    spare: Option<RewindEntry>,
}

impl RewindWindow {
    pub fn new(policy: RewindPolicy) -> Self {
        Self {
            entries: VecDeque::with_capacity(policy.capacity),
            policy,
            spare: None,
        }
    }

    pub fn policy(&self) -> RewindPolicy {
        self.policy
    }

    /// Apply a new policy. Disabling clears the window; shrinking trims it
    /// from the oldest end.
    pub fn set_policy(&mut self, policy: RewindPolicy) {
        let previous = self.policy;
        self.policy = policy;

        if !policy.is_enabled() {
            if previous.is_enabled() {
                info!("rewind disabled, dropping {} checkpoints", self.entries.len());
            }
            self.reset();
            return;
        }

        let evicted = self.trim_to_capacity(self.effective_capacity());
        if evicted > 0 {
            info!(
                "rewind window shrunk to {} entries ({} evicted)",
                self.entries.len(),
                evicted
            );
        }
    }

    pub fn should_capture(&self, frame: u64) -> bool {
        self.policy.should_capture(frame)
    }

    /// Capacity after applying the memory budget to the current entry size.
    pub fn effective_capacity(&self) -> usize {
        let by_count = self.policy.capacity;
        let entry_bytes = self.entries.back().map(RewindEntry::size_bytes).unwrap_or(0);
        if entry_bytes == 0 || self.policy.max_memory_bytes == 0 {
            return by_count;
        }
        let by_memory = (self.policy.max_memory_bytes / entry_bytes).max(1);
        by_count.min(by_memory)
    }

    /// Save the core into the next slot and copy `texture` as its thumbnail.
    ///
    /// Best effort: a failed serialization drops the capture and leaves the
    /// window as it was. Returns whether an entry was added.
    pub fn capture<C>(
        &mut self,
        manager: &mut SavestateManager,
        core: &mut C,
        frame: u64,
        texture: &[u32],
    ) -> bool
    where
        C: EmulatorCore + ?Sized,
    {
        let capacity = self.effective_capacity();
        if capacity == 0 {
            return false;
        }

        // Reuse the oldest slot when full, otherwise the spare, otherwise allocate.
        let recycled_oldest = self.entries.len() >= capacity;
        let mut slot = if recycled_oldest {
            self.entries.pop_front().unwrap_or_default()
        } else {
            self.spare.take().unwrap_or_default()
        };

        let mut target = MemoryTarget::from(std::mem::take(&mut slot.state));
        let saved = manager.save(core, &mut target);
        slot.state = target.into_inner();

        if let Err(e) = saved {
            debug!("rewind capture at frame {} dropped: {}", frame, e);
            if recycled_oldest {
                self.entries.push_front(slot);
            } else {
                self.spare = Some(slot);
            }
            return false;
        }

        slot.frame = frame;
        slot.thumbnail.clear();
        slot.thumbnail.extend_from_slice(texture);

        // Keep frames strictly increasing.
        while self.entries.back().is_some_and(|e| e.frame >= frame) {
            if let Some(stale) = self.entries.pop_back() {
                self.recycle(stale);
            }
        }

        self.entries.push_back(slot);
        self.trim_to_capacity(self.effective_capacity());

        debug!(
            "rewind checkpoint at frame {} ({} entries)",
            frame,
            self.entries.len()
        );
        true
    }

    /// Load checkpoint `index` into the core and drop every newer entry.
    ///
    /// Returns the frame number the session should resume from. On failure
    /// the core is rolled back and the window is left untouched.
    pub fn restore<C>(
        &mut self,
        manager: &mut SavestateManager,
        core: &mut C,
        index: usize,
    ) -> Result<u64, RewindError>
    where
        C: EmulatorCore + ?Sized,
    {
        let entry = self.entries.get(index).ok_or(RewindError::NoSuchEntry {
            index,
            len: self.entries.len(),
        })?;

        let copy = MemoryTarget::from(entry.state.clone());
        let frame = entry.frame;
        manager.load(core, &copy)?;

        while self.entries.len() > index + 1 {
            if let Some(newer) = self.entries.pop_back() {
                self.recycle(newer);
            }
        }

        info!("rewound to frame {} ({} entries remain)", frame, self.entries.len());
        Ok(frame)
    }

    /// Evict oldest entries until at most `capacity` remain. Returns how many
    /// were evicted.
    pub fn trim_to_capacity(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > capacity {
            if let Some(oldest) = self.entries.pop_front() {
                self.recycle(oldest);
                evicted += 1;
            }
        }
        evicted
    }

    /// Drop every checkpoint and any recycled buffers.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.spare = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RewindEntry> {
        self.entries.get(index)
    }

    /// Oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &RewindEntry> {
        self.entries.iter()
    }

    pub fn memory_usage(&self) -> usize {
        self.entries.iter().map(RewindEntry::size_bytes).sum()
    }

    fn recycle(&mut self, entry: RewindEntry) {
        if self.spare.is_none() {
            self.spare = Some(entry);
        }
    }
}
