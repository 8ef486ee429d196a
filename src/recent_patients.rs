//! Recently and frequently viewed patients.
//!
//! A bounded LRU list: viewing a patient moves it to the front, and the least recently
//! viewed entry is evicted once the capacity is exceeded. The list serializes to JSON so the
//! caller can keep it in whatever local storage it has.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentPatient {
    pub patient_id: i64,
    pub display_name: String,
    pub last_viewed_at: DateTime<Utc>,
    pub view_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentPatients {
    capacity: usize,
    /// Most recent first
    entries: VecDeque<RecentPatient>,
}

impl RecentPatients {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a chart view. Returns the evicted entry, if any.
    pub fn record_view(
        &mut self,
        patient_id: i64,
        display_name: &str,
        viewed_at: DateTime<Utc>,
    ) -> Option<RecentPatient> {
        let view_count = match self.entries.iter().position(|e| e.patient_id == patient_id) {
            Some(index) => self.entries.remove(index).map_or(1, |e| e.view_count.saturating_add(1)),
            None => 1,
        };

        self.entries.push_front(RecentPatient {
            patient_id,
            display_name: display_name.to_string(),
            last_viewed_at: viewed_at,
            view_count,
        });

        if self.entries.len() > self.capacity {
            let evicted = self.entries.pop_back();
            if let Some(entry) = &evicted {
                log::debug!("Evicting patient {} from recent patients", entry.patient_id);
            }
            evicted
        } else {
            None
        }
    }

    /// Most recently viewed first
    pub fn recent(&self) -> impl Iterator<Item = &RecentPatient> {
        self.entries.iter()
    }

    /// Up to `limit` entries by view count, most recent first among ties
    pub fn most_frequent(&self, limit: usize) -> Vec<&RecentPatient> {
        let mut entries: Vec<&RecentPatient> = self.entries.iter().collect();
        // Stable sort keeps recency order between equal counts
        entries.sort_by(|a, b| b.view_count.cmp(&a.view_count));
        entries.truncate(limit);
        entries
    }

    pub fn remove(&mut self, patient_id: i64) -> Option<RecentPatient> {
        let index = self.entries.iter().position(|e| e.patient_id == patient_id)?;
        self.entries.remove(index)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries)
    }

    /// Restore a stored list, trimmed to `capacity`
    pub fn from_json(json: &str, capacity: usize) -> Result<Self, serde_json::Error> {
        let stored: Vec<RecentPatient> = serde_json::from_str(json)?;
        let mut recent = Self::new(capacity);
        recent.entries = stored.into_iter().take(recent.capacity).collect();
        Ok(recent)
    }
}

impl Default for RecentPatients {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
