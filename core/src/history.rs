use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::coherence::{CoherenceMetrics, CoherenceState};

pub const DEFAULT_HISTORY_CAPACITY: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct CoherenceReading {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    pub state: CoherenceState,
    pub in_corridor: bool,
}

/// Rolling window of coherence readings for one session. Owned by the caller
/// and passed in explicitly; the calculator itself keeps no state.
#[derive(Debug, Clone)]
pub struct CoherenceHistory {
    capacity: usize,
    readings: VecDeque<CoherenceReading>,
}

impl Default for CoherenceHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl CoherenceHistory {
    /// A capacity of zero is bumped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            readings: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a reading, evicting the oldest one when full.
    pub fn record(&mut self, metrics: &CoherenceMetrics, timestamp: DateTime<Utc>) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(CoherenceReading {
            timestamp,
            score: metrics.score,
            state: metrics.state,
            in_corridor: metrics.in_corridor,
        });
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&CoherenceReading> {
        self.readings.back()
    }

    pub fn readings(&self) -> impl Iterator<Item = &CoherenceReading> {
        self.readings.iter()
    }

    pub fn mean_score(&self) -> Option<f64> {
        if self.readings.is_empty() {
            return None;
        }
        let total: f64 = self.readings.iter().map(|r| r.score).sum();
        Some(total / self.readings.len() as f64)
    }

    /// Share of readings inside the corridor.
    pub fn corridor_ratio(&self) -> Option<f64> {
        if self.readings.is_empty() {
            return None;
        }
        let inside = self.readings.iter().filter(|r| r.in_corridor).count();
        Some(inside as f64 / self.readings.len() as f64)
    }

    /// Latest score minus oldest score. Needs at least two readings.
    pub fn trend(&self) -> Option<f64> {
        if self.readings.len() < 2 {
            return None;
        }
        let first = self.readings.front()?;
        let last = self.readings.back()?;
        Some(last.score - first.score)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::coherence::{CoherenceComponents, CoherenceConfidence, classify};
    use crate::config::{COHERENCE_LOWER_BOUND, COHERENCE_UPPER_BOUND};

    fn metrics(score: f64) -> CoherenceMetrics {
        CoherenceMetrics {
            score,
            confidence: CoherenceConfidence::High,
            state: classify(score),
            components: CoherenceComponents {
                orientation: 1.0,
                interrupt_cost: 0.0,
                volatility: 0.0,
                drift: 0.0,
                contradiction_rate: 0.0,
            },
            in_corridor: (COHERENCE_LOWER_BOUND..=COHERENCE_UPPER_BOUND).contains(&score),
        }
    }

    #[test]
    fn empty_history_has_no_aggregates() {
        let history = CoherenceHistory::default();
        assert!(history.is_empty());
        assert_eq!(history.capacity(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(history.mean_score(), None);
        assert_eq!(history.corridor_ratio(), None);
        assert_eq!(history.trend(), None);
        assert!(history.latest().is_none());
    }

    #[test]
    fn oldest_reading_is_evicted_at_capacity() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut history = CoherenceHistory::with_capacity(3);
        for (i, score) in [0.1, 0.2, 0.3, 0.4].into_iter().enumerate() {
            history.record(&metrics(score), start + Duration::minutes(i as i64));
        }

        assert_eq!(history.len(), 3);
        let scores: Vec<f64> = history.readings().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.2, 0.3, 0.4]);
        assert_eq!(history.latest().unwrap().timestamp, start + Duration::minutes(3));
    }

    #[test]
    fn aggregates_over_readings() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut history = CoherenceHistory::with_capacity(10);
        for score in [0.5, 0.62, 0.65, 0.75] {
            history.record(&metrics(score), now);
        }

        assert!((history.mean_score().unwrap() - 0.63).abs() < 1e-12);
        assert_eq!(history.corridor_ratio(), Some(0.5));
        assert!((history.trend().unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn zero_capacity_keeps_one_reading() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut history = CoherenceHistory::with_capacity(0);
        history.record(&metrics(0.3), now);
        history.record(&metrics(0.64), now);
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().state, CoherenceState::Coherent);
    }
}
