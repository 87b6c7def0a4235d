//! Product analytics intake.
//!
//! Events are logged under the `analytics` tracing target and counted in
//! memory; counters reset with the process.

pub mod handlers;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureUsage {
    pub feature: String,
    pub usage: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub total_events: u64,
    pub conversions: u64,
    pub conversions_by_type: HashMap<String, u64>,
    pub top_features: Vec<FeatureUsage>,
    pub event_counts: HashMap<String, u64>,
}

#[derive(Debug, Default)]
struct Counters {
    events: HashMap<String, u64>,
    conversions: HashMap<String, u64>,
    features: HashMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct AnalyticsRecorder {
    counters: Mutex<Counters>,
}

/// Number of features listed on the dashboard.
pub const TOP_FEATURES: usize = 5;

impl AnalyticsRecorder {
    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_event(&self, name: &str) {
        *self.lock().events.entry(name.to_string()).or_default() += 1;
    }

    pub fn record_conversion(&self, kind: &str) {
        *self.lock().conversions.entry(kind.to_string()).or_default() += 1;
    }

    pub fn record_feature(&self, feature: &str) {
        *self.lock().features.entry(feature.to_string()).or_default() += 1;
    }

    /// Features by usage, most used first; ties ordered by name.
    pub fn popular_features(&self) -> Vec<FeatureUsage> {
        let counters = self.lock();
        let mut features: Vec<FeatureUsage> = counters
            .features
            .iter()
            .map(|(feature, usage)| FeatureUsage {
                feature: feature.clone(),
                usage: *usage,
            })
            .collect();
        drop(counters);
        features.sort_by(|a, b| b.usage.cmp(&a.usage).then_with(|| a.feature.cmp(&b.feature)));
        features
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        let mut top_features = self.popular_features();
        top_features.truncate(TOP_FEATURES);

        let counters = self.lock();
        AnalyticsSnapshot {
            total_events: counters.events.values().sum(),
            conversions: counters.conversions.values().sum(),
            conversions_by_type: counters.conversions.clone(),
            top_features,
            event_counts: counters.events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_events_by_name() {
        let recorder = AnalyticsRecorder::default();
        recorder.record_event("page_view");
        recorder.record_event("page_view");
        recorder.record_event("demo_start");

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.event_counts["page_view"], 2);
        assert_eq!(snapshot.event_counts["demo_start"], 1);
    }

    #[test]
    fn test_popular_features_sorted_descending() {
        let recorder = AnalyticsRecorder::default();
        for _ in 0..3 {
            recorder.record_feature("file_upload");
        }
        recorder.record_feature("demo_mode");
        recorder.record_feature("ai_analysis");
        recorder.record_feature("ai_analysis");

        let features = recorder.popular_features();
        let names: Vec<&str> = features.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(names, vec!["file_upload", "ai_analysis", "demo_mode"]);
        assert_eq!(features[0].usage, 3);
    }

    #[test]
    fn test_snapshot_caps_top_features() {
        let recorder = AnalyticsRecorder::default();
        for i in 0..(TOP_FEATURES + 3) {
            recorder.record_feature(&format!("feature_{i}"));
        }
        assert_eq!(recorder.snapshot().top_features.len(), TOP_FEATURES);
        assert_eq!(recorder.popular_features().len(), TOP_FEATURES + 3);
    }

    #[test]
    fn test_conversions_totalled_across_types() {
        let recorder = AnalyticsRecorder::default();
        recorder.record_conversion("signup_complete");
        recorder.record_conversion("upgrade");
        recorder.record_conversion("upgrade");

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.conversions, 3);
        assert_eq!(snapshot.conversions_by_type["upgrade"], 2);
    }
}
