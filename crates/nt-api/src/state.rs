//! Application state management

use nt_core::config::AppConfig;
use nt_core::NtError;
use nt_pipeline::FilterPipeline;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// The query parser
    pub pipeline: Arc<FilterPipeline>,
    /// Server start time
    pub start_time: Instant,
    /// Parse requests received
    pub request_count: AtomicU64,
    /// Requests rejected as too vague
    pub vague_count: AtomicU64,
    /// Requests that failed inside the pipeline
    pub failure_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: FilterPipeline) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            vague_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
        }
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Count a pipeline error against the matching counter
    pub fn record_error(&self, err: &NtError) {
        match err {
            NtError::VagueQuery => {
                self.vague_count.fetch_add(1, Ordering::SeqCst);
            }
            err if err.is_rejection() => {}
            _ => {
                self.failure_count.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn get_vague_count(&self) -> u64 {
        self.vague_count.load(Ordering::SeqCst)
    }

    pub fn get_failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppConfig::default(), FilterPipeline::rules())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_counters() {
        let state = AppState::default();
        state.record_error(&NtError::VagueQuery);
        state.record_error(&NtError::InvalidQuery("empty".into()));
        state.record_error(&NtError::Extraction("no candidate".into()));

        assert_eq!(state.get_vague_count(), 1);
        assert_eq!(state.get_failure_count(), 1);
    }
}
