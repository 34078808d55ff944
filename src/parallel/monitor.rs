//! Wall-clock timing of named provisioning phases

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    start_times: HashMap<String, Instant>,
    durations: Vec<(String, Duration)>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, operation: &str) {
        info!("Starting: {}", operation);
        self.start_times.insert(operation.to_string(), Instant::now());
    }

    /// Stop timing `operation` and return its duration. Returns zero for an
    /// operation that was never started.
    pub fn end(&mut self, operation: &str) -> Duration {
        let Some(started) = self.start_times.remove(operation) else {
            return Duration::ZERO;
        };

        let duration = started.elapsed();
        info!("Completed: {} in {:?}", operation, duration);
        self.durations.retain(|(name, _)| name != operation);
        self.durations.push((operation.to_string(), duration));
        duration
    }

    pub fn duration(&self, operation: &str) -> Option<Duration> {
        self.durations
            .iter()
            .find(|(name, _)| name == operation)
            .map(|(_, duration)| *duration)
    }

    /// Time an async operation
    pub async fn timed<F, T>(&mut self, operation: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.start(operation);
        let output = fut.await;
        self.end(operation);
        output
    }

    pub fn total(&self) -> Duration {
        self.durations.iter().map(|(_, duration)| *duration).sum()
    }

    /// Render completed operations in completion order with a total line
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if self.durations.is_empty() {
            return out;
        }

        out.push_str(&format!("{:<30} {}\n", "Operation", "Duration"));
        out.push_str(&format!("{:<30} {}\n", "---------", "--------"));
        for (operation, duration) in &self.durations {
            out.push_str(&format!("{:<30} {:?}\n", operation, duration));
        }
        out.push_str(&format!("{:<30} {}\n", "---------", "--------"));
        out.push_str(&format!("{:<30} {:?}\n", "Total Time", self.total()));
        out
    }

    pub fn log_summary(&self) {
        if !self.durations.is_empty() {
            info!("Performance summary:\n{}", self.summary());
        }
    }
}
