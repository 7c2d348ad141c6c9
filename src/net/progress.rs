//! Throttled progress accounting for streaming downloads.

use std::time::{Duration, Instant};

/// Tracks bytes through a transfer and decides when a progress event is due.
/// Events are produced no more often than the configured interval.
pub(crate) struct ProgressTracker {
    total: i64,
    downloaded: i64,
    interval: Duration,
    last_report: Instant,
    last_bytes: i64,
}

/// One progress sample: percentage, instantaneous speed, and an ETA when the
/// total size is known.
pub(crate) struct ProgressSample {
    pub downloaded: i64,
    pub total: i64,
    pub percentage: f64,
    pub bytes_per_sec: f64,
    pub eta: Option<Duration>,
}

impl ProgressTracker {
    pub(crate) fn new(total: i64, interval: Duration) -> Self {
        let now = Instant::now();
        Self { total, downloaded: 0, interval, last_report: now, last_bytes: 0 }
    }

    /// Record `n` new bytes. Returns a sample when the reporting interval
    /// has elapsed since the last one.
    pub(crate) fn advance(&mut self, n: usize) -> Option<ProgressSample> {
        self.downloaded += n as i64;

        let now = Instant::now();
        let since = now.duration_since(self.last_report);
        if since < self.interval {
            return None;
        }

        let delta_bytes = self.downloaded - self.last_bytes;
        let speed = delta_bytes as f64 / since.as_secs_f64();

        let percentage = if self.total > 0 {
            ((self.downloaded as f64 / self.total as f64) * 100.0).min(100.0)
        } else {
            0.0
        };

        let eta = if self.total > 0 && speed > 0.0 {
            let remaining = (self.total - self.downloaded).max(0) as f64;
            Some(Duration::from_secs_f64(remaining / speed))
        } else {
            None
        };

        self.last_report = now;
        self.last_bytes = self.downloaded;

        Some(ProgressSample {
            downloaded: self.downloaded,
            total: self.total,
            percentage,
            bytes_per_sec: speed,
            eta,
        })
    }

    pub(crate) fn downloaded(&self) -> i64 {
        self.downloaded
    }
}

/// Human-friendly `bytes/s` with an optional ETA, for notification messages.
pub(crate) fn format_rate(sample: &ProgressSample) -> String {
    let rate = human_bytes(sample.bytes_per_sec);
    match sample.eta {
        Some(eta) => format!("{rate}/s, ETA {}s", eta.as_secs()),
        None => format!("{rate}/s"),
    }
}

fn human_bytes(value: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut v = value.max(0.0);
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    format!("{v:.1} {}", UNITS[unit])
}
