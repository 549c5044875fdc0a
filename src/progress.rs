//! Loss bookkeeping and progress reporting for training and testing

use std::time::Duration;

use log::{debug, info};

/// Receives progress from [`Network::train`](crate::Network::train) and
/// [`Network::test`](crate::Network::test)
///
/// The network only computes the numbers; presentation is up to the observer.
pub trait TrainingObserver {
    /// Called after every sample, skipped ones included
    fn on_sample(&mut self, _processed: usize, _elapsed: Duration, _expected: Option<usize>) {}

    fn on_epoch(&mut self, _epoch: usize, _summed_loss: f64, _processed: usize) {}

    fn on_test(&mut self, _summed_loss: f64, _processed: usize) {}
}

/// Ignores every callback
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl TrainingObserver for Silent {}

/// Reports through the `log` facade
#[derive(Debug, Clone, Copy)]
pub struct LogObserver {
    /// Emit a progress line every this many samples; `0` disables them
    pub report_every: usize,
}

impl Default for LogObserver {
    fn default() -> Self {
        LogObserver { report_every: 100 }
    }
}

impl TrainingObserver for LogObserver {
    fn on_sample(&mut self, processed: usize, elapsed: Duration, expected: Option<usize>) {
        if self.report_every == 0 || processed % self.report_every != 0 {
            return;
        }
        match expected {
            Some(total) => debug!("samples {processed}/{total}, elapsed {elapsed:.2?}"),
            None => debug!("samples {processed}, elapsed {elapsed:.2?}"),
        }
    }

    fn on_epoch(&mut self, epoch: usize, summed_loss: f64, processed: usize) {
        info!(
            "epoch {epoch}: loss {:.6} over {processed} samples",
            average(summed_loss, processed)
        );
    }

    fn on_test(&mut self, summed_loss: f64, processed: usize) {
        info!(
            "test: loss {:.6} over {processed} samples",
            average(summed_loss, processed)
        );
    }
}

fn average(summed: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        summed / count as f64
    }
}

/// Loss statistics of one training epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EpochStats {
    /// 1-based epoch number
    pub epoch: usize,
    pub summed_loss: f64,
    /// Samples that went through forward and backward passes
    pub samples: usize,
    pub min_loss: f64,
    pub max_loss: f64,
    /// Samples dropped because their forward pass diverged
    pub skipped: usize,
}

impl EpochStats {
    pub(crate) fn new(epoch: usize) -> Self {
        EpochStats {
            epoch,
            summed_loss: 0.0,
            samples: 0,
            min_loss: f64::INFINITY,
            max_loss: f64::NEG_INFINITY,
            skipped: 0,
        }
    }

    pub(crate) fn record(&mut self, loss: f64) {
        self.summed_loss += loss;
        self.samples += 1;
        self.min_loss = self.min_loss.min(loss);
        self.max_loss = self.max_loss.max(loss);
    }

    /// Samples seen, skipped ones included
    pub fn processed(&self) -> usize {
        self.samples + self.skipped
    }

    /// Mean loss over the trained samples; `0.0` for an empty epoch
    pub fn average(&self) -> f64 {
        average(self.summed_loss, self.samples)
    }
}

/// Loss statistics of a test pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestStats {
    pub summed_loss: f64,
    pub samples: usize,
    pub skipped: usize,
}

impl TestStats {
    pub fn average(&self) -> f64 {
        average(self.summed_loss, self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_stats_tracks_extremes() {
        let mut stats = EpochStats::new(1);
        for loss in [0.5, 0.25, 1.0] {
            stats.record(loss);
        }
        stats.skipped += 1;

        assert_eq!(stats.samples, 3);
        assert_eq!(stats.processed(), 4);
        assert_eq!(stats.min_loss, 0.25);
        assert_eq!(stats.max_loss, 1.0);
        assert!((stats.average() - 1.75 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_epoch_average() {
        assert_eq!(EpochStats::new(1).average(), 0.0);
        assert_eq!(TestStats::default().average(), 0.0);
    }
}
