use num::complex::Complex32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Gain control statistics reported by the device alongside each read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AgcStats {
    /// Gain applied by the tuner during the read.
    pub gain_db: f32,
    /// Number of samples that hit the converter rails since the last read.
    pub overloads: u32,
}

/// A tuner or sample source that produces normalised complex samples in \[-1,+1\].
pub trait DeviceHandler: Send {
    /// Non-blocking query of how many samples can be read right now.
    fn samples_available(&self) -> usize;

    /// Reads up to `buf.len()` samples without blocking and fills in the gain statistics of the read.
    /// Returns the number of samples written which can be less than requested.
    fn read_samples(&mut self, buf: &mut [Complex32], stats: &mut AgcStats) -> usize;

    /// Resolution of the converter. Used to scale samples back to integers when recording.
    fn bit_depth(&self) -> u32;

    /// Whether the device will never produce more samples than are currently available.
    fn is_closed(&self) -> bool {
        false
    }

    /// Most samples the device can hold at once, if it is bounded.
    /// Reads never wait for more than this.
    fn capacity(&self) -> Option<usize> {
        None
    }

    /// Blocks for at most `timeout` until `count` samples are available.
    /// Returns the number of samples available afterwards.
    /// Devices that are fed by a producer should override this to wake up as soon as samples arrive.
    fn wait_for_samples(&self, count: usize, timeout: Duration) -> usize {
        let available = self.samples_available();
        if available >= count {
            return available;
        }
        std::thread::sleep(timeout);
        self.samples_available()
    }
}

/// Receives the gain statistics of every device read on the reading thread.
pub trait GainProcessor: Send {
    fn process_gain(&mut self, stats: &AgcStats, nb_samples: usize);
}

/// Totals collected by an [`AgcMonitor`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AgcSummary {
    pub total_reads: u64,
    pub total_samples: u64,
    pub total_overloads: u64,
    pub last_gain_db: f32,
}

/// Gain processor that keeps running totals which can be inspected from another thread.
#[derive(Clone, Default)]
pub struct AgcMonitor {
    summary: Arc<Mutex<AgcSummary>>,
}

impl AgcMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> AgcSummary {
        *self.summary.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GainProcessor for AgcMonitor {
    fn process_gain(&mut self, stats: &AgcStats, nb_samples: usize) {
        let summary = &mut *self.summary.lock().unwrap_or_else(PoisonError::into_inner);
        summary.total_reads += 1;
        summary.total_samples += nb_samples as u64;
        summary.total_overloads += stats.overloads as u64;
        summary.last_gain_db = stats.gain_db;
        if stats.overloads > 0 {
            log::debug!("[agc] {} overloads in read of {} samples at {:.1}dB", stats.overloads, nb_samples, stats.gain_db);
        }
    }
}
