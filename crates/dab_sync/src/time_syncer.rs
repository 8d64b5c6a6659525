use crate::error::Result;
use crate::sample_reader::{fast_magnitude, SampleReader};

#[derive(Debug, Clone)]
pub struct TimeSyncerSettings {
    /// The number of samples in the sliding window used to average the signal magnitude.
    pub window_size: usize,
    /// The amount of the long term signal level that the window average needs to fall below to detect the start of the NULL symbol.
    pub null_threshold_start: f32,
    /// The amount of the long term signal level that the window average needs to rise above to detect the end of the NULL symbol.
    /// This is higher than the start threshold so noise on the falling edge doesn't end the dip early.
    pub null_threshold_end: f32,
}

impl Default for TimeSyncerSettings {
    fn default() -> Self {
        Self {
            window_size: 50,
            null_threshold_start: 0.55,
            null_threshold_end: 0.75,
        }
    }
}

/// Outcome of a single attempt at locating the NULL symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// The reader is positioned just past the end of the NULL symbol.
    Established,
    /// The signal never dropped within a full frame.
    NoDipFound,
    /// The signal dropped but didn't recover within the NULL symbol period.
    NoEndOfDipFound,
}

/// Sliding window sum of the most recent magnitudes.
struct EnvelopeWindow {
    data: Vec<f32>,
    index: usize,
    sum: f32,
}

impl EnvelopeWindow {
    fn new(window_size: usize) -> Self {
        Self {
            data: vec![0.0; window_size],
            index: 0,
            sum: 0.0,
        }
    }

    /// Replaces the oldest magnitude without summing the whole window again.
    #[inline(always)]
    fn update(&mut self, magnitude: f32) {
        self.sum += magnitude - self.data[self.index];
        self.data[self.index] = magnitude;
        self.index = (self.index + 1) % self.data.len();
    }

    fn average(&self) -> f32 {
        self.sum / (self.data.len() as f32)
    }
}

/// Coarse time synchronisation by detecting the dip in signal energy during the NULL symbol.
/// Thresholds are relative to the long term signal level tracked by the [`SampleReader`].
pub struct TimeSyncer {
    pub settings: TimeSyncerSettings,
    /// The number of attempts that ended in each outcome.
    pub total_established: u32,
    pub total_no_dip: u32,
    pub total_no_end_of_dip: u32,
}

impl Default for TimeSyncer {
    fn default() -> Self {
        Self::new(TimeSyncerSettings::default())
    }
}

impl TimeSyncer {
    pub fn new(settings: TimeSyncerSettings) -> Self {
        assert!(settings.window_size > 0, "Sync window must hold at least one sample");
        assert!(settings.null_threshold_start <= settings.null_threshold_end, "NULL start threshold must not exceed end threshold");
        Self {
            settings,
            total_established: 0,
            total_no_dip: 0,
            total_no_end_of_dip: 0,
        }
    }

    /// Pulls samples from the reader until the start and end of a NULL symbol have been found.
    /// Every call starts from a fresh window, so a failed attempt can simply be retried.
    /// Cancellation of the reader is returned as an error and must not be retried.
    pub fn sync(&mut self, reader: &mut SampleReader, nb_null_period: usize, nb_frame_period: usize) -> Result<SyncState> {
        let state = self.find_null_symbol(reader, nb_null_period, nb_frame_period)?;
        match state {
            SyncState::Established => self.total_established += 1,
            SyncState::NoDipFound => self.total_no_dip += 1,
            SyncState::NoEndOfDipFound => self.total_no_end_of_dip += 1,
        }
        log::debug!("[time_syncer] {:?} at signal level {:.4}", state, reader.signal_level());
        Ok(state)
    }

    fn find_null_symbol(&self, reader: &mut SampleReader, nb_null_period: usize, nb_frame_period: usize) -> Result<SyncState> {
        let window_size = self.settings.window_size;
        let mut window = EnvelopeWindow::new(window_size);
        for _ in 0..window_size {
            window.update(fast_magnitude(reader.get_sample(0)?));
        }

        // Wait for the average to fall into the NULL symbol
        let mut counter: usize = 0;
        while window.average() > self.settings.null_threshold_start * reader.signal_level() {
            window.update(fast_magnitude(reader.get_sample(0)?));
            counter += 1;
            if counter > nb_frame_period {
                return Ok(SyncState::NoDipFound);
            }
        }

        // Wait for the average to recover after the NULL symbol
        counter = 0;
        while window.average() < self.settings.null_threshold_end * reader.signal_level() {
            window.update(fast_magnitude(reader.get_sample(0)?));
            counter += 1;
            if counter > nb_null_period + window_size {
                return Ok(SyncState::NoEndOfDipFound);
            }
        }

        Ok(SyncState::Established)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_keeps_running_sum() {
        let mut window = EnvelopeWindow::new(4);
        for x in [1.0, 2.0, 3.0, 4.0] {
            window.update(x);
        }
        assert_eq!(window.average(), 2.5);
        window.update(8.0);
        window.update(0.0);
        // Holds 3,4,8,0
        assert_eq!(window.average(), 3.75);
    }

    #[test]
    fn default_thresholds() {
        let syncer = TimeSyncer::default();
        assert_eq!(syncer.settings.window_size, 50);
        assert_eq!(syncer.settings.null_threshold_start, 0.55);
        assert_eq!(syncer.settings.null_threshold_end, 0.75);
    }
}
