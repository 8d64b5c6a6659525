use crate::device_handler::{AgcStats, DeviceHandler, GainProcessor};
use crate::dump_sink::DumpSink;
use crate::error::{Result, SyncError};
use crate::linear_bucket::LinearBucket;
use crate::oscillator_table::OscillatorTable;
use crate::spectrum_buffer::SpectrumBuffer;
use num::complex::Complex32;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SampleReaderSettings {
    /// The number of samples the device must hold before a read is allowed through.
    /// Reads smaller than this still wait for this many samples.
    pub low_water_mark: usize,
    /// The longest time a starved read blocks before checking the running flag again.
    pub poll_interval: Duration,
    /// The rate at which to update the long term signal level.
    /// This is a number from 0 to 1 where 1 is the fastest update rate.
    pub signal_level_alpha: f32,
    /// The number of corrector and signal level notifications per second of input.
    pub updates_per_second: usize,
    /// The number of raw samples captured for the spectrum display in each notification period.
    pub display_window: usize,
    /// The number of interleaved 16bit values buffered before they are written to the dump sink.
    pub dump_block_size: usize,
}

impl Default for SampleReaderSettings {
    fn default() -> Self {
        Self {
            low_water_mark: 2048,
            poll_interval: Duration::from_micros(10),
            signal_level_alpha: 1e-5,
            updates_per_second: 5,
            display_window: 512,
            dump_block_size: 4096,
        }
    }
}

/// Periodic telemetry emitted while samples are being pulled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReaderEvent {
    /// The phase offset in Hz used for the most recent sample.
    CorrectorChanged(i32),
    /// The current long term signal level.
    SignalLevel(f32),
}

struct DumpState {
    sink: Box<dyn DumpSink>,
    buffer: LinearBucket<i16>,
}

impl DumpState {
    fn flush(&mut self) -> Result<()> {
        if self.buffer.length() > 0 {
            self.sink.write_frames(self.buffer.as_slice())?;
        }
        self.buffer.reset();
        Ok(())
    }
}

/// State shared between the reading thread and controller threads.
struct SharedState {
    is_running: AtomicBool,
    /// Bit pattern of an f32 so it can be read without locking.
    signal_level: AtomicU32,
    /// Checked before locking the dump state so an idle reader never takes the lock.
    is_dumping: AtomicBool,
    dump: Mutex<Option<DumpState>>,
    dump_block_size: usize,
}

impl SharedState {
    fn lock_dump(&self) -> MutexGuard<'_, Option<DumpState>> {
        self.dump.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_dumping(&self) -> Result<()> {
        let state = {
            let mut dump = self.lock_dump();
            self.is_dumping.store(false, Ordering::Release);
            dump.take()
        };
        let Some(mut state) = state else {
            return Ok(());
        };
        let flush_result = state.flush();
        let finalize_result = state.sink.finalize();
        flush_result.and(finalize_result)
    }
}

/// Handle to control a [`SampleReader`] from other threads.
#[derive(Clone)]
pub struct SampleReaderControl {
    shared: Arc<SharedState>,
}

impl SampleReaderControl {
    /// Clearing the running flag makes every pending and future read return [`SyncError::Cancelled`]
    /// within one poll interval.
    pub fn set_running(&self, is_running: bool) {
        self.shared.is_running.store(is_running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::Acquire)
    }

    pub fn signal_level(&self) -> f32 {
        f32::from_bits(self.shared.signal_level.load(Ordering::Relaxed))
    }

    /// Starts recording every sample pulled from the device into the sink.
    /// A sink that was already installed is flushed and finalised first.
    pub fn start_dumping(&self, sink: Box<dyn DumpSink>) -> Result<()> {
        let previous = {
            let mut dump = self.shared.lock_dump();
            let previous = dump.replace(DumpState {
                sink,
                buffer: LinearBucket::new(self.shared.dump_block_size),
            });
            self.shared.is_dumping.store(true, Ordering::Release);
            previous
        };
        if let Some(mut state) = previous {
            log::warn!("[sample_reader] Replacing active dump sink");
            state.flush()?;
            state.sink.finalize()?;
        }
        Ok(())
    }

    /// Stops recording. Buffered frames are written before the sink is finalised,
    /// so the sink holds exactly the samples pulled while it was installed.
    pub fn stop_dumping(&self) -> Result<()> {
        self.shared.stop_dumping()
    }

    pub fn is_dumping(&self) -> bool {
        self.shared.is_dumping.load(Ordering::Acquire)
    }
}

/// Turns the raw device stream into a frequency corrected stream.
///
/// Reads block while the device is starved which paces the consumer to the rate of the device.
/// Each sample is multiplied by the oscillator at the current phase, which moves by the requested
/// offset on every sample. A long term signal level is tracked for the NULL symbol detector.
pub struct SampleReader {
    /// Read only after construction.
    settings: SampleReaderSettings,
    device: Box<dyn DeviceHandler>,
    oscillator: Arc<OscillatorTable>,
    gain_processor: Option<Box<dyn GainProcessor>>,
    spectrum_buffer: Option<SpectrumBuffer>,
    shared: Arc<SharedState>,
    agc_stats: AgcStats,
    dump_scale: f32,
    current_phase: i32,
    last_phase_offset: i32,
    signal_level: f32,
    sample_count: usize,
    /// Total samples pulled since construction or the last reset.
    pub total_samples_read: u64,
    display_buffer: LinearBucket<Complex32>,
    event_callbacks: Vec<Box<dyn FnMut(&ReaderEvent) + Send + 'static>>,
}

impl SampleReader {
    pub fn new(device: Box<dyn DeviceHandler>, oscillator: Arc<OscillatorTable>, settings: SampleReaderSettings) -> Self {
        assert!(settings.updates_per_second > 0, "Notification rate must be non-zero");
        assert!(settings.dump_block_size >= 2 && settings.dump_block_size % 2 == 0, "Dump block must hold whole I/Q frames");

        let dump_scale = get_dump_scale(device.bit_depth());
        let shared = Arc::new(SharedState {
            is_running: AtomicBool::new(true),
            signal_level: AtomicU32::new(0.0f32.to_bits()),
            is_dumping: AtomicBool::new(false),
            dump: Mutex::new(None),
            dump_block_size: settings.dump_block_size,
        });
        let display_buffer = LinearBucket::new(settings.display_window);

        Self {
            settings,
            device,
            oscillator,
            gain_processor: None,
            spectrum_buffer: None,
            shared,
            agc_stats: AgcStats::default(),
            dump_scale,
            current_phase: 0,
            last_phase_offset: 0,
            signal_level: 0.0,
            sample_count: 0,
            total_samples_read: 0,
            display_buffer,
            event_callbacks: vec![],
        }
    }

    pub fn with_gain_processor(mut self, gain_processor: Box<dyn GainProcessor>) -> Self {
        self.gain_processor = Some(gain_processor);
        self
    }

    pub fn with_spectrum_buffer(mut self, spectrum_buffer: SpectrumBuffer) -> Self {
        self.spectrum_buffer = Some(spectrum_buffer);
        self
    }

    pub fn settings(&self) -> &SampleReaderSettings {
        &self.settings
    }

    pub fn control(&self) -> SampleReaderControl {
        SampleReaderControl { shared: self.shared.clone() }
    }

    /// Registers a callback for the periodic corrector and signal level updates.
    /// Callbacks run on the reading thread so they should return quickly.
    pub fn subscribe_events(&mut self, callback: impl FnMut(&ReaderEvent) + Send + 'static) {
        self.event_callbacks.push(Box::new(callback));
    }

    pub fn set_running(&self, is_running: bool) {
        self.shared.is_running.store(is_running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::Acquire)
    }

    pub fn signal_level(&self) -> f32 {
        self.signal_level
    }

    /// Current position of the local oscillator in \[0, input_rate).
    pub fn phase(&self) -> i32 {
        self.current_phase
    }

    pub fn input_rate(&self) -> usize {
        self.oscillator.input_rate()
    }

    /// Returns a single corrected sample, blocking while the device is starved.
    /// The local oscillator moves by `phase_offset` steps before the sample is corrected.
    pub fn get_sample(&mut self, phase_offset: i32) -> Result<Complex32> {
        let mut buf = [Complex32::default(); 1];
        loop {
            if self.get_samples(&mut buf, phase_offset)? == 1 {
                return Ok(buf[0]);
            }
        }
    }

    /// Fills the buffer with corrected samples, blocking until the device holds enough of them
    /// or is full. The device may return fewer samples than requested, so only the returned count is valid.
    pub fn get_samples(&mut self, buf: &mut [Complex32], phase_offset: i32) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.wait_for_samples(buf.len())?;

        let total_read = self.device.read_samples(buf, &mut self.agc_stats);
        if let Some(gain_processor) = self.gain_processor.as_mut() {
            gain_processor.process_gain(&self.agc_stats, total_read);
        }

        let buf = &mut buf[..total_read];
        self.dump_samples(buf);
        for x in buf.iter_mut() {
            *x = self.process_sample(*x, phase_offset);
        }
        self.total_samples_read += total_read as u64;
        Ok(total_read)
    }

    /// Pulls samples without moving the oscillator so the long term signal level settles
    /// before the first attempt at synchronisation.
    pub fn prime_signal_level(&mut self, total_samples: usize) -> Result<()> {
        let mut buf = vec![Complex32::default(); self.settings.low_water_mark.max(1)];
        let mut remain = total_samples;
        while remain > 0 {
            let length = remain.min(buf.len());
            remain -= self.get_samples(&mut buf[..length], 0)?;
        }
        log::debug!("[sample_reader] Primed signal level to {:.4} over {} samples", self.signal_level, total_samples);
        Ok(())
    }

    /// Restores the initial phase, signal level and counters and stops any active recording.
    /// The oscillator table is kept.
    pub fn reset(&mut self) -> Result<()> {
        self.current_phase = 0;
        self.last_phase_offset = 0;
        self.signal_level = 0.0;
        self.shared.signal_level.store(0.0f32.to_bits(), Ordering::Relaxed);
        self.sample_count = 0;
        self.total_samples_read = 0;
        self.agc_stats = AgcStats::default();
        self.display_buffer.reset();
        self.shared.stop_dumping()
    }

    fn wait_for_samples(&mut self, count: usize) -> Result<()> {
        let mut required = count.max(self.settings.low_water_mark);
        // A full bounded device can't grow, so its capacity is the most worth waiting for
        if let Some(capacity) = self.device.capacity() {
            required = required.min(capacity);
        }
        loop {
            if !self.is_running() {
                return Err(SyncError::Cancelled);
            }
            let available = self.device.wait_for_samples(required, self.settings.poll_interval);
            if !self.is_running() {
                return Err(SyncError::Cancelled);
            }
            if available >= required {
                return Ok(());
            }
            if self.device.is_closed() {
                // Drain the remainder of a finished stream before tearing down
                if available > 0 {
                    return Ok(());
                }
                log::info!("[sample_reader] Device closed after {} samples", self.total_samples_read);
                self.set_running(false);
                return Err(SyncError::Cancelled);
            }
        }
    }

    fn dump_samples(&self, buf: &[Complex32]) {
        if !self.shared.is_dumping.load(Ordering::Acquire) {
            return;
        }

        let mut dump = self.shared.lock_dump();
        let Some(state) = dump.as_mut() else {
            return;
        };

        let mut frame = [0i16; 2];
        let mut write_result = Ok(());
        for x in buf {
            frame[0] = (x.re * self.dump_scale) as i16;
            frame[1] = (x.im * self.dump_scale) as i16;
            state.buffer.consume(&frame);
            if state.buffer.is_full() {
                write_result = state.flush();
                if write_result.is_err() {
                    break;
                }
            }
        }

        if let Err(err) = write_result {
            log::warn!("[sample_reader] Dropping dump sink after write error: {}", err);
            self.shared.is_dumping.store(false, Ordering::Release);
            if let Some(state) = dump.take() {
                if let Err(err) = state.sink.finalize() {
                    log::warn!("[sample_reader] Failed to finalise dropped dump sink: {}", err);
                }
            }
        }
    }

    #[inline(always)]
    fn process_sample(&mut self, x: Complex32, phase_offset: i32) -> Complex32 {
        self.display_buffer.push(x);

        let input_rate = self.oscillator.input_rate() as i32;
        self.current_phase = wrap_phase(self.current_phase, phase_offset, input_rate);
        let y = x * self.oscillator.at(self.current_phase as usize);

        self.signal_level = update_signal_level(self.signal_level, fast_magnitude(y), self.settings.signal_level_alpha);
        self.shared.signal_level.store(self.signal_level.to_bits(), Ordering::Relaxed);
        self.last_phase_offset = phase_offset;

        self.sample_count += 1;
        if self.sample_count > self.oscillator.input_rate() / self.settings.updates_per_second {
            self.publish_telemetry();
            self.sample_count = 0;
        }
        y
    }

    fn publish_telemetry(&mut self) {
        if let Some(spectrum_buffer) = self.spectrum_buffer.as_ref() {
            spectrum_buffer.publish(self.display_buffer.as_slice());
        }
        self.display_buffer.reset();

        let events = [
            ReaderEvent::SignalLevel(self.signal_level),
            ReaderEvent::CorrectorChanged(self.last_phase_offset),
        ];
        for callback in self.event_callbacks.iter_mut() {
            for event in &events {
                callback(event);
            }
        }
    }
}

impl Drop for SampleReader {
    /// Finalise the recording so the file isn't left truncated.
    fn drop(&mut self) {
        if let Err(err) = self.shared.stop_dumping() {
            log::warn!("[sample_reader] Failed to finalise dump sink: {}", err);
        }
    }
}

/// Moves the phase accumulator back by `phase_offset` steps and wraps it into \[0, input_rate).
/// The wrap is non-negative regardless of the sign of the offset.
#[inline(always)]
pub fn wrap_phase(phase: i32, phase_offset: i32, input_rate: i32) -> i32 {
    let phase = phase as i64 - phase_offset as i64;
    phase.rem_euclid(input_rate as i64) as i32
}

#[inline(always)]
pub fn update_signal_level(level: f32, magnitude: f32, alpha: f32) -> f32 {
    alpha*magnitude + (1.0-alpha)*level
}

/// Approximation of the complex modulus using `max + min/2` of the absolute components.
/// The NULL symbol thresholds are tuned against this approximation, so it must be used for
/// both the signal level and the detector.
#[inline(always)]
pub fn fast_magnitude(x: Complex32) -> f32 {
    let re = x.re.abs();
    let im = x.im.abs();
    if re > im {
        re + 0.5*im
    } else {
        im + 0.5*re
    }
}

/// Factor that maps a normalised sample back onto the integer range of the converter.
fn get_dump_scale(bit_depth: u32) -> f32 {
    let bit_depth = bit_depth.clamp(1, 16);
    (1u32 << (bit_depth-1)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    struct IdleDevice;

    impl DeviceHandler for IdleDevice {
        fn samples_available(&self) -> usize {
            0
        }

        fn read_samples(&mut self, _buf: &mut [Complex32], _stats: &mut AgcStats) -> usize {
            0
        }

        fn bit_depth(&self) -> u32 {
            8
        }
    }

    fn create_idle_reader(settings: SampleReaderSettings) -> SampleReader {
        SampleReader::new(Box::new(IdleDevice), Arc::new(OscillatorTable::new(1000)), settings)
    }

    #[test]
    #[should_panic(expected = "Notification rate must be non-zero")]
    fn zero_update_rate_is_rejected() {
        let settings = SampleReaderSettings { updates_per_second: 0, ..Default::default() };
        create_idle_reader(settings);
    }

    #[test]
    fn settings_are_kept_from_construction() {
        let settings = SampleReaderSettings { updates_per_second: 10, dump_block_size: 64, ..Default::default() };
        let reader = create_idle_reader(settings);
        assert_eq!(reader.settings().updates_per_second, 10);
        assert_eq!(reader.settings().dump_block_size, 64);
        assert_eq!(reader.settings().low_water_mark, 2048);
    }

    #[test]
    fn phase_wraps_to_non_negative() {
        let input_rate = 2_048_000;
        assert_eq!(wrap_phase(0, 1, input_rate), input_rate-1);
        assert_eq!(wrap_phase(0, -1, input_rate), 1);
        assert_eq!(wrap_phase(10, 10, input_rate), 0);
        assert_eq!(wrap_phase(5, -input_rate, input_rate), 5);
        assert_eq!(wrap_phase(5, 3*input_rate + 7, input_rate), input_rate-2);
        assert_eq!(wrap_phase(0, i32::MIN, input_rate), 1_179_648);
    }

    #[test]
    fn phase_is_always_in_range() {
        let input_rate: i32 = 1000;
        let mut phase: i32 = 0;
        for offset in [-2500, 17, 999, 1000, -1, 123456, -654321] {
            let expected = (phase - offset).rem_euclid(input_rate);
            phase = wrap_phase(phase, offset, input_rate);
            assert_eq!(phase, expected);
            assert!((0..input_rate).contains(&phase));
        }
    }

    #[test]
    fn signal_level_converges_to_constant_magnitude() {
        let alpha = 1e-5;
        let magnitude = 0.8;
        let mut level = 0.0;
        for _ in 0..1_000_000 {
            level = update_signal_level(level, magnitude, alpha);
        }
        // (1-alpha)^1e6 is roughly e^-10
        assert!((level - magnitude).abs() < 1e-3, "level {} didn't converge", level);
    }

    #[test]
    fn signal_level_follows_exponential_decay() {
        let alpha = 0.1;
        let magnitudes = [1.0f32, 0.0, 2.0, 0.5];
        let mut level = 0.0;
        for m in magnitudes {
            level = update_signal_level(level, m, alpha);
        }
        let expected: f32 = magnitudes
            .iter()
            .rev()
            .enumerate()
            .map(|(i, m)| alpha * (1.0-alpha).powi(i as i32) * m)
            .sum();
        assert!((level - expected).abs() < 1e-6);
    }

    #[test]
    fn fast_magnitude_uses_max_plus_half_min() {
        assert_eq!(fast_magnitude(Complex32::new(1.0, 0.0)), 1.0);
        assert_eq!(fast_magnitude(Complex32::new(-3.0, 2.0)), 4.0);
        assert_eq!(fast_magnitude(Complex32::new(0.5, -1.0)), 1.25);
        assert_eq!(fast_magnitude(Complex32::new(0.0, 0.0)), 0.0);
    }

    #[test]
    fn dump_scale_matches_bit_depth() {
        assert_eq!(get_dump_scale(8), 128.0);
        assert_eq!(get_dump_scale(12), 2048.0);
        assert_eq!(get_dump_scale(16), 32768.0);
        assert_eq!(get_dump_scale(0), 1.0);
    }
}
