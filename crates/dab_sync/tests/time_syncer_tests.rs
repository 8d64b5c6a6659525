//! NULL symbol detection against synthetic magnitude profiles

mod helpers;

use dab_sync::time_syncer::{SyncState, TimeSyncer};
use dab_sync::SyncError;
use helpers::{create_reader, SyntheticDevice};
use dab_sync::sample_fifo::SampleFifo;
use std::time::Duration;

// Long enough for the signal level to reach 95% of the carrier magnitude
const WARMUP: u64 = 300_000;
const NB_NULL_PERIOD: usize = 2656;
const NB_FRAME_PERIOD: usize = 196_608;
const INPUT_RATE: usize = 2_048_000;

#[test]
fn constant_carrier_has_no_dip() {
    let mut reader = create_reader(SyntheticDevice::with_dip(u64::MAX, u64::MAX), INPUT_RATE);
    reader.prime_signal_level(WARMUP as usize).unwrap();

    let mut syncer = TimeSyncer::default();
    let nb_frame_period = 20_000;
    let state = syncer.sync(&mut reader, NB_NULL_PERIOD, nb_frame_period).unwrap();
    assert_eq!(state, SyncState::NoDipFound);
    assert_eq!(syncer.total_no_dip, 1);

    // Window priming plus one sample past the frame
    let window_size = syncer.settings.window_size as u64;
    assert_eq!(reader.total_samples_read, WARMUP + window_size + nb_frame_period as u64 + 1);
}

#[test]
fn null_symbol_is_established() {
    let dip_start = WARMUP + 100;
    let dip_end = dip_start + NB_NULL_PERIOD as u64;
    let mut reader = create_reader(SyntheticDevice::with_dip(dip_start, dip_end), INPUT_RATE);
    reader.prime_signal_level(WARMUP as usize).unwrap();
    assert!(reader.signal_level() > 0.94 && reader.signal_level() < 0.96);

    let mut syncer = TimeSyncer::default();
    let state = syncer.sync(&mut reader, NB_NULL_PERIOD, NB_FRAME_PERIOD).unwrap();
    assert_eq!(state, SyncState::Established);
    assert_eq!(syncer.total_established, 1);

    // Recovery is detected once enough of the window has left the NULL symbol
    let position = reader.total_samples_read;
    let window_size = syncer.settings.window_size as u64;
    assert!(position > dip_end, "stopped at {} before end of dip {}", position, dip_end);
    assert!(position <= dip_end + window_size, "stopped at {} too long after end of dip {}", position, dip_end);
}

#[test]
fn dip_without_recovery_has_no_end() {
    let dip_start = WARMUP + 100;
    let mut reader = create_reader(SyntheticDevice::with_dip(dip_start, u64::MAX), INPUT_RATE);
    reader.prime_signal_level(WARMUP as usize).unwrap();

    let mut syncer = TimeSyncer::default();
    let state = syncer.sync(&mut reader, NB_NULL_PERIOD, NB_FRAME_PERIOD).unwrap();
    assert_eq!(state, SyncState::NoEndOfDipFound);
    assert_eq!(syncer.total_no_end_of_dip, 1);

    // Gave up one sample after the NULL period plus window
    let window_size = syncer.settings.window_size as u64;
    let max_position = dip_start + window_size + NB_NULL_PERIOD as u64 + window_size + 1;
    assert!(reader.total_samples_read <= max_position);
    assert!(reader.total_samples_read > dip_start + NB_NULL_PERIOD as u64);
}

#[test]
fn retry_after_failure_finds_next_null() {
    // First dip arrives after one short frame has already elapsed
    let nb_frame_period = 5_000;
    let dip_start = WARMUP + 8_000;
    let dip_end = dip_start + NB_NULL_PERIOD as u64;
    let mut reader = create_reader(SyntheticDevice::with_dip(dip_start, dip_end), INPUT_RATE);
    reader.prime_signal_level(WARMUP as usize).unwrap();

    let mut syncer = TimeSyncer::default();
    assert_eq!(syncer.sync(&mut reader, NB_NULL_PERIOD, nb_frame_period).unwrap(), SyncState::NoDipFound);
    assert_eq!(syncer.sync(&mut reader, NB_NULL_PERIOD, nb_frame_period).unwrap(), SyncState::Established);
    assert_eq!(syncer.total_no_dip, 1);
    assert_eq!(syncer.total_established, 1);
}

#[test]
fn cancellation_propagates_out_of_sync() {
    let fifo = SampleFifo::new(1 << 16, 8);
    let mut reader = create_reader(fifo.clone(), INPUT_RATE);
    let control = reader.control();

    let sync_thread = std::thread::spawn(move || {
        let mut syncer = TimeSyncer::default();
        syncer.sync(&mut reader, NB_NULL_PERIOD, NB_FRAME_PERIOD)
    });

    std::thread::sleep(Duration::from_millis(50));
    control.set_running(false);
    let result = sync_thread.join().unwrap();
    assert!(matches!(result, Err(SyncError::Cancelled)));
}
