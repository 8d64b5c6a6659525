//! Synthetic devices for driving a sample reader without hardware

#![allow(dead_code)]

use dab_sync::device_handler::{AgcStats, DeviceHandler};
use dab_sync::oscillator_table::OscillatorTable;
use dab_sync::sample_reader::{SampleReader, SampleReaderSettings};
use num::complex::Complex32;
use std::sync::Arc;

/// A device that always has samples ready and computes each one from its position in the stream.
pub struct SyntheticDevice {
    generator: Box<dyn FnMut(u64) -> Complex32 + Send>,
    position: u64,
    bit_depth: u32,
}

impl SyntheticDevice {
    pub fn new(bit_depth: u32, generator: impl FnMut(u64) -> Complex32 + Send + 'static) -> Self {
        Self {
            generator: Box::new(generator),
            position: 0,
            bit_depth,
        }
    }

    /// Samples of unit magnitude that drop to zero for `[dip_start, dip_end)`.
    pub fn with_dip(dip_start: u64, dip_end: u64) -> Self {
        Self::new(8, move |n| {
            if n >= dip_start && n < dip_end {
                Complex32::new(0.0, 0.0)
            } else {
                Complex32::new(1.0, 0.0)
            }
        })
    }
}

impl DeviceHandler for SyntheticDevice {
    fn samples_available(&self) -> usize {
        1 << 20
    }

    fn read_samples(&mut self, buf: &mut [Complex32], stats: &mut AgcStats) -> usize {
        for x in buf.iter_mut() {
            *x = (self.generator)(self.position);
            self.position += 1;
        }
        *stats = AgcStats { gain_db: 30.0, overloads: 0 };
        buf.len()
    }

    fn bit_depth(&self) -> u32 {
        self.bit_depth
    }
}

pub fn create_reader(device: impl DeviceHandler + 'static, input_rate: usize) -> SampleReader {
    create_reader_with_settings(device, input_rate, SampleReaderSettings::default())
}

pub fn create_reader_with_settings(
    device: impl DeviceHandler + 'static, input_rate: usize, settings: SampleReaderSettings,
) -> SampleReader {
    let oscillator = Arc::new(OscillatorTable::new(input_rate));
    SampleReader::new(Box::new(device), oscillator, settings)
}

/// Unique path in the temporary directory for a WAV file.
pub fn temp_wav_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("dab_sync_{}_{}.wav", name, std::process::id()))
}
