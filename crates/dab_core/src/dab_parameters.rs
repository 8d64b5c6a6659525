use crate::dab_transmission_modes::DabTransmissionMode;
use std::time::Duration;

/// Timing and structure of a DAB transmission frame.
///
/// # Diagram
/// ```text
/// | Frame                  |
/// | NULL | SYM*N           |
/// | NULL | PRS | SYM*(N-1) |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DabParameters {
    /// Number of OFDM symbols after the NULL symbol, starting with the phase reference symbol.
    pub nb_symbols: usize,
    /// Duration of NULL symbol.
    pub nb_null_period: usize,
    /// Duration of OFDM data symbol including its cyclic prefix.
    pub nb_symbol_period: usize,
    /// Duration of FFT in OFDM data symbol.
    pub nb_fft: usize,
    /// Number of FFT bins that are data carriers centered around DC.
    pub nb_fft_data_carriers: usize,
}

impl DabParameters {
    /// Duration of an entire transmission frame including the NULL symbol.
    pub fn nb_frame_period(&self) -> usize {
        self.nb_null_period + self.nb_symbols*self.nb_symbol_period
    }

    /// Duration of the cyclic prefix in each OFDM data symbol.
    pub fn nb_cyclic_prefix(&self) -> usize {
        self.nb_symbol_period - self.nb_fft
    }

    /// Wall clock length of a frame at the given sampling rate.
    pub fn frame_duration(&self, sample_rate: u32) -> Duration {
        let nanos = self.nb_frame_period() as u64 * 1_000_000_000 / sample_rate as u64;
        Duration::from_nanos(nanos)
    }
}

/// These constants are defined for a sampling frequency of 2.048MHz.
/// Mode I has 1536 carriers spaced 1kHz apart. Each other mode scales the symbol down and the
/// carrier spacing up by the same factor.
pub fn get_dab_parameters(transmission_mode: DabTransmissionMode) -> DabParameters {
    // (symbols, null, fft)
    let (nb_symbols, nb_null_period, nb_fft) = match transmission_mode {
        DabTransmissionMode::I   => (76, 2656, 2048),
        DabTransmissionMode::II  => (76, 664, 512),
        DabTransmissionMode::III => (153, 345, 256),
        DabTransmissionMode::IV  => (76, 1328, 1024),
    };
    // Guard interval is 63/256 of the useful symbol in every mode
    let nb_cyclic_prefix = nb_fft*63/256;
    let params = DabParameters {
        nb_symbols,
        nb_null_period,
        nb_symbol_period: nb_fft + nb_cyclic_prefix,
        nb_fft,
        nb_fft_data_carriers: nb_fft*3/4,
    };

    assert!(params.nb_symbols >= 2, "Frame needs a phase reference symbol and at least one data symbol");
    assert!(params.nb_fft >= params.nb_fft_data_carriers, "Number of data carriers is limited to FFT resolution");
    assert!(params.nb_null_period > params.nb_cyclic_prefix(), "NULL symbol must be longer than the cyclic prefix");
    params
}
