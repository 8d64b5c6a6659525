pub mod dab_transmission_modes;
pub mod dab_parameters;

/// All DAB timing constants are defined for this sampling frequency.
pub const DAB_SAMPLE_RATE: u32 = 2_048_000;
