use num::complex::Complex32;
use std::f64::consts::PI;

/// One full cycle of the local oscillator with an entry for every integer phase step.
///
/// Entry `k` holds `exp(j*2*pi*k/input_rate)`. Advancing the phase by one step per sample
/// shifts the signal by 1Hz, so phase offsets can be expressed directly in Hz.
/// The table is immutable after construction and is shared between readers through an `Arc`.
pub struct OscillatorTable {
    table: Vec<Complex32>,
}

impl OscillatorTable {
    pub fn new(input_rate: usize) -> Self {
        assert!(input_rate > 0, "Oscillator table requires a non-zero input rate");
        assert!(input_rate <= i32::MAX as usize, "Input rate {} doesn't fit the phase accumulator", input_rate);

        // Computed in double precision so the phase error doesn't grow with the index
        let step = 2.0 * PI / (input_rate as f64);
        let table = (0..input_rate)
            .map(|k| {
                let theta = step * (k as f64);
                Complex32::new(theta.cos() as f32, theta.sin() as f32)
            })
            .collect();
        Self { table }
    }

    /// Number of phase steps in one cycle. This is the modulus of every phase accumulator using the table.
    pub fn input_rate(&self) -> usize {
        self.table.len()
    }

    #[inline(always)]
    pub fn at(&self, phase: usize) -> Complex32 {
        self.table[phase]
    }

    pub fn as_slice(&self) -> &[Complex32] {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_unit_magnitude() {
        let table = OscillatorTable::new(2000);
        assert_eq!(table.input_rate(), 2000);
        for x in table.as_slice() {
            assert!((x.norm() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn quarter_cycle_is_imaginary_unit() {
        let table = OscillatorTable::new(1000);
        let x = table.at(0);
        assert!((x.re - 1.0).abs() < 1e-6 && x.im.abs() < 1e-6);
        let x = table.at(250);
        assert!(x.re.abs() < 1e-6 && (x.im - 1.0).abs() < 1e-6);
        let x = table.at(500);
        assert!((x.re + 1.0).abs() < 1e-6 && x.im.abs() < 1e-6);
    }
}
