use crate::circular_bucket::CircularBucket;
use itertools::izip;
use num::complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Recent raw samples published by a reader for display purposes.
///
/// Publishing is best effort. When the display falls behind, the oldest samples are overwritten.
/// Cloning gives another handle to the same buffer so the display thread can read it.
#[derive(Clone)]
pub struct SpectrumBuffer {
    bucket: Arc<Mutex<CircularBucket<Complex32>>>,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectrumBuffer {
    /// Creates a buffer holding `capacity` samples that produces spectrums of `nb_fft` bins.
    pub fn new(capacity: usize, nb_fft: usize) -> Self {
        assert!(nb_fft > 0, "Spectrum needs at least one FFT bin");
        assert!(capacity >= nb_fft, "Buffer of {} samples cannot hold an FFT of {} bins", capacity, nb_fft);
        let mut planner = FftPlanner::new();
        Self {
            bucket: Arc::new(Mutex::new(CircularBucket::new(capacity))),
            fft: planner.plan_fft_forward(nb_fft),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircularBucket<Complex32>> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn nb_fft(&self) -> usize {
        self.fft.len()
    }

    /// Returns the number of samples currently held.
    pub fn length(&self) -> usize {
        self.lock().length()
    }

    pub fn publish(&self, buf: &[Complex32]) {
        self.lock().consume(buf);
    }

    /// Copies the held samples from oldest to newest.
    pub fn snapshot(&self, out: &mut Vec<Complex32>) {
        out.clear();
        out.extend(self.lock().iter());
    }

    /// Calculates the power spectrum of the newest samples in dB with DC in the centre bin.
    /// Returns false if not enough samples have been published yet.
    pub fn magnitude_spectrum(&self, y: &mut [f32]) -> bool {
        let nb_fft = self.nb_fft();
        assert!(y.len() == nb_fft, "Spectrum output has {} bins but FFT has {} bins", y.len(), nb_fft);

        let mut x: Vec<Complex32> = {
            let bucket = self.lock();
            if bucket.length() < nb_fft {
                return false;
            }
            bucket.iter().skip(bucket.length() - nb_fft).copied().collect()
        };
        self.fft.process(&mut x);
        calculate_magnitude_spectrum(&x, y);
        true
    }
}

fn calculate_magnitude_spectrum(x: &[Complex32], y: &mut [f32]) {
    assert!(x.len() == y.len());
    let m = x.len()/2;
    // Upper half of the FFT holds the negative frequencies
    let shifted = x[m..].iter().chain(x[..m].iter());
    for (y, x) in izip!(y.iter_mut(), shifted) {
        *y = 20.0 * x.norm().log10();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn tone_peaks_at_its_bin() {
        let nb_fft = 64;
        let spectrum = SpectrumBuffer::new(256, nb_fft);
        let mut y = vec![0.0; nb_fft];
        assert!(!spectrum.magnitude_spectrum(&mut y));

        // A tone 8 bins above DC
        let tone: Vec<Complex32> = (0..256)
            .map(|i| {
                let theta = 2.0 * PI * 8.0 * (i as f32) / (nb_fft as f32);
                Complex32::new(theta.cos(), theta.sin())
            })
            .collect();
        spectrum.publish(&tone);
        assert!(spectrum.magnitude_spectrum(&mut y));

        let (peak_index, _) = y
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |(i_max, y_max), (i, y)| if *y > y_max { (i, *y) } else { (i_max, y_max) });
        assert_eq!(peak_index, nb_fft/2 + 8);
    }

    #[test]
    fn snapshot_is_shared_between_clones() {
        let spectrum = SpectrumBuffer::new(4, 4);
        let display = spectrum.clone();
        spectrum.publish(&[Complex32::new(1.0, 0.0), Complex32::new(2.0, 0.0)]);
        spectrum.publish(&[Complex32::new(3.0, 0.0); 3]);

        let mut out = vec![];
        display.snapshot(&mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], Complex32::new(2.0, 0.0));
        assert_eq!(display.length(), 4);
    }
}
