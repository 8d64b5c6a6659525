use crate::device_handler::{AgcStats, DeviceHandler};
use itertools::izip;
use num::complex::Complex32;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

struct FifoState {
    samples: VecDeque<Complex32>,
    is_closed: bool,
    total_dropped: u64,
    stats: AgcStats,
}

struct FifoShared {
    state: Mutex<FifoState>,
    on_change: Condvar,
    capacity: usize,
    bit_depth: u32,
}

/// A bounded queue of complex samples between a producer thread and a [`SampleReader`].
///
/// The producer pushes samples as they arrive from hardware or a file and the reader pulls them
/// through the [`DeviceHandler`] interface. Waiting on either side uses a condition variable so
/// the consumer wakes as soon as the producer delivers, rather than after a fixed sleep.
/// Cloning gives another handle to the same queue.
///
/// # Examples
/// ```
/// use dab_sync::sample_fifo::SampleFifo;
/// use dab_sync::device_handler::{DeviceHandler, AgcStats};
/// use num::complex::Complex32;
/// use std::time::Duration;
///
/// let fifo = SampleFifo::new(1024, 8);
/// let producer = std::thread::spawn({
///     let fifo = fifo.clone();
///     move || {
///         fifo.push(&[Complex32::new(0.5, -0.5); 16]);
///     }
/// });
///
/// let mut device = fifo.clone();
/// assert!(device.wait_for_samples(16, Duration::from_secs(5)) >= 16);
/// let mut buf = [Complex32::default(); 16];
/// assert_eq!(device.read_samples(&mut buf, &mut AgcStats::default()), 16);
/// producer.join().unwrap();
/// ```
///
/// [`SampleReader`]: crate::sample_reader::SampleReader
#[derive(Clone)]
pub struct SampleFifo {
    shared: Arc<FifoShared>,
}

impl SampleFifo {
    pub fn new(capacity: usize, bit_depth: u32) -> Self {
        assert!(capacity > 0, "Sample FIFO must have a non-zero capacity");
        let state = FifoState {
            samples: VecDeque::with_capacity(capacity),
            is_closed: false,
            total_dropped: 0,
            stats: AgcStats::default(),
        };
        Self {
            shared: Arc::new(FifoShared {
                state: Mutex::new(state),
                on_change: Condvar::new(),
                capacity,
                bit_depth,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FifoState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Appends samples until the capacity is reached. Samples that don't fit are dropped like a device overrun.
    /// Returns the number of samples that were queued.
    pub fn push(&self, buf: &[Complex32]) -> usize {
        let mut state = self.lock();
        if state.is_closed {
            return 0;
        }
        let remain = self.shared.capacity - state.samples.len();
        let total_write = buf.len().min(remain);
        state.samples.extend(&buf[..total_write]);

        let total_dropped = buf.len() - total_write;
        if total_dropped > 0 {
            state.total_dropped += total_dropped as u64;
            log::warn!("[sample_fifo] Overflow dropped {} samples", total_dropped);
        }
        self.shared.on_change.notify_all();
        total_write
    }

    /// Converts interleaved unsigned 8bit IQ pairs into normalised samples and queues them.
    /// A sample with either component at a rail of the converter counts as one overload.
    /// Returns the number of samples that were queued.
    pub fn push_u8_iq(&self, bytes: &[u8]) -> usize {
        let dc_offset = 128.0;
        let scale = 1.0 / 128.0;
        let mut total_overloads = 0;
        let samples: Vec<Complex32> = bytes
            .chunks_exact(2)
            .map(|x| {
                if x.iter().any(|v| *v == 0 || *v == 255) {
                    total_overloads += 1;
                }
                Complex32::new(
                    (x[0] as f32 - dc_offset) * scale,
                    (x[1] as f32 - dc_offset) * scale,
                )
            })
            .collect();
        if total_overloads > 0 {
            self.lock().stats.overloads += total_overloads as u32;
        }
        self.push(&samples)
    }

    /// Sets the gain reported with subsequent reads.
    pub fn set_gain_db(&self, gain_db: f32) {
        self.lock().stats.gain_db = gain_db;
    }

    /// Blocks for at most `timeout` until there is space for `count` samples.
    /// Returns the free space afterwards, or zero once the FIFO is closed.
    pub fn wait_for_space(&self, count: usize, timeout: Duration) -> usize {
        let count = count.min(self.shared.capacity);
        let state = self.lock();
        let (state, _) = self.shared.on_change
            .wait_timeout_while(state, timeout, |state| {
                !state.is_closed && (self.shared.capacity - state.samples.len()) < count
            })
            .unwrap_or_else(PoisonError::into_inner);
        if state.is_closed {
            return 0;
        }
        self.shared.capacity - state.samples.len()
    }

    /// Marks the end of the stream. Queued samples can still be read.
    /// All threads waiting on the FIFO are woken up.
    pub fn close(&self) {
        let mut state = self.lock();
        state.is_closed = true;
        self.shared.on_change.notify_all();
    }

    pub fn total_dropped(&self) -> u64 {
        self.lock().total_dropped
    }
}

impl DeviceHandler for SampleFifo {
    fn samples_available(&self) -> usize {
        self.lock().samples.len()
    }

    fn read_samples(&mut self, buf: &mut [Complex32], stats: &mut AgcStats) -> usize {
        let mut state = self.lock();
        let total_read = buf.len().min(state.samples.len());
        for (y, x) in izip!(buf.iter_mut(), state.samples.drain(..total_read)) {
            *y = x;
        }
        *stats = state.stats;
        state.stats.overloads = 0;
        self.shared.on_change.notify_all();
        total_read
    }

    fn bit_depth(&self) -> u32 {
        self.shared.bit_depth
    }

    fn is_closed(&self) -> bool {
        self.lock().is_closed
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.shared.capacity)
    }

    fn wait_for_samples(&self, count: usize, timeout: Duration) -> usize {
        let state = self.lock();
        let (state, _) = self.shared.on_change
            .wait_timeout_while(state, timeout, |state| {
                !state.is_closed && state.samples.len() < count
            })
            .unwrap_or_else(PoisonError::into_inner);
        state.samples.len()
    }
}
