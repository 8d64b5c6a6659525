//! Acquisition front end of a DAB receiver.
//!
//! Pulls complex baseband samples from a tuner, corrects their frequency with a table driven
//! local oscillator and finds the NULL symbol that marks the start of each transmission frame.

pub mod error;
pub mod oscillator_table;
pub mod device_handler;
pub mod sample_fifo;
pub mod circular_bucket;
pub mod linear_bucket;
pub mod spectrum_buffer;
pub mod dump_sink;
pub mod sample_reader;
pub mod time_syncer;

pub use error::{SyncError, Result};
