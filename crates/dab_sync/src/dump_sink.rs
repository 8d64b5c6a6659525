use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

/// Destination for raw samples recorded by a reader.
/// Samples arrive as interleaved 16bit I/Q frames in blocks.
pub trait DumpSink: Send {
    fn write_frames(&mut self, interleaved: &[i16]) -> Result<()>;

    /// Flushes all pending frames and closes the sink.
    fn finalize(self: Box<Self>) -> Result<()>;
}

/// Records samples as a two channel 16bit PCM WAV file.
pub struct WavDumpSink<W: Write + Seek> {
    writer: hound::WavWriter<W>,
}

impl WavDumpSink<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, sample_rate: u32) -> Result<Self> {
        let writer = hound::WavWriter::create(path, Self::spec(sample_rate))?;
        Ok(Self { writer })
    }
}

impl<W: Write + Seek> WavDumpSink<W> {
    pub fn new(writer: W, sample_rate: u32) -> Result<Self> {
        let writer = hound::WavWriter::new(writer, Self::spec(sample_rate))?;
        Ok(Self { writer })
    }

    pub fn spec(sample_rate: u32) -> hound::WavSpec {
        hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    /// Number of complex samples written so far.
    pub fn total_frames(&self) -> u32 {
        self.writer.len() / 2
    }
}

impl<W: Write + Seek + Send> DumpSink for WavDumpSink<W> {
    fn write_frames(&mut self, interleaved: &[i16]) -> Result<()> {
        assert!(interleaved.len() % 2 == 0, "Dump block must contain whole I/Q frames");
        for x in interleaved {
            self.writer.write_sample(*x)?;
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn counts_whole_frames() {
        let mut sink = WavDumpSink::new(Cursor::new(Vec::new()), 2_048_000).unwrap();
        sink.write_frames(&[1, -1, 2, -2, 3, -3]).unwrap();
        assert_eq!(sink.total_frames(), 3);
        Box::new(sink).finalize().unwrap();
    }
}
