use dab_core::dab_parameters::{get_dab_parameters, DabParameters};
use dab_core::dab_transmission_modes::DabTransmissionMode;
use dab_core::DAB_SAMPLE_RATE;
use dab_sync::device_handler::AgcMonitor;
use dab_sync::dump_sink::WavDumpSink;
use dab_sync::oscillator_table::OscillatorTable;
use dab_sync::sample_fifo::SampleFifo;
use dab_sync::sample_reader::{ReaderEvent, SampleReader, SampleReaderSettings};
use dab_sync::spectrum_buffer::SpectrumBuffer;
use dab_sync::time_syncer::{SyncState, TimeSyncer};
use std::io::Read;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use num::complex::Complex32;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct AppArguments {
    /// DAB transmission mode. Valid modes are \[1,2,3,4\]
    #[arg(short, long, default_value_t = 1)]
    mode: u32,
    /// Number of samples to read in chunks from input file
    #[arg(short, long, default_value_t = 4096*8)]
    number_of_input_samples: usize,
    /// Input filepath of raw unsigned 8bit IQ. If not provided uses stdin by default.
    /// With stdin the program can exit on --max-frames before the input reaches EOF.
    #[arg(short, long)]
    input_filepath: Option<String>,
    /// Record the raw input to a 16bit stereo WAV file
    #[arg(short, long)]
    dump_filepath: Option<String>,
    /// Stop after this many frames have been synchronised
    #[arg(long)]
    max_frames: Option<usize>,
    /// Number of samples buffered between the reader and sync threads
    #[arg(long, default_value_t = 1 << 19)]
    fifo_capacity: usize,
}

#[derive(Debug, Default)]
struct SyncSummary {
    total_frames: usize,
    total_established: u32,
    total_no_dip: u32,
    total_no_end_of_dip: u32,
    total_samples_read: u64,
    signal_level: f32,
}

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = AppArguments::parse();

    // Parse arguments
    let transmission_mode = DabTransmissionMode::try_from(args.mode)
        .map_err(|mode| format!("Invalid transmission mode index {}", mode))?;
    let reader_settings = SampleReaderSettings::default();
    let fifo_capacity = match args.fifo_capacity {
        length if length < reader_settings.low_water_mark => {
            return Err(format!("FIFO capacity must hold at least {} samples.", reader_settings.low_water_mark));
        },
        length => length,
    };
    let number_of_input_samples = match args.number_of_input_samples {
        length if length == 0 => return Err("Number of input samples cannot be zero.".into()),
        length if length > fifo_capacity => return Err("Number of input samples cannot exceed the FIFO capacity.".into()),
        length => length,
    };
    let mut input_file: Box<dyn Read + Send + Sync> = match &args.input_filepath {
        None => Box::new(std::io::stdin()),
        Some(filepath) => match std::fs::File::open(filepath) {
            Ok(file) => Box::new(file),
            Err(err) => return Err(format!("Failed to open input file {}: {}", filepath, err)),
        },
    };

    // Setup sample reader
    let params = get_dab_parameters(transmission_mode);
    let oscillator = Arc::new(OscillatorTable::new(DAB_SAMPLE_RATE as usize));
    let fifo = SampleFifo::new(fifo_capacity, 8);
    let agc_monitor = AgcMonitor::new();
    let spectrum = SpectrumBuffer::new(reader_settings.display_window*4, reader_settings.display_window);
    let mut reader = SampleReader::new(Box::new(fifo.clone()), oscillator, reader_settings)
        .with_gain_processor(Box::new(agc_monitor.clone()))
        .with_spectrum_buffer(spectrum.clone());
    reader.subscribe_events(|event: &ReaderEvent| match event {
        ReaderEvent::SignalLevel(level) => log::debug!("[sync_thread] Signal level {:.4}", level),
        ReaderEvent::CorrectorChanged(offset) => log::debug!("[sync_thread] Corrector at {}Hz", offset),
    });
    let control = reader.control();

    if let Some(filepath) = &args.dump_filepath {
        let sink = WavDumpSink::create(filepath, DAB_SAMPLE_RATE)
            .map_err(|err| format!("Failed to create dump file {}: {}", filepath, err))?;
        control.start_dumping(Box::new(sink))
            .map_err(|err| format!("Failed to start dumping to {}: {}", filepath, err))?;
        log::info!("[main_thread] Dumping raw samples to {}", filepath);
    }

    // Setup threads
    let bytes_per_sample = 2;
    let mut input_bytes_buffer = vec![0u8; number_of_input_samples*bytes_per_sample];
    let reader_thread = std::thread::spawn({
        let fifo = fifo.clone();
        let control = control.clone();
        move || {
            // Odd trailing byte of a read that split an IQ pair
            let mut nb_carry = 0;
            while control.is_running() {
                if fifo.wait_for_space(number_of_input_samples, Duration::from_millis(100)) < number_of_input_samples {
                    continue;
                }
                let total_bytes = match input_file.read(&mut input_bytes_buffer[nb_carry..]) {
                    Ok(0) => {
                        log::info!("[reader_thread] Finished reading samples from input");
                        break;
                    },
                    Ok(length) => nb_carry + length,
                    Err(err) => {
                        log::error!("[reader_thread] Error while reading from input: {}", err);
                        break;
                    },
                };
                let total_aligned = total_bytes - total_bytes % bytes_per_sample;
                fifo.push_u8_iq(&input_bytes_buffer[..total_aligned]);
                input_bytes_buffer.copy_within(total_aligned..total_bytes, 0);
                nb_carry = total_bytes - total_aligned;
            }
            fifo.close();
            log::info!("[reader_thread] Closed sample FIFO with {} samples dropped", fifo.total_dropped());
        }
    });

    let max_frames = args.max_frames;
    let sync_thread = std::thread::spawn(move || {
        let mut syncer = TimeSyncer::default();
        let mut summary = SyncSummary::default();
        match run_frame_sync(&mut reader, &mut syncer, &params, max_frames, &mut summary.total_frames) {
            Ok(()) => log::info!("[sync_thread] Reached limit of {} frames", summary.total_frames),
            Err(err) if err.is_cancelled() => log::info!("[sync_thread] Sample reader was cancelled"),
            Err(err) => log::error!("[sync_thread] Frame synchronisation failed: {}", err),
        }
        reader.set_running(false);
        if let Err(err) = reader.control().stop_dumping() {
            log::error!("[sync_thread] Failed to finalise dump file: {}", err);
        }
        summary.total_established = syncer.total_established;
        summary.total_no_dip = syncer.total_no_dip;
        summary.total_no_end_of_dip = syncer.total_no_end_of_dip;
        summary.total_samples_read = reader.total_samples_read;
        summary.signal_level = reader.signal_level();
        summary
    });

    // Handle closing
    let summary = match sync_thread.join() {
        Ok(summary) => summary,
        Err(err) => {
            control.set_running(false);
            fifo.close();
            return Err(format!("Sync thread should terminate gracefully: {:?}", err));
        },
    };
    // A read from stdin blocks until more input or EOF arrives, so don't wait on it forever
    let join_timeout = match &args.input_filepath {
        None => Some(Duration::from_millis(500)),
        Some(_) => None,
    };
    match join_thread(reader_thread, join_timeout) {
        Ok(true) => {},
        Ok(false) => log::info!("[main_thread] Leaving reader thread blocked on stdin"),
        Err(err) => log::error!("[main_thread] Reader thread should terminate gracefully: {:?}", err),
    }

    let agc = agc_monitor.summary();
    println!("frames synchronised: {}", summary.total_frames);
    println!("sync attempts: {} established, {} without dip, {} without end of dip",
        summary.total_established, summary.total_no_dip, summary.total_no_end_of_dip);
    println!("samples read: {} ({} overloads)", summary.total_samples_read, agc.total_overloads);
    println!("signal level: {:.4}", summary.signal_level);
    let mut spectrum_db = vec![0.0f32; spectrum.nb_fft()];
    if spectrum.magnitude_spectrum(&mut spectrum_db) {
        let (peak_index, peak_db) = spectrum_db
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (i, &y)| if y > acc.1 { (i, y) } else { acc });
        let bin_hz = DAB_SAMPLE_RATE as f32 / spectrum.nb_fft() as f32;
        let peak_hz = (peak_index as f32 - (spectrum.nb_fft()/2) as f32) * bin_hz;
        println!("spectrum peak: {:.0}Hz at {:.1}dB", peak_hz, peak_db);
    }
    Ok(())
}

/// Joins the thread once it finishes. With a timeout the thread is detached if it is still running
/// afterwards and `Ok(false)` is returned.
fn join_thread<T>(handle: JoinHandle<T>, timeout: Option<Duration>) -> std::thread::Result<bool> {
    if let Some(timeout) = timeout {
        let start = Instant::now();
        while !handle.is_finished() {
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
    handle.join().map(|_| true)
}

/// Locates the start of each frame and consumes its data symbols until the frame limit or cancellation.
fn run_frame_sync(
    reader: &mut SampleReader, syncer: &mut TimeSyncer, params: &DabParameters,
    max_frames: Option<usize>, total_frames: &mut usize,
) -> dab_sync::Result<()> {
    reader.prime_signal_level(params.nb_frame_period()/2)?;

    // Stop short of the next NULL symbol so the syncer sees its falling edge
    let nb_frame_remain = params.nb_symbols*params.nb_symbol_period - params.nb_null_period/2;
    let mut frame_buffer = vec![Complex32::default(); nb_frame_remain];
    loop {
        if max_frames.is_some_and(|max_frames| *total_frames >= max_frames) {
            return Ok(());
        }

        match syncer.sync(reader, params.nb_null_period, params.nb_frame_period())? {
            SyncState::Established => {},
            state => {
                log::warn!("[sync_thread] Lost frame sync after {} frames: {:?}", total_frames, state);
                continue;
            },
        }

        let mut total_read = 0;
        while total_read < frame_buffer.len() {
            total_read += reader.get_samples(&mut frame_buffer[total_read..], 0)?;
        }
        *total_frames += 1;
    }
}
