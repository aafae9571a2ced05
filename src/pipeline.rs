//! Decoder pipeline: ingestion queue, worker pool, output queue
//!
//! One [`DecodePipeline`] wraps the firmware-specific decoders behind a
//! common shell. The device-read thread moves raw buffers in through
//! [`submit`](DecodePipeline::submit); `worker_count` OS threads pop them
//! from a mutex-guarded FIFO, decode, and append the events (sorted per
//! buffer) to the output queue; clients take whole batches with
//! [`drain`](DecodePipeline::drain).
//!
//! Run gating: dig2 streams carry Start/Stop sentinels that switch the
//! pipeline between Idle and Running; event buffers submitted while Idle
//! are dropped. The dig1 wire has no such markers, so dig1 pipelines run
//! from construction until shutdown.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::dig1::{self, Dig1Variant};
use crate::dig2;
use crate::error::PipelineError;
use crate::event::EventData;
use crate::raw::{RawBuffer, SignalKind};
use crate::validate::{self, DecodeOutcome};

/// Idle sleep between queue polls
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Firmware family handled by a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareKind {
    /// First-generation DPP-PSD (32-bit LE, hierarchical)
    Dig1Psd,
    /// First-generation DPP-PHA (32-bit LE, hierarchical)
    Dig1Pha,
    /// Second-generation DPP-PSD (64-bit BE, flat)
    Dig2,
}

impl FirmwareKind {
    /// Wire word size in bytes
    pub fn word_size(&self) -> usize {
        match self {
            Self::Dig1Psd | Self::Dig1Pha => 4,
            Self::Dig2 => 8,
        }
    }

    /// Whether the wire carries Start/Stop control signals
    fn has_control_signals(&self) -> bool {
        matches!(self, Self::Dig2)
    }
}

/// Per-buffer decode settings, snapshotted by a worker before decoding
pub(crate) struct DecodeContext<'a> {
    pub time_step: u32,
    pub module: u8,
    pub dump: bool,
    /// Aggregate-counter continuity cell; `Some` only in single-worker mode
    pub counter: Option<&'a Mutex<u64>>,
}

impl DecodeContext<'_> {
    pub fn time_step_ns(&self) -> f64 {
        self.time_step as f64
    }

    /// Track aggregate-counter continuity, warning on a gap
    pub fn check_counter(&self, counter: u64) {
        let Some(cell) = self.counter else {
            return;
        };
        let mut last = cell.lock().unwrap();
        if *last != 0 && counter != last.wrapping_add(1) {
            warn!(last = *last, counter, "aggregate counter discontinuity");
        }
        *last = counter;
    }
}

struct PipelineShared {
    firmware: FirmwareKind,
    worker_count: usize,
    ingest: Mutex<VecDeque<RawBuffer>>,
    output: Mutex<Vec<EventData>>,
    stop: AtomicBool,
    running: AtomicBool,
    time_step: AtomicU32,
    module: AtomicU8,
    dump: AtomicBool,
    last_counter: Mutex<u64>,
}

/// Multi-threaded raw-data decoder for one digitizer
pub struct DecodePipeline {
    shared: Arc<PipelineShared>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl DecodePipeline {
    /// Spawn `worker_count` decode threads for the given firmware family
    ///
    /// A worker count of 0 is raised to 1. dig1 pipelines start Running,
    /// dig2 pipelines start Idle and wait for a Start sentinel.
    pub fn new(worker_count: u32, firmware: FirmwareKind) -> Result<Self, PipelineError> {
        let worker_count = worker_count.max(1) as usize;
        let shared = Arc::new(PipelineShared {
            firmware,
            worker_count,
            ingest: Mutex::new(VecDeque::new()),
            output: Mutex::new(Vec::new()),
            stop: AtomicBool::new(false),
            running: AtomicBool::new(!firmware.has_control_signals()),
            time_step: AtomicU32::new(1),
            module: AtomicU8::new(0),
            dump: AtomicBool::new(false),
            last_counter: Mutex::new(0),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("decode-{i}"))
                .spawn(move || worker_loop(shared))?;
            workers.push(handle);
        }

        info!(worker_count, ?firmware, "decode pipeline started");
        Ok(Self { shared, workers })
    }

    /// Set the sampling period in nanoseconds (must be positive)
    pub fn set_time_step(&self, ns: u32) {
        if ns == 0 {
            warn!("time step must be positive, keeping previous value");
            return;
        }
        self.shared.time_step.store(ns, Ordering::Relaxed);
    }

    /// Set the module identifier stamped into decoded events
    pub fn set_module_number(&self, module: u8) {
        self.shared.module.store(module, Ordering::Relaxed);
    }

    /// Enable or disable verbose buffer dumps and decode traces
    pub fn set_dump_flag(&self, on: bool) {
        self.shared.dump.store(on, Ordering::Relaxed);
    }

    /// Whether the pipeline currently admits event buffers
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of buffers waiting in the ingestion queue
    pub fn pending_buffers(&self) -> usize {
        self.shared.ingest.lock().unwrap().len()
    }

    /// Classify one buffer and act on it
    ///
    /// `Event` buffers are enqueued for decoding when the pipeline is
    /// Running and dropped otherwise. `Start`/`Stop` switch the run state.
    /// `Unknown` buffers are logged and dropped. Returns the classification.
    pub fn submit(&self, mut raw: RawBuffer) -> SignalKind {
        let word_size = self.shared.firmware.word_size();
        let outcome = validate::check_raw_buffer(raw.size, word_size, 1);
        if !outcome.is_ok() {
            error!(%outcome, size = raw.size, word_size, "buffer rejected");
            return SignalKind::Unknown;
        }

        let kind = match self.shared.firmware {
            FirmwareKind::Dig2 => {
                dig2::to_native_order(&mut raw.data);
                dig2::classify(&raw)
            }
            FirmwareKind::Dig1Psd | FirmwareKind::Dig1Pha => dig1::classify(&raw),
        };

        match kind {
            SignalKind::Event => {
                if self.shared.running.load(Ordering::Acquire) {
                    self.shared.ingest.lock().unwrap().push_back(raw);
                } else {
                    debug!(size = raw.size, "pipeline idle, event buffer dropped");
                }
            }
            SignalKind::Start => {
                self.shared.running.store(true, Ordering::Release);
                info!("start signal received");
            }
            SignalKind::Stop => {
                self.shared.running.store(false, Ordering::Release);
                match dig2::stop_dead_time_ns(&raw) {
                    Some(dead_time_ns) => warn!(dead_time_ns, "stop signal received"),
                    None => info!("stop signal received"),
                }
            }
            SignalKind::Unknown => {
                warn!(
                    outcome = %DecodeOutcome::UnknownDataType,
                    size = raw.size,
                    "buffer dropped"
                );
            }
        }

        kind
    }

    /// Take all decoded events, leaving the output queue empty
    pub fn drain(&self) -> Vec<EventData> {
        std::mem::take(&mut *self.shared.output.lock().unwrap())
    }

    /// Stop the workers and join them
    ///
    /// Buffers still in the ingestion queue are dropped undecoded.
    pub fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for DecodePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<PipelineShared>) {
    while !shared.stop.load(Ordering::Acquire) {
        // Pop under the lock, decode outside it.
        let raw = shared.ingest.lock().unwrap().pop_front();
        let Some(raw) = raw else {
            thread::sleep(POLL_INTERVAL);
            continue;
        };

        // Counter continuity is only meaningful when one worker sees every
        // buffer in submission order.
        let counter = (shared.worker_count == 1).then_some(&shared.last_counter);
        let ctx = DecodeContext {
            time_step: shared.time_step.load(Ordering::Relaxed),
            module: shared.module.load(Ordering::Relaxed),
            dump: shared.dump.load(Ordering::Relaxed),
            counter,
        };

        let events = match shared.firmware {
            FirmwareKind::Dig1Psd => dig1::decode(&raw, Dig1Variant::Psd, &ctx),
            FirmwareKind::Dig1Pha => dig1::decode(&raw, Dig1Variant::Pha, &ctx),
            FirmwareKind::Dig2 => dig2::decode(&raw, &ctx),
        };

        if !events.is_empty() {
            shared.output.lock().unwrap().extend(events);
        }
    }
}
