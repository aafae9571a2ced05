//! Raw data buffers and their classification

/// One undecoded transport frame from a digitizer
///
/// The device-read layer fills one `RawBuffer` per read and moves it into
/// the pipeline via [`submit`](crate::DecodePipeline::submit). The buffer
/// length must be a multiple of the firmware word size (4 bytes for the
/// dig1 families, 8 bytes for dig2).
#[derive(Debug, Clone)]
pub struct RawBuffer {
    /// Raw bytes as received from the device
    pub data: Vec<u8>,
    /// Size in bytes (equals `data.len()`)
    pub size: usize,
    /// Event-count hint reported by the hardware (0 if unknown)
    pub n_events: u32,
}

impl RawBuffer {
    /// Create a buffer from a byte vector
    pub fn new(data: Vec<u8>) -> Self {
        let size = data.len();
        Self {
            data,
            size,
            n_events: 0,
        }
    }

    /// Create an empty buffer with reserved capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            size: 0,
            n_events: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop the contents, keeping the allocation
    pub fn clear(&mut self) {
        self.data.clear();
        self.size = 0;
        self.n_events = 0;
    }
}

/// Classification of a submitted buffer
///
/// Control buffers (`Start`, `Stop`) switch the pipeline run state and are
/// never decoded; `Event` buffers are enqueued for decoding while running;
/// `Unknown` buffers are logged and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Start-of-acquisition signal
    Start,
    /// End-of-acquisition signal
    Stop,
    /// Normal event data
    Event,
    /// Unrecognized or malformed data
    Unknown,
}
