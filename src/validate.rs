//! Structural validation of parsed wire fields
//!
//! Pure functions over already-extracted bit-fields. Decoders call these
//! before trusting a declared size or selector; a non-`Ok` outcome is
//! logged by the caller and the offending block is abandoned without
//! touching events decoded before the error point.

use std::fmt;

/// Result of a structural check or a decode step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Ok,
    /// Header magic or marker bits do not match the format
    InvalidHeader(&'static str),
    /// Fewer words available than the structure requires
    InsufficientData { need: usize, have: usize },
    /// A read past the end of the buffer
    OutOfBounds,
    /// A field value that cannot occur in well-formed data
    CorruptedData(&'static str),
    /// Channel-pair index outside 0..8
    InvalidChannelPair(u8),
    /// Waveform sample count above the format limit
    InvalidWaveformSize(usize),
    /// Reconstructed timestamp is negative or not finite
    TimestampError,
    /// Buffer contents match no known structure
    UnknownDataType,
    /// Buffer length is not a multiple of the firmware word size
    SizeAlignment,
}

impl DecodeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, DecodeOutcome::Ok)
    }
}

impl fmt::Display for DecodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::InvalidHeader(reason) => write!(f, "invalid header: {reason}"),
            Self::InsufficientData { need, have } => {
                write!(f, "insufficient data: need {need} words, have {have}")
            }
            Self::OutOfBounds => write!(f, "read out of bounds"),
            Self::CorruptedData(reason) => write!(f, "corrupted data: {reason}"),
            Self::InvalidChannelPair(n) => write!(f, "invalid channel pair {n}"),
            Self::InvalidWaveformSize(n) => write!(f, "invalid waveform size {n}"),
            Self::TimestampError => write!(f, "timestamp out of range"),
            Self::UnknownDataType => write!(f, "unknown data type"),
            Self::SizeAlignment => write!(f, "size not aligned to word boundary"),
        }
    }
}

/// Fixed format limits
pub mod limits {
    /// Channel pairs per dig1 board aggregate
    pub const MAX_CHANNEL_PAIRS: u8 = 8;
    /// Highest dig1 board identifier
    pub const MAX_BOARD_ID: u8 = 31;
    /// Highest dig2 channel number
    pub const MAX_CHANNEL: u8 = 127;
    /// Upper bound on waveform samples per event
    pub const MAX_WAVEFORM_SAMPLES: usize = 65_536;
    /// Highest dig1 digital-probe selector (DP1/DP2)
    pub const MAX_DIGITAL_PROBE_SELECT: u8 = 7;
    /// Highest dig1 analog-probe selector
    pub const MAX_ANALOG_PROBE_SELECT: u8 = 3;
}

/// Check buffer length against word alignment and a minimum word count
pub fn check_raw_buffer(size_bytes: usize, word_size: usize, min_words: usize) -> DecodeOutcome {
    if size_bytes == 0 || !size_bytes.is_multiple_of(word_size) {
        return DecodeOutcome::SizeAlignment;
    }
    let have = size_bytes / word_size;
    if have < min_words {
        return DecodeOutcome::InsufficientData {
            need: min_words,
            have,
        };
    }
    DecodeOutcome::Ok
}

/// Check the dig1 board-header magic nibble and board identifier
pub fn check_board_header(type_nibble: u32, board_id: u8) -> DecodeOutcome {
    if type_nibble != 0xA {
        return DecodeOutcome::InvalidHeader("board header type is not 0xA");
    }
    if board_id > limits::MAX_BOARD_ID {
        return DecodeOutcome::CorruptedData("board id out of range");
    }
    DecodeOutcome::Ok
}

/// Check a dig1 channel-pair index
pub fn check_channel_pair(pair: u8) -> DecodeOutcome {
    if pair >= limits::MAX_CHANNEL_PAIRS {
        return DecodeOutcome::InvalidChannelPair(pair);
    }
    DecodeOutcome::Ok
}

/// Check a dig2 channel number
pub fn check_channel(channel: u8) -> DecodeOutcome {
    if channel > limits::MAX_CHANNEL {
        return DecodeOutcome::CorruptedData("channel number out of range");
    }
    DecodeOutcome::Ok
}

/// Check a waveform sample count against the format limit
pub fn check_waveform_samples(samples: usize) -> DecodeOutcome {
    if samples > limits::MAX_WAVEFORM_SAMPLES {
        return DecodeOutcome::InvalidWaveformSize(samples);
    }
    DecodeOutcome::Ok
}

/// Check dig1 PSD probe selectors against their allowed ranges
pub fn check_psd_probe_selection(dp1: u8, dp2: u8, analog: u8) -> DecodeOutcome {
    if dp1 > limits::MAX_DIGITAL_PROBE_SELECT || dp2 > limits::MAX_DIGITAL_PROBE_SELECT {
        return DecodeOutcome::CorruptedData("digital probe selector out of range");
    }
    if analog > limits::MAX_ANALOG_PROBE_SELECT {
        return DecodeOutcome::CorruptedData("analog probe selector out of range");
    }
    DecodeOutcome::Ok
}

/// Check a declared block end against the enclosing bound
///
/// Callers clamp and continue on `OutOfBounds`; the check only reports.
pub fn check_block_bounds(block_end: usize, bound: usize) -> DecodeOutcome {
    if block_end > bound {
        return DecodeOutcome::OutOfBounds;
    }
    DecodeOutcome::Ok
}

/// Check a reconstructed timestamp for finiteness and sign
pub fn check_timestamp(timestamp_ns: f64) -> DecodeOutcome {
    if !timestamp_ns.is_finite() || timestamp_ns < 0.0 {
        return DecodeOutcome::TimestampError;
    }
    DecodeOutcome::Ok
}
