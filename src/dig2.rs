//! Decoder for second-generation digitizer raw data
//!
//! The dig2 format streams 64-bit words in a flat Event + Waveform layout.
//! The wire is Big-Endian: every 8-byte word is reversed in place on submit,
//! so all extraction here works on native-order words.
//!
//! Unlike dig1, the stream carries control signals: a 4-word Start sentinel
//! and a 3-word Stop sentinel (with a dead-time report) gate the pipeline
//! run state.

use std::cmp::Ordering;

use tracing::{debug, error, warn};

use crate::event::EventData;
use crate::pipeline::DecodeContext;
use crate::raw::{RawBuffer, SignalKind};
use crate::reader::Reader64;
use crate::validate::{self, DecodeOutcome};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

mod constants {
    pub const WORD_SIZE: usize = 8; // 64-bit

    pub mod header {
        pub const TYPE_SHIFT: u32 = 60;
        pub const TYPE_MASK: u64 = 0xF;
        pub const TYPE_DATA: u64 = 0x2;
        pub const FAIL_CHECK_SHIFT: u32 = 56;
        pub const FAIL_CHECK_MASK: u64 = 0x1;
        pub const AGGREGATE_COUNTER_SHIFT: u32 = 32;
        pub const AGGREGATE_COUNTER_MASK: u64 = 0xFFFF;
        pub const TOTAL_SIZE_MASK: u64 = 0xFFFF_FFFF;
    }

    pub mod event {
        // First word
        pub const CHANNEL_SHIFT: u32 = 56;
        pub const CHANNEL_MASK: u64 = 0x7F;
        pub const TIMESTAMP_MASK: u64 = 0xFFFF_FFFF_FFFF; // 48 bits

        // Second word
        pub const WAVEFORM_FLAG_SHIFT: u32 = 62;
        pub const FLAGS_LOW_PRIORITY_SHIFT: u32 = 50;
        pub const FLAGS_LOW_PRIORITY_MASK: u64 = 0x7FF;
        pub const FLAGS_HIGH_PRIORITY_SHIFT: u32 = 42;
        pub const FLAGS_HIGH_PRIORITY_MASK: u64 = 0xFF;
        pub const FLAGS_HIGH_PRIORITY_POSITION: u32 = 11;
        pub const ENERGY_SHORT_SHIFT: u32 = 26;
        pub const ENERGY_SHORT_MASK: u64 = 0xFFFF;
        pub const FINE_TIME_SHIFT: u32 = 16;
        pub const FINE_TIME_MASK: u64 = 0x3FF;
        pub const FINE_TIME_SCALE: f64 = 1024.0;
        pub const ENERGY_MASK: u64 = 0xFFFF;
    }

    pub mod waveform {
        // Waveform header word
        pub const CHECK1_SHIFT: u32 = 63;
        pub const CHECK2_SHIFT: u32 = 60;
        pub const CHECK2_MASK: u64 = 0x7;
        pub const TIME_RESOLUTION_SHIFT: u32 = 44;
        pub const TIME_RESOLUTION_MASK: u64 = 0x3;
        pub const TRIGGER_THRESHOLD_SHIFT: u32 = 28;
        pub const TRIGGER_THRESHOLD_MASK: u64 = 0xFFFF;
        pub const DP4_TYPE_SHIFT: u32 = 24;
        pub const DP3_TYPE_SHIFT: u32 = 20;
        pub const DP2_TYPE_SHIFT: u32 = 16;
        pub const DP1_TYPE_SHIFT: u32 = 12;
        pub const DP_TYPE_MASK: u64 = 0xF;
        pub const AP2_TYPE_SHIFT: u32 = 6;
        pub const AP_TYPE_MASK: u64 = 0x7;
        pub const AP1_SIGNED_SHIFT: u32 = 3;
        pub const AP1_MUL_SHIFT: u32 = 4;
        pub const AP2_SIGNED_SHIFT: u32 = 9;
        pub const AP2_MUL_SHIFT: u32 = 10;
        pub const MUL_MASK: u64 = 0x3;

        // Count word
        pub const WAVEFORM_WORDS_MASK: u64 = 0xFFF;

        // Sample words: two 32-bit points per word
        pub const ANALOG_PROBE_MASK: u32 = 0x3FFF;
        pub const ANALOG_SIGN_BIT: u32 = 0x2000;
        pub const ANALOG_SIGN_EXTENSION: u32 = 0xFFFF_C000;
        pub const ANALOG_PROBE2_SHIFT: u32 = 16;
        pub const DIGITAL_PROBE1_SHIFT: u32 = 14;
        pub const DIGITAL_PROBE2_SHIFT: u32 = 15;
        pub const DIGITAL_PROBE3_SHIFT: u32 = 30;
        pub const DIGITAL_PROBE4_SHIFT: u32 = 31;
    }

    pub mod signal {
        pub const TYPE_SHIFT: u32 = 60;
        pub const SUBTYPE_SHIFT: u32 = 56;
        pub const NIBBLE_MASK: u64 = 0xF;
        pub const CONTROL_TYPE: u64 = 0x3;
        pub const START_SUBTYPE: u64 = 0x0;
        pub const STOP_SUBTYPE: u64 = 0x2;
        pub const START_WORDS: usize = 4;
        pub const STOP_WORDS: usize = 3;
        pub const MIN_WORDS: usize = 3;
        pub const DEAD_TIME_MASK: u64 = 0xFFFF_FFFF;
        pub const DEAD_TIME_UNIT_NS: u64 = 8;
    }
}

/// Scaling configuration for the two analog probes of one waveform
#[derive(Debug, Clone, Copy)]
struct WaveformConfig {
    ap1_signed: bool,
    ap1_mul: i32,
    ap2_signed: bool,
    ap2_mul: i32,
}

// ---------------------------------------------------------------------------
// Endianness and classification
// ---------------------------------------------------------------------------

/// Reverse each 8-byte word in place (wire Big-Endian → native order)
pub(crate) fn to_native_order(data: &mut [u8]) {
    for word in data.chunks_exact_mut(constants::WORD_SIZE) {
        word.reverse();
    }
}

/// Classify a dig2 buffer (already byte-reversed)
///
/// A 3-word buffer matching the Stop sentinel is `Stop`; a 4-word buffer
/// matching the Start sentinel is `Start`; anything else of at least 3
/// words is `Event`; shorter buffers are `Unknown`.
pub(crate) fn classify(raw: &RawBuffer) -> SignalKind {
    use constants::signal::*;

    let reader = Reader64::new(&raw.data);
    let words = reader.total_words();
    if words < MIN_WORDS {
        return SignalKind::Unknown;
    }
    if words == STOP_WORDS && is_stop(&reader) {
        return SignalKind::Stop;
    }
    if words == START_WORDS && is_start(&reader) {
        return SignalKind::Start;
    }
    SignalKind::Event
}

fn type_nibble(word: u64) -> u64 {
    (word >> constants::signal::TYPE_SHIFT) & constants::signal::NIBBLE_MASK
}

fn subtype_nibble(word: u64) -> u64 {
    (word >> constants::signal::SUBTYPE_SHIFT) & constants::signal::NIBBLE_MASK
}

fn is_stop(reader: &Reader64) -> bool {
    use constants::signal::*;

    let (Some(w0), Some(w1), Some(w2)) =
        (reader.try_read(0), reader.try_read(1), reader.try_read(2))
    else {
        return false;
    };
    type_nibble(w0) == CONTROL_TYPE
        && subtype_nibble(w0) == STOP_SUBTYPE
        && subtype_nibble(w1) == 0x0
        && subtype_nibble(w2) == 0x1
}

fn is_start(reader: &Reader64) -> bool {
    use constants::signal::*;

    let (Some(w0), Some(w1), Some(w2), Some(w3)) = (
        reader.try_read(0),
        reader.try_read(1),
        reader.try_read(2),
        reader.try_read(3),
    ) else {
        return false;
    };
    type_nibble(w0) == CONTROL_TYPE
        && subtype_nibble(w0) == START_SUBTYPE
        && subtype_nibble(w1) == 0x2
        && subtype_nibble(w2) == 0x1
        && subtype_nibble(w3) == 0x1
}

/// Dead time reported by a Stop sentinel, in nanoseconds
pub(crate) fn stop_dead_time_ns(raw: &RawBuffer) -> Option<u64> {
    use constants::signal::*;

    let reader = Reader64::new(&raw.data);
    let w2 = reader.try_read(2)?;
    Some((w2 & DEAD_TIME_MASK) * DEAD_TIME_UNIT_NS)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one dig2 data buffer into events, sorted by timestamp
pub(crate) fn decode(raw: &RawBuffer, ctx: &DecodeContext) -> Vec<EventData> {
    use constants::header::*;

    let outcome = validate::check_raw_buffer(raw.size, constants::WORD_SIZE, 1);
    if !outcome.is_ok() {
        error!(%outcome, size = raw.size, "dig2 buffer rejected");
        return Vec::new();
    }

    if ctx.dump {
        dump_raw(raw);
    }

    let reader = Reader64::new(&raw.data);
    let header = match reader.read(0) {
        Ok(word) => word,
        Err(outcome) => {
            error!(%outcome, "dig2 header unreadable");
            return Vec::new();
        }
    };

    let header_type = (header >> TYPE_SHIFT) & TYPE_MASK;
    if header_type != TYPE_DATA {
        error!(
            header_type = format_args!("{:#x}", header_type),
            "invalid dig2 header type"
        );
        return Vec::new();
    }
    if (header >> FAIL_CHECK_SHIFT) & FAIL_CHECK_MASK != 0 {
        warn!("board fail bit set");
    }
    ctx.check_counter((header >> AGGREGATE_COUNTER_SHIFT) & AGGREGATE_COUNTER_MASK);

    let declared = (header & TOTAL_SIZE_MASK) as usize;
    let total_words = reader.total_words();
    let total_size = if declared > total_words {
        warn!(declared, actual = total_words, "declared size clamped to buffer");
        total_words
    } else {
        if declared != total_words {
            warn!(declared, actual = total_words, "header size mismatch");
        }
        declared
    };

    let mut events = Vec::with_capacity(total_size / 2);
    let mut word_index = 1; // Skip header

    while word_index < total_size {
        match decode_event(&reader, &mut word_index, ctx) {
            Ok(event) => events.push(event),
            Err(outcome) => {
                error!(%outcome, word_index, "event group abandoned");
                break;
            }
        }
    }

    events.sort_by(|a, b| {
        a.timestamp_ns
            .partial_cmp(&b.timestamp_ns)
            .unwrap_or(Ordering::Equal)
    });

    if ctx.dump {
        debug!(events = events.len(), words = total_size, "dig2 buffer decoded");
    }

    events
}

/// Decode one event group (two words plus an optional waveform)
fn decode_event(
    reader: &Reader64,
    word_index: &mut usize,
    ctx: &DecodeContext,
) -> Result<EventData, DecodeOutcome> {
    use constants::event::*;

    let have = reader.remaining_words(*word_index);
    if have < 2 {
        return Err(DecodeOutcome::InsufficientData { need: 2, have });
    }

    let first_word = reader.read(*word_index)?;
    *word_index += 1;
    let second_word = reader.read(*word_index)?;
    *word_index += 1;

    let channel = ((first_word >> CHANNEL_SHIFT) & CHANNEL_MASK) as u8;
    let outcome = validate::check_channel(channel);
    if !outcome.is_ok() {
        return Err(outcome);
    }
    let raw_timestamp = first_word & TIMESTAMP_MASK;

    let flags_low = (second_word >> FLAGS_LOW_PRIORITY_SHIFT) & FLAGS_LOW_PRIORITY_MASK;
    let flags_high = (second_word >> FLAGS_HIGH_PRIORITY_SHIFT) & FLAGS_HIGH_PRIORITY_MASK;
    let fine_time = (second_word >> FINE_TIME_SHIFT) & FINE_TIME_MASK;

    let mut event = EventData::new(0);
    event.channel = channel;
    event.module = ctx.module;
    event.time_resolution_ns = ctx.time_step as u8;
    event.flags = (flags_high << FLAGS_HIGH_PRIORITY_POSITION) | flags_low;
    event.energy = (second_word & ENERGY_MASK) as u16;
    event.energy_short = ((second_word >> ENERGY_SHORT_SHIFT) & ENERGY_SHORT_MASK) as u16;

    let coarse_ns = raw_timestamp as f64 * ctx.time_step_ns();
    let fine_ns = (fine_time as f64 / FINE_TIME_SCALE) * ctx.time_step_ns();
    event.timestamp_ns = coarse_ns + fine_ns;
    let outcome = validate::check_timestamp(event.timestamp_ns);
    if !outcome.is_ok() {
        return Err(outcome);
    }

    let has_waveform = (second_word >> WAVEFORM_FLAG_SHIFT) & 0x1 != 0;
    if has_waveform {
        decode_waveform(reader, word_index, &mut event)?;
    }

    if ctx.dump {
        debug!(
            channel = event.channel,
            timestamp_ns = event.timestamp_ns,
            energy = event.energy,
            energy_short = event.energy_short,
            flags = format_args!("{:#x}", event.flags),
            waveform = event.waveform_size,
            "decoded dig2 event"
        );
    }

    Ok(event)
}

fn decode_waveform(
    reader: &Reader64,
    word_index: &mut usize,
    event: &mut EventData,
) -> Result<(), DecodeOutcome> {
    use constants::waveform::*;

    let have = reader.remaining_words(*word_index);
    if have < 2 {
        return Err(DecodeOutcome::InsufficientData { need: 2, have });
    }

    let wf_header = reader.read(*word_index)?;
    *word_index += 1;

    let check1 = (wf_header >> CHECK1_SHIFT) & 0x1;
    let check2 = (wf_header >> CHECK2_SHIFT) & CHECK2_MASK;
    if check1 != 1 || check2 != 0 {
        return Err(DecodeOutcome::InvalidHeader("waveform header check bits"));
    }

    let time_resolution = (wf_header >> TIME_RESOLUTION_SHIFT) & TIME_RESOLUTION_MASK;
    event.down_sample_factor = 1 << time_resolution;
    let trigger_threshold = (wf_header >> TRIGGER_THRESHOLD_SHIFT) & TRIGGER_THRESHOLD_MASK;

    event.digital_probe4_type = ((wf_header >> DP4_TYPE_SHIFT) & DP_TYPE_MASK) as u8;
    event.digital_probe3_type = ((wf_header >> DP3_TYPE_SHIFT) & DP_TYPE_MASK) as u8;
    event.digital_probe2_type = ((wf_header >> DP2_TYPE_SHIFT) & DP_TYPE_MASK) as u8;
    event.digital_probe1_type = ((wf_header >> DP1_TYPE_SHIFT) & DP_TYPE_MASK) as u8;
    event.analog_probe2_type = ((wf_header >> AP2_TYPE_SHIFT) & AP_TYPE_MASK) as u8;
    event.analog_probe1_type = (wf_header & AP_TYPE_MASK) as u8;

    let config = WaveformConfig {
        ap1_signed: (wf_header >> AP1_SIGNED_SHIFT) & 0x1 != 0,
        ap1_mul: multiplication_factor((wf_header >> AP1_MUL_SHIFT) & MUL_MASK),
        ap2_signed: (wf_header >> AP2_SIGNED_SHIFT) & 0x1 != 0,
        ap2_mul: multiplication_factor((wf_header >> AP2_MUL_SHIFT) & MUL_MASK),
    };

    let n_words = (reader.read(*word_index)? & WAVEFORM_WORDS_MASK) as usize;
    *word_index += 1;

    let n_samples = n_words * 2;
    let outcome = validate::check_waveform_samples(n_samples);
    if !outcome.is_ok() {
        return Err(outcome);
    }
    let have = reader.remaining_words(*word_index);
    if have < n_words {
        return Err(DecodeOutcome::InsufficientData {
            need: n_words,
            have,
        });
    }

    event.resize_waveform(n_samples);

    for i in 0..n_words {
        let word = reader.read(*word_index)?;
        *word_index += 1;

        let points = [word as u32, (word >> 32) as u32];
        for (half, &point) in points.iter().enumerate() {
            decode_waveform_point(point, i * 2 + half, &config, event);
        }
    }

    debug!(
        samples = n_samples,
        down_sample = event.down_sample_factor,
        trigger_threshold,
        "waveform decoded"
    );

    Ok(())
}

/// Unpack one 32-bit sample point into the six probe sequences
fn decode_waveform_point(
    point: u32,
    index: usize,
    config: &WaveformConfig,
    event: &mut EventData,
) {
    use constants::waveform::*;

    let analog1 = analog_value(point & ANALOG_PROBE_MASK, config.ap1_signed);
    let analog2 = analog_value(
        (point >> ANALOG_PROBE2_SHIFT) & ANALOG_PROBE_MASK,
        config.ap2_signed,
    );
    event.analog_probe1[index] = analog1 * config.ap1_mul;
    event.analog_probe2[index] = analog2 * config.ap2_mul;

    event.digital_probe1[index] = ((point >> DIGITAL_PROBE1_SHIFT) & 0x1) as u8;
    event.digital_probe2[index] = ((point >> DIGITAL_PROBE2_SHIFT) & 0x1) as u8;
    event.digital_probe3[index] = ((point >> DIGITAL_PROBE3_SHIFT) & 0x1) as u8;
    event.digital_probe4[index] = ((point >> DIGITAL_PROBE4_SHIFT) & 0x1) as u8;
}

/// Sign-extend a 14-bit analog sample when the probe is configured signed
fn analog_value(raw: u32, signed: bool) -> i32 {
    use constants::waveform::{ANALOG_SIGN_BIT, ANALOG_SIGN_EXTENSION};

    if signed && raw & ANALOG_SIGN_BIT != 0 {
        (raw | ANALOG_SIGN_EXTENSION) as i32
    } else {
        raw as i32
    }
}

/// Analog probe multiplication factor encoding
fn multiplication_factor(encoded: u64) -> i32 {
    match encoded {
        0 => 1,
        1 => 4,
        2 => 8,
        3 => 16,
        _ => 1,
    }
}

fn dump_raw(raw: &RawBuffer) {
    debug!(size = raw.size, n_events = raw.n_events, "dig2 raw buffer");
    let reader = Reader64::new(&raw.data);
    let num_words = reader.total_words();
    for i in 0..num_words.min(20) {
        if let Some(word) = reader.try_read(i) {
            debug!("word {:4}: {:#018x} {:064b}", i, word, word);
        }
    }
    if num_words > 20 {
        debug!("... ({} more words)", num_words - 20);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
