//! Decoder for first-generation digitizer raw data (DPP-PSD / DPP-PHA)
//!
//! The dig1 families stream 32-bit Little-Endian words in a hierarchical
//! layout: Board Aggregate → Dual Channel Block → Events.
//!
//! Key properties:
//! - 32-bit LE words (dig2 uses 64-bit BE)
//! - Channel pairing: `channel = pair * 2 + channel_flag`
//! - 47-bit composite timestamp: `(extended_time << 31) + trigger_time_tag`
//! - No Start/Stop signals on the wire; the pipeline runs from construction
//!
//! PSD and PHA share the block walker and differ in the pair-header layout
//! (probe selectors, block-size width) and in the final event word (charge
//! integrals vs. PHA energy).

use std::cmp::Ordering;

use tracing::{debug, error, warn};

use crate::event::EventData;
use crate::pipeline::DecodeContext;
use crate::raw::{RawBuffer, SignalKind};
use crate::reader::Reader32;
use crate::validate::{self, limits, DecodeOutcome};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

mod constants {
    pub const WORD_SIZE: usize = 4; // 32-bit

    pub mod board_header {
        pub const HEADER_WORDS: usize = 4;

        // Word 0
        pub const TYPE_SHIFT: u32 = 28;
        pub const TYPE_MASK: u32 = 0xF;
        pub const TYPE_DATA: u32 = 0xA;
        pub const AGGREGATE_SIZE_MASK: u32 = 0x0FFF_FFFF;

        // Word 1
        pub const DUAL_CHANNEL_MASK: u32 = 0xFF;
        pub const LVDS_PATTERN_SHIFT: u32 = 8;
        pub const LVDS_PATTERN_MASK: u32 = 0x7FFF;
        pub const BOARD_FAIL_SHIFT: u32 = 26;
        pub const BOARD_ID_SHIFT: u32 = 27;
        pub const BOARD_ID_MASK: u32 = 0x1F;

        // Word 2
        pub const COUNTER_MASK: u32 = 0x7F_FFFF;
    }

    pub mod pair_header {
        pub const HEADER_WORDS: usize = 2;

        // Word 0
        pub const MARKER_SHIFT: u32 = 31;
        pub const PSD_SIZE_MASK: u32 = 0x3F_FFFF; // [0:21]
        pub const PHA_SIZE_MASK: u32 = 0x7FFF_FFFF; // [0:30]

        // Word 1, common
        pub const NUM_SAMPLES_MASK: u32 = 0xFFFF;
        pub const EXTRAS_FORMAT_SHIFT: u32 = 24;
        pub const EXTRAS_FORMAT_MASK: u32 = 0x7;
        pub const SAMPLES_ENABLED_SHIFT: u32 = 27;
        pub const EXTRAS_ENABLED_SHIFT: u32 = 28;
        pub const TIME_ENABLED_SHIFT: u32 = 29;
        pub const CHARGE_ENABLED_SHIFT: u32 = 30;
        pub const DUAL_TRACE_SHIFT: u32 = 31;

        // Word 1, PSD probe selectors
        pub const PSD_DP1_SHIFT: u32 = 16;
        pub const PSD_DP1_MASK: u32 = 0x7;
        pub const PSD_DP2_SHIFT: u32 = 19;
        pub const PSD_DP2_MASK: u32 = 0x7;
        pub const PSD_ANALOG_SHIFT: u32 = 22;
        pub const PSD_ANALOG_MASK: u32 = 0x3;

        // Word 1, PHA probe selectors
        pub const PHA_DP_SHIFT: u32 = 16;
        pub const PHA_DP_MASK: u32 = 0xF;
        pub const PHA_ANALOG2_SHIFT: u32 = 20;
        pub const PHA_ANALOG2_MASK: u32 = 0x3;
        pub const PHA_ANALOG1_SHIFT: u32 = 22;
        pub const PHA_ANALOG1_MASK: u32 = 0x3;
    }

    pub mod event {
        // Trigger time tag word
        pub const TRIGGER_TIME_MASK: u32 = 0x7FFF_FFFF;
        pub const CHANNEL_FLAG_SHIFT: u32 = 31;

        // Extras word (format 0b010)
        pub const FINE_TIME_MASK: u32 = 0x3FF;
        pub const FLAGS_SHIFT: u32 = 10;
        pub const FLAGS_MASK: u32 = 0x3F;
        pub const EXTENDED_TIME_SHIFT: u32 = 16;
        pub const EXTENDED_TIME_MASK: u32 = 0xFFFF;

        // Extras format selector values
        pub const FORMAT_EXTENDED_ONLY: u8 = 0b000;
        pub const FORMAT_EXTENDED_ONLY_ALT: u8 = 0b001;
        pub const FORMAT_FLAGS_FINE: u8 = 0b010;

        // Charge word (PSD)
        pub const CHARGE_SHORT_MASK: u32 = 0x7FFF;
        pub const PILEUP_FLAG_SHIFT: u32 = 15;
        pub const CHARGE_LONG_SHIFT: u32 = 16;
        pub const CHARGE_LONG_MASK: u32 = 0xFFFF;

        // Energy word (PHA)
        pub const PHA_ENERGY_MASK: u32 = 0x7FFF;
        pub const PHA_EXTRA_SHIFT: u32 = 16;
        pub const PHA_EXTRA_MASK: u32 = 0x3FF;

        // Composite timestamp
        pub const EXTENDED_TIME_POSITION: u32 = 31;
        pub const FINE_TIME_SCALE: f64 = 1024.0;
    }

    pub mod waveform {
        pub const ANALOG_SAMPLE_MASK: u32 = 0x3FFF; // [0:13] or [16:29]
        pub const DP1_SHIFT: u32 = 14; // [14] or [30]
        pub const DP2_SHIFT: u32 = 15; // [15] or [31]
        pub const SECOND_SAMPLE_SHIFT: u32 = 16;
        pub const SAMPLE_MASK: u32 = 0xFFFF;
        pub const SAMPLES_PER_GROUP: usize = 8; // num_samples field is samples/8
        pub const WORDS_PER_GROUP: usize = 2;
    }
}

/// Pair-header layout variant within the dig1 family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dig1Variant {
    Psd,
    Pha,
}

// ---------------------------------------------------------------------------
// Parsed header structures
// ---------------------------------------------------------------------------

/// Board Aggregate header (4 words)
#[derive(Debug, Clone, PartialEq)]
struct BoardHeader {
    aggregate_size: u32,
    dual_channel_mask: u8,
    lvds_pattern: u16,
    board_fail: bool,
    board_id: u8,
    aggregate_counter: u32,
    board_time_tag: u32,
}

/// Dual Channel (pair) header (2 words)
#[derive(Debug, Clone)]
struct PairHeader {
    aggregate_size: u32,
    samples_div8: u16,
    digital_probe1: u8,
    digital_probe2: u8,
    analog_probe1: u8,
    analog_probe2: u8,
    extras_format: u8,
    samples_enabled: bool,
    extras_enabled: bool,
    time_enabled: bool,
    charge_enabled: bool,
    dual_trace: bool,
}

/// Fields carried by a decoded extras word
#[derive(Debug, Clone, Copy)]
struct ExtrasWord {
    extended_time: u16,
    fine_time: Option<u16>,
    flags: u64,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify a dig1 buffer
///
/// The wire has no Start/Stop markers, so the only outcomes are `Event`
/// (valid board-header magic) and `Unknown`.
pub(crate) fn classify(raw: &RawBuffer) -> SignalKind {
    use constants::board_header;

    if !validate::check_raw_buffer(raw.size, constants::WORD_SIZE, board_header::HEADER_WORDS)
        .is_ok()
    {
        return SignalKind::Unknown;
    }

    let reader = Reader32::new(&raw.data);
    match reader.try_read(0) {
        Some(w0) if (w0 >> board_header::TYPE_SHIFT) & board_header::TYPE_MASK
            == board_header::TYPE_DATA =>
        {
            SignalKind::Event
        }
        _ => SignalKind::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one dig1 buffer into events, sorted by timestamp
///
/// Structural failures abandon the remainder of the buffer; events decoded
/// before the failure point are kept.
pub(crate) fn decode(raw: &RawBuffer, variant: Dig1Variant, ctx: &DecodeContext) -> Vec<EventData> {
    let outcome = validate::check_raw_buffer(
        raw.size,
        constants::WORD_SIZE,
        constants::board_header::HEADER_WORDS,
    );
    if !outcome.is_ok() {
        error!(%outcome, size = raw.size, "dig1 buffer rejected");
        return Vec::new();
    }

    if ctx.dump {
        dump_raw(raw);
    }

    let reader = Reader32::new(&raw.data);
    let total_words = reader.total_words();
    let mut events = Vec::with_capacity(total_words / 20);
    let mut word_index = 0usize;

    while word_index < total_words {
        let outcome = decode_board_block(&reader, &mut word_index, variant, ctx, &mut events);
        if !outcome.is_ok() {
            error!(%outcome, word_index, "board aggregate abandoned");
            break;
        }
    }

    events.sort_by(|a, b| {
        a.timestamp_ns
            .partial_cmp(&b.timestamp_ns)
            .unwrap_or(Ordering::Equal)
    });

    if ctx.dump {
        debug!(
            events = events.len(),
            words = total_words,
            "dig1 buffer decoded"
        );
    }

    events
}

fn decode_board_block(
    reader: &Reader32,
    word_index: &mut usize,
    variant: Dig1Variant,
    ctx: &DecodeContext,
    events: &mut Vec<EventData>,
) -> DecodeOutcome {
    use constants::board_header::HEADER_WORDS;

    let board = match decode_board_header(reader, word_index) {
        Ok(board) => board,
        Err(outcome) => return outcome,
    };

    if board.board_fail {
        warn!(board_id = board.board_id, "board fail bit set");
    }
    ctx.check_counter(board.aggregate_counter as u64);

    if ctx.dump {
        debug!(
            size = board.aggregate_size,
            mask = format_args!("{:#04x}", board.dual_channel_mask),
            board_id = board.board_id,
            lvds = board.lvds_pattern,
            time_tag = board.board_time_tag,
            "board aggregate header"
        );
    }

    if (board.aggregate_size as usize) < HEADER_WORDS {
        return DecodeOutcome::CorruptedData("board aggregate smaller than its header");
    }

    let mut board_end = *word_index - HEADER_WORDS + board.aggregate_size as usize;
    if !validate::check_block_bounds(board_end, reader.total_words()).is_ok() {
        warn!(
            declared = board_end,
            total = reader.total_words(),
            "board aggregate clamped to buffer end"
        );
        board_end = reader.total_words();
    }

    for pair in 0..limits::MAX_CHANNEL_PAIRS {
        if board.dual_channel_mask & (1 << pair) == 0 {
            continue;
        }
        if *word_index >= board_end {
            warn!(pair, "board aggregate ended before all masked pairs");
            break;
        }
        if let Err(outcome) = decode_pair_block(reader, word_index, board_end, pair, variant, ctx, events)
        {
            error!(%outcome, pair, "channel pair abandoned");
            break;
        }
    }

    // Jump over any padding left inside the board block.
    *word_index = board_end;
    DecodeOutcome::Ok
}

fn decode_board_header(
    reader: &Reader32,
    word_index: &mut usize,
) -> Result<BoardHeader, DecodeOutcome> {
    use constants::board_header::*;

    let have = reader.remaining_words(*word_index);
    if have < HEADER_WORDS {
        return Err(DecodeOutcome::InsufficientData {
            need: HEADER_WORDS,
            have,
        });
    }

    let w0 = reader.read(*word_index)?;
    let w1 = reader.read(*word_index + 1)?;
    let w2 = reader.read(*word_index + 2)?;
    let w3 = reader.read(*word_index + 3)?;
    *word_index += HEADER_WORDS;

    let type_nibble = (w0 >> TYPE_SHIFT) & TYPE_MASK;
    let board_id = ((w1 >> BOARD_ID_SHIFT) & BOARD_ID_MASK) as u8;
    let outcome = validate::check_board_header(type_nibble, board_id);
    if !outcome.is_ok() {
        return Err(outcome);
    }

    Ok(BoardHeader {
        aggregate_size: w0 & AGGREGATE_SIZE_MASK,
        dual_channel_mask: (w1 & DUAL_CHANNEL_MASK) as u8,
        lvds_pattern: ((w1 >> LVDS_PATTERN_SHIFT) & LVDS_PATTERN_MASK) as u16,
        board_fail: (w1 >> BOARD_FAIL_SHIFT) & 1 != 0,
        board_id,
        aggregate_counter: w2 & COUNTER_MASK,
        board_time_tag: w3,
    })
}

fn decode_pair_block(
    reader: &Reader32,
    word_index: &mut usize,
    board_end: usize,
    pair: u8,
    variant: Dig1Variant,
    ctx: &DecodeContext,
    events: &mut Vec<EventData>,
) -> Result<(), DecodeOutcome> {
    use constants::pair_header::HEADER_WORDS;

    let outcome = validate::check_channel_pair(pair);
    if !outcome.is_ok() {
        return Err(outcome);
    }

    let header = decode_pair_header(reader, word_index, variant)?;

    if ctx.dump {
        debug!(
            pair,
            size = header.aggregate_size,
            samples_div8 = header.samples_div8,
            time_enabled = header.time_enabled,
            extras_format = header.extras_format,
            dual_trace = header.dual_trace,
            "channel pair header"
        );
    }

    let mut pair_end = *word_index - HEADER_WORDS + header.aggregate_size as usize;
    if !validate::check_block_bounds(pair_end, board_end).is_ok() {
        warn!(
            pair,
            declared = pair_end,
            board_end,
            "channel pair clamped to board end"
        );
        pair_end = board_end;
    }

    while *word_index < pair_end {
        let event = decode_event(reader, word_index, &header, pair, variant, ctx)?;
        events.push(event);
    }

    *word_index = pair_end;
    Ok(())
}

fn decode_pair_header(
    reader: &Reader32,
    word_index: &mut usize,
    variant: Dig1Variant,
) -> Result<PairHeader, DecodeOutcome> {
    use constants::pair_header::*;
    use constants::waveform::SAMPLES_PER_GROUP;

    let have = reader.remaining_words(*word_index);
    if have < HEADER_WORDS {
        return Err(DecodeOutcome::InsufficientData {
            need: HEADER_WORDS,
            have,
        });
    }

    let w0 = reader.read(*word_index)?;
    let w1 = reader.read(*word_index + 1)?;
    *word_index += HEADER_WORDS;

    if (w0 >> MARKER_SHIFT) & 1 == 0 {
        return Err(DecodeOutcome::InvalidHeader("channel pair marker bit missing"));
    }

    let aggregate_size = match variant {
        Dig1Variant::Psd => w0 & PSD_SIZE_MASK,
        Dig1Variant::Pha => w0 & PHA_SIZE_MASK,
    };
    if (aggregate_size as usize) < HEADER_WORDS {
        return Err(DecodeOutcome::CorruptedData(
            "channel pair aggregate smaller than its header",
        ));
    }

    let samples_div8 = (w1 & NUM_SAMPLES_MASK) as u16;
    let outcome = validate::check_waveform_samples(samples_div8 as usize * SAMPLES_PER_GROUP);
    if !outcome.is_ok() {
        return Err(outcome);
    }

    let (digital_probe1, digital_probe2, analog_probe1, analog_probe2) = match variant {
        Dig1Variant::Psd => {
            let dp1 = ((w1 >> PSD_DP1_SHIFT) & PSD_DP1_MASK) as u8;
            let dp2 = ((w1 >> PSD_DP2_SHIFT) & PSD_DP2_MASK) as u8;
            let analog = ((w1 >> PSD_ANALOG_SHIFT) & PSD_ANALOG_MASK) as u8;
            let outcome = validate::check_psd_probe_selection(dp1, dp2, analog);
            if !outcome.is_ok() {
                return Err(outcome);
            }
            // A single selector drives both traces in dual-trace mode.
            (dp1, dp2, analog, analog)
        }
        Dig1Variant::Pha => {
            let dp = ((w1 >> PHA_DP_SHIFT) & PHA_DP_MASK) as u8;
            let ap1 = ((w1 >> PHA_ANALOG1_SHIFT) & PHA_ANALOG1_MASK) as u8;
            let ap2 = ((w1 >> PHA_ANALOG2_SHIFT) & PHA_ANALOG2_MASK) as u8;
            (dp, 0, ap1, ap2)
        }
    };

    Ok(PairHeader {
        aggregate_size,
        samples_div8,
        digital_probe1,
        digital_probe2,
        analog_probe1,
        analog_probe2,
        extras_format: ((w1 >> EXTRAS_FORMAT_SHIFT) & EXTRAS_FORMAT_MASK) as u8,
        samples_enabled: (w1 >> SAMPLES_ENABLED_SHIFT) & 1 != 0,
        extras_enabled: (w1 >> EXTRAS_ENABLED_SHIFT) & 1 != 0,
        time_enabled: (w1 >> TIME_ENABLED_SHIFT) & 1 != 0,
        charge_enabled: (w1 >> CHARGE_ENABLED_SHIFT) & 1 != 0,
        dual_trace: (w1 >> DUAL_TRACE_SHIFT) & 1 != 0,
    })
}

fn decode_event(
    reader: &Reader32,
    word_index: &mut usize,
    header: &PairHeader,
    pair: u8,
    variant: Dig1Variant,
    ctx: &DecodeContext,
) -> Result<EventData, DecodeOutcome> {
    use constants::event::*;
    use constants::waveform::SAMPLES_PER_GROUP;

    let time_word = reader.read(*word_index)?;
    *word_index += 1;

    let trigger_time_tag = time_word & TRIGGER_TIME_MASK;
    let odd_channel = ((time_word >> CHANNEL_FLAG_SHIFT) & 1) as u8;
    if trigger_time_tag == 0 {
        warn!(pair, "zero trigger time tag");
    }

    let waveform_len = header.samples_div8 as usize * SAMPLES_PER_GROUP;
    let mut event = EventData::new(if header.samples_enabled { waveform_len } else { 0 });
    event.channel = pair * 2 + odd_channel;
    event.module = ctx.module;
    event.time_resolution_ns = ctx.time_step as u8;
    event.digital_probe1_type = header.digital_probe1;
    event.digital_probe2_type = header.digital_probe2;
    event.analog_probe1_type = header.analog_probe1;
    if header.dual_trace {
        event.analog_probe2_type = header.analog_probe2;
    }

    if header.samples_enabled && waveform_len > 0 {
        decode_waveform(reader, word_index, header, &mut event)?;
    }

    let extras = if header.extras_enabled {
        let w = reader.read(*word_index)?;
        *word_index += 1;
        Some(decode_extras_word(w, header.extras_format))
    } else {
        None
    };

    let (extended_time, fine_time) = match extras {
        Some(x) => {
            event.flags |= x.flags;
            (x.extended_time, x.fine_time)
        }
        None => (0, None),
    };
    event.timestamp_ns =
        compose_timestamp(trigger_time_tag, extended_time, fine_time, ctx.time_step_ns());
    let outcome = validate::check_timestamp(event.timestamp_ns);
    if !outcome.is_ok() {
        return Err(outcome);
    }

    if header.charge_enabled {
        let w = reader.read(*word_index)?;
        *word_index += 1;
        match variant {
            Dig1Variant::Psd => {
                let (charge_long, charge_short, pileup) = decode_charge_word(w);
                event.energy = charge_long;
                event.energy_short = charge_short;
                if pileup {
                    event.flags |= EventData::FLAG_PILEUP;
                }
                if charge_long == 0 && charge_short == 0 {
                    warn!(channel = event.channel, "all-zero charge word");
                }
            }
            Dig1Variant::Pha => {
                let (energy, extra, pileup) = decode_energy_word(w);
                event.energy = energy;
                event.energy_short = extra;
                if pileup {
                    event.flags |= EventData::FLAG_PILEUP;
                }
            }
        }
    }

    if ctx.dump {
        debug!(
            channel = event.channel,
            timestamp_ns = event.timestamp_ns,
            energy = event.energy,
            energy_short = event.energy_short,
            flags = format_args!("{:#x}", event.flags),
            "decoded dig1 event"
        );
    }

    Ok(event)
}

fn decode_waveform(
    reader: &Reader32,
    word_index: &mut usize,
    header: &PairHeader,
    event: &mut EventData,
) -> Result<(), DecodeOutcome> {
    use constants::waveform::*;

    let n_words = header.samples_div8 as usize * WORDS_PER_GROUP;
    let have = reader.remaining_words(*word_index);
    if have < n_words {
        return Err(DecodeOutcome::InsufficientData {
            need: n_words,
            have,
        });
    }

    for i in 0..n_words {
        let word = reader.read(*word_index)?;
        *word_index += 1;

        // Two 16-bit samples per word, low half first.
        let samples = [
            word & SAMPLE_MASK,
            (word >> SECOND_SAMPLE_SHIFT) & SAMPLE_MASK,
        ];
        for (half, &sample) in samples.iter().enumerate() {
            let index = i * 2 + half;
            event.analog_probe1[index] = (sample & ANALOG_SAMPLE_MASK) as i32;
            event.digital_probe1[index] = ((sample >> DP1_SHIFT) & 1) as u8;
            event.digital_probe2[index] = ((sample >> DP2_SHIFT) & 1) as u8;
        }
    }

    if header.dual_trace {
        // Even samples carry trace 1, odd samples trace 2; each value is
        // duplicated over its pair so both sequences keep full length.
        for even in (0..n_words * 2).step_by(2) {
            let first = event.analog_probe1[even];
            let second = event.analog_probe1[even + 1];
            event.analog_probe1[even + 1] = first;
            event.analog_probe2[even] = second;
            event.analog_probe2[even + 1] = second;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Word-level helpers
// ---------------------------------------------------------------------------

/// Decode an extras word according to the pair-header format selector
fn decode_extras_word(word: u32, format: u8) -> ExtrasWord {
    use constants::event::*;

    let extended_time = ((word >> EXTENDED_TIME_SHIFT) & EXTENDED_TIME_MASK) as u16;

    match format {
        FORMAT_FLAGS_FINE => ExtrasWord {
            extended_time,
            fine_time: Some((word & FINE_TIME_MASK) as u16),
            flags: map_extras_flags((word >> FLAGS_SHIFT) & FLAGS_MASK),
        },
        FORMAT_EXTENDED_ONLY | FORMAT_EXTENDED_ONLY_ALT => ExtrasWord {
            extended_time,
            fine_time: None,
            flags: 0,
        },
        other => {
            warn!(format = other, "unknown extras format, taking extended time only");
            ExtrasWord {
                extended_time,
                fine_time: None,
                flags: 0,
            }
        }
    }
}

/// Map the 6-bit extras flag field onto the event flag bit-set
fn map_extras_flags(bits: u32) -> u64 {
    let mut flags = 0;
    if bits & 0x20 != 0 {
        flags |= EventData::FLAG_TRIGGER_LOST;
    }
    if bits & 0x10 != 0 {
        flags |= EventData::FLAG_OVER_RANGE;
    }
    if bits & 0x08 != 0 {
        flags |= EventData::FLAG_TRIGGER_1024;
    }
    if bits & 0x04 != 0 {
        flags |= EventData::FLAG_N_LOST_TRIGGER;
    }
    flags
}

/// Decode a PSD charge word: (charge_long, charge_short, pileup)
fn decode_charge_word(word: u32) -> (u16, u16, bool) {
    use constants::event::*;

    let charge_long = ((word >> CHARGE_LONG_SHIFT) & CHARGE_LONG_MASK) as u16;
    let charge_short = (word & CHARGE_SHORT_MASK) as u16;
    let pileup = (word >> PILEUP_FLAG_SHIFT) & 1 != 0;
    (charge_long, charge_short, pileup)
}

/// Decode a PHA energy word: (energy, extra, pileup)
fn decode_energy_word(word: u32) -> (u16, u16, bool) {
    use constants::event::*;

    let energy = (word & PHA_ENERGY_MASK) as u16;
    let extra = ((word >> PHA_EXTRA_SHIFT) & PHA_EXTRA_MASK) as u16;
    let pileup = (word >> PILEUP_FLAG_SHIFT) & 1 != 0;
    (energy, extra, pileup)
}

/// Reconstruct the event time in nanoseconds
///
/// The composite 47-bit coarse time puts the 16-bit extended time above the
/// 31-bit trigger time tag. The fine time refines it by 1/1024 sample
/// periods and is present only for extras format 0b010.
fn compose_timestamp(
    trigger_time_tag: u32,
    extended_time: u16,
    fine_time: Option<u16>,
    time_step_ns: f64,
) -> f64 {
    use constants::event::{EXTENDED_TIME_POSITION, FINE_TIME_SCALE};

    let combined = ((extended_time as u64) << EXTENDED_TIME_POSITION) + trigger_time_tag as u64;
    let coarse_ns = combined as f64 * time_step_ns;
    let fine_ns = match fine_time {
        Some(fine) => (fine as f64 / FINE_TIME_SCALE) * time_step_ns,
        None => 0.0,
    };
    coarse_ns + fine_ns
}

fn dump_raw(raw: &RawBuffer) {
    debug!(size = raw.size, n_events = raw.n_events, "dig1 raw buffer");
    let reader = Reader32::new(&raw.data);
    for i in 0..reader.total_words() {
        if let Some(word) = reader.try_read(i) {
            debug!("word {:4}: {:#010x} {:032b}", i, word, word);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
