//! End-to-end tests for the decode pipeline (submit → decode → drain)
//!
//! Buffers are built byte-for-byte as the device delivers them: dig1 words
//! Little-Endian, dig2 words Big-Endian (the pipeline reverses them on
//! submit).

use pulsedaq::{DecodePipeline, EventData, FirmwareKind, RawBuffer, SignalKind};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Buffer builders
// ---------------------------------------------------------------------------

fn push_le(buf: &mut Vec<u8>, word: u32) {
    buf.extend_from_slice(&word.to_le_bytes());
}

fn push_be(buf: &mut Vec<u8>, word: u64) {
    buf.extend_from_slice(&word.to_be_bytes());
}

/// dig1 board header: magic 0xA, total size, pair mask, board id
fn dig1_board_header(data: &mut Vec<u8>, size_words: u32, mask: u8, board_id: u8) {
    push_le(data, (0xA << 28) | (size_words & 0x0FFF_FFFF));
    push_le(data, ((board_id as u32) << 27) | (mask as u32));
    push_le(data, 0);
    push_le(data, 0);
}

/// dig1 pair header: marker bit, size, extras format 0b010, EE+ET enabled
fn dig1_pair_header(data: &mut Vec<u8>, size_words: u32, charge_enabled: bool) {
    push_le(data, (1 << 31) | (size_words & 0x3F_FFFF));
    let mut w1 = (0b010 << 24) | (1 << 28) | (1 << 29);
    if charge_enabled {
        w1 |= 1 << 30;
    }
    push_le(data, w1);
}

fn dig2_start_buffer() -> RawBuffer {
    let mut data = Vec::new();
    push_be(&mut data, 0x3 << 60);
    push_be(&mut data, 0x2 << 56);
    push_be(&mut data, 0x1 << 56);
    push_be(&mut data, 0x1 << 56);
    RawBuffer::new(data)
}

fn dig2_stop_buffer(dead_time: u64) -> RawBuffer {
    let mut data = Vec::new();
    push_be(&mut data, (0x3 << 60) | (0x2 << 56));
    push_be(&mut data, 0);
    push_be(&mut data, (0x1 << 56) | (dead_time & 0xFFFF_FFFF));
    RawBuffer::new(data)
}

/// dig2 data buffer: (channel, raw timestamp, fine time, energy) per event
fn dig2_event_buffer(events: &[(u64, u64, u64, u64)]) -> RawBuffer {
    let total = 1 + 2 * events.len() as u64;
    let mut data = Vec::new();
    push_be(&mut data, (0x2 << 60) | total);
    for &(channel, timestamp, fine_time, energy) in events {
        push_be(&mut data, (channel << 56) | (timestamp & 0xFFFF_FFFF_FFFF));
        push_be(
            &mut data,
            ((fine_time & 0x3FF) << 16) | (energy & 0xFFFF),
        );
    }
    RawBuffer::new(data)
}

fn drain_events(pipeline: &DecodePipeline, expected: usize) -> Vec<EventData> {
    let mut events = Vec::new();
    for _ in 0..2000 {
        events.extend(pipeline.drain());
        if events.len() >= expected {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    events
}

// ---------------------------------------------------------------------------
// dig1 scenarios
// ---------------------------------------------------------------------------

#[test]
fn psd_event_with_extended_time() {
    init_tracing();
    let pipeline = DecodePipeline::new(1, FirmwareKind::Dig1Psd).unwrap();
    pipeline.set_time_step(2);

    // One pair, one event: trigger time tag 100, extended time 2, no fine
    // time, charge disabled.
    let mut data = Vec::new();
    dig1_board_header(&mut data, 10, 0x01, 1);
    dig1_pair_header(&mut data, 6, false);
    push_le(&mut data, 100); // trigger time tag, even channel
    push_le(&mut data, 0x0002_0000); // extras: extended time 2

    assert_eq!(pipeline.submit(RawBuffer::new(data)), SignalKind::Event);
    let events = drain_events(&pipeline, 1);
    assert_eq!(events.len(), 1);

    let e = &events[0];
    assert_eq!(e.channel, 0);
    assert_eq!(e.energy, 0);
    assert_eq!(e.waveform_size, 0);
    assert_eq!(e.flags, 0);
    // (2 * 2^31 + 100) * 2 ns
    assert_eq!(e.timestamp_ns, 8_589_934_792.0);
}

#[test]
fn psd_event_with_fine_time() {
    init_tracing();
    let pipeline = DecodePipeline::new(1, FirmwareKind::Dig1Psd).unwrap();
    pipeline.set_time_step(2);

    let mut data = Vec::new();
    dig1_board_header(&mut data, 10, 0x01, 1);
    dig1_pair_header(&mut data, 6, false);
    push_le(&mut data, 100);
    push_le(&mut data, 0x0002_0200); // extended time 2, fine time 512

    pipeline.submit(RawBuffer::new(data));
    let events = drain_events(&pipeline, 1);
    // Coarse part plus (512/1024) * 2 ns
    assert_eq!(events[0].timestamp_ns, 8_589_934_793.0);
}

#[test]
fn psd_mask_fan_out_to_odd_channels() {
    init_tracing();
    let pipeline = DecodePipeline::new(1, FirmwareKind::Dig1Psd).unwrap();
    pipeline.set_time_step(2);

    // Pairs 1 and 2, one odd-flagged event each (charge enabled, 3 words).
    let mut data = Vec::new();
    dig1_board_header(&mut data, 4 + 2 * 5, 0b0000_0110, 0);
    for _ in 0..2 {
        dig1_pair_header(&mut data, 5, true);
        push_le(&mut data, 1 << 31); // trigger time 0, odd channel
        push_le(&mut data, 0);
        push_le(&mut data, 0); // charge word
    }

    pipeline.submit(RawBuffer::new(data));
    let events = drain_events(&pipeline, 2);
    let mut channels: Vec<u8> = events.iter().map(|e| e.channel).collect();
    channels.sort_unstable();
    assert_eq!(channels, vec![3, 5]);
}

#[test]
fn pha_event_energy_and_extra() {
    init_tracing();
    let pipeline = DecodePipeline::new(1, FirmwareKind::Dig1Pha).unwrap();
    pipeline.set_time_step(4);
    pipeline.set_module_number(2);

    let mut data = Vec::new();
    dig1_board_header(&mut data, 4 + 2 + 3, 0x01, 0);
    dig1_pair_header(&mut data, 5, true);
    push_le(&mut data, 250);
    push_le(&mut data, 0);
    push_le(&mut data, (0x123 << 16) | (1 << 15) | 3000); // energy word with pileup

    pipeline.submit(RawBuffer::new(data));
    let events = drain_events(&pipeline, 1);
    let e = &events[0];
    assert_eq!(e.energy, 3000);
    assert_eq!(e.energy_short, 0x123);
    assert!(e.has_pileup());
    assert_eq!(e.module, 2);
    assert_eq!(e.timestamp_ns, 1000.0);
}

// ---------------------------------------------------------------------------
// dig2 scenarios
// ---------------------------------------------------------------------------

#[test]
fn start_signal_enables_decoding() {
    init_tracing();
    let pipeline = DecodePipeline::new(1, FirmwareKind::Dig2).unwrap();
    assert!(!pipeline.is_running());

    assert_eq!(pipeline.submit(dig2_start_buffer()), SignalKind::Start);
    assert!(pipeline.is_running());
    assert!(pipeline.drain().is_empty());
}

#[test]
fn stop_signal_disables_decoding() {
    init_tracing();
    let pipeline = DecodePipeline::new(1, FirmwareKind::Dig2).unwrap();
    pipeline.submit(dig2_start_buffer());

    // Dead time 125 * 8 ns = 1000 ns, reported in the log.
    assert_eq!(pipeline.submit(dig2_stop_buffer(125)), SignalKind::Stop);
    assert!(!pipeline.is_running());
    assert!(pipeline.drain().is_empty());
}

#[test]
fn idle_events_never_reach_output() {
    init_tracing();
    let pipeline = DecodePipeline::new(1, FirmwareKind::Dig2).unwrap();
    pipeline.set_time_step(2);

    pipeline.submit(dig2_event_buffer(&[(1, 100, 0, 7)]));
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert!(pipeline.drain().is_empty());

    // The same buffer is decoded once running.
    pipeline.submit(dig2_start_buffer());
    pipeline.submit(dig2_event_buffer(&[(1, 100, 0, 7)]));
    let events = drain_events(&pipeline, 1);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].energy, 7);
}

#[test]
fn batch_sorted_by_timestamp() {
    init_tracing();
    let pipeline = DecodePipeline::new(1, FirmwareKind::Dig2).unwrap();
    pipeline.set_time_step(2);
    pipeline.submit(dig2_start_buffer());

    pipeline.submit(dig2_event_buffer(&[
        (0, 300, 0, 1),
        (1, 100, 0, 2),
        (2, 200, 0, 3),
    ]));
    let events = drain_events(&pipeline, 3);
    let timestamps: Vec<f64> = events.iter().map(|e| e.timestamp_ns).collect();
    assert_eq!(timestamps, vec![200.0, 400.0, 600.0]);
}

#[test]
fn fine_time_refines_timestamp() {
    init_tracing();
    let pipeline = DecodePipeline::new(1, FirmwareKind::Dig2).unwrap();
    pipeline.set_time_step(2);
    pipeline.submit(dig2_start_buffer());

    pipeline.submit(dig2_event_buffer(&[(0, 1000, 512, 0)]));
    let events = drain_events(&pipeline, 1);
    assert_eq!(events[0].timestamp_ns, 2001.0);
}

#[test]
fn probe_sequences_always_equal_length() {
    init_tracing();
    let pipeline = DecodePipeline::new(1, FirmwareKind::Dig2).unwrap();
    pipeline.set_time_step(2);
    pipeline.submit(dig2_start_buffer());

    // Event with a 2-word waveform (4 samples).
    let mut data = Vec::new();
    push_be(&mut data, (0x2 << 60) | 7);
    push_be(&mut data, 1 << 56);
    push_be(&mut data, 1 << 62); // waveform present
    push_be(&mut data, 1 << 63); // waveform header, check bits valid
    push_be(&mut data, 2); // two sample words
    push_be(&mut data, 10 | (20 << 32));
    push_be(&mut data, 30 | (40 << 32));
    pipeline.submit(RawBuffer::new(data));

    let events = drain_events(&pipeline, 1);
    let e = &events[0];
    assert_eq!(e.waveform_size, 4);
    for len in [
        e.analog_probe1.len(),
        e.analog_probe2.len(),
        e.digital_probe1.len(),
        e.digital_probe2.len(),
        e.digital_probe3.len(),
        e.digital_probe4.len(),
    ] {
        assert_eq!(len, 4);
    }
    assert_eq!(e.analog_probe1, vec![10, 20, 30, 40]);
    assert!(e.timestamp_ns >= 0.0 && e.timestamp_ns.is_finite());
}

// ---------------------------------------------------------------------------
// Conservation and ordering across many buffers
// ---------------------------------------------------------------------------

#[test]
fn single_worker_thousand_buffers_conserve_order() {
    init_tracing();
    let pipeline = DecodePipeline::new(1, FirmwareKind::Dig2).unwrap();
    pipeline.set_time_step(1);
    pipeline.submit(dig2_start_buffer());

    // Each buffer holds two events with descending raw timestamps; the
    // energy field encodes the buffer index.
    const BUFFERS: usize = 1000;
    for i in 0..BUFFERS as u64 {
        pipeline.submit(dig2_event_buffer(&[
            (0, 2 * i + 1, 0, i),
            (1, 2 * i, 0, i),
        ]));
    }

    let events = drain_events(&pipeline, 2 * BUFFERS);
    assert_eq!(events.len(), 2 * BUFFERS);

    for (i, chunk) in events.chunks(2).enumerate() {
        // Per-buffer runs appear in submission order...
        assert_eq!(chunk[0].energy as usize, i);
        assert_eq!(chunk[1].energy as usize, i);
        // ...and each run is sorted by timestamp.
        assert!(chunk[0].timestamp_ns <= chunk[1].timestamp_ns);
        assert_eq!(chunk[0].channel, 1);
        assert_eq!(chunk[1].channel, 0);
    }
}

#[test]
fn multi_worker_conserves_all_events() {
    init_tracing();
    let pipeline = DecodePipeline::new(4, FirmwareKind::Dig2).unwrap();
    pipeline.set_time_step(1);
    pipeline.submit(dig2_start_buffer());

    // No cross-buffer ordering with several workers, but nothing may be
    // lost or duplicated.
    const BUFFERS: u64 = 200;
    for i in 0..BUFFERS {
        pipeline.submit(dig2_event_buffer(&[(2, 10 + i, 0, i)]));
    }

    let events = drain_events(&pipeline, BUFFERS as usize);
    assert_eq!(events.len(), BUFFERS as usize);
    let mut energies: Vec<u16> = events.iter().map(|e| e.energy).collect();
    energies.sort_unstable();
    let expected: Vec<u16> = (0..BUFFERS as u16).collect();
    assert_eq!(energies, expected);
}

#[test]
fn drain_returns_each_event_exactly_once() {
    init_tracing();
    let pipeline = DecodePipeline::new(1, FirmwareKind::Dig2).unwrap();
    pipeline.set_time_step(1);
    pipeline.submit(dig2_start_buffer());

    for i in 0..20u64 {
        pipeline.submit(dig2_event_buffer(&[(3, 100 + i, 0, i)]));
    }

    let events = drain_events(&pipeline, 20);
    assert_eq!(events.len(), 20);
    let mut energies: Vec<u16> = events.iter().map(|e| e.energy).collect();
    energies.sort_unstable();
    let expected: Vec<u16> = (0..20).collect();
    assert_eq!(energies, expected);

    // Nothing left after the swap.
    std::thread::sleep(std::time::Duration::from_millis(10));
    assert!(pipeline.drain().is_empty());
}
