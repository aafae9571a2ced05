//! Decoded event records
//!
//! [`EventData`] is the uniform output of every decoder: timing, energies,
//! status flags, and the six waveform probe sequences. All six sequences
//! always have the same length (`waveform_size`); an event without a
//! waveform carries six empty sequences.

use serde::{Deserialize, Serialize};

/// A single decoded digitizer event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Reconstructed event time in nanoseconds from acquisition start
    pub timestamp_ns: f64,
    /// Authoritative waveform length; all six probe sequences match it
    pub waveform_size: usize,
    /// Analog probe 1 samples
    pub analog_probe1: Vec<i32>,
    /// Analog probe 2 samples (dual-trace or second probe stream)
    pub analog_probe2: Vec<i32>,
    /// Digital probe samples, one bit per sample stored as 0/1
    pub digital_probe1: Vec<u8>,
    pub digital_probe2: Vec<u8>,
    pub digital_probe3: Vec<u8>,
    pub digital_probe4: Vec<u8>,
    /// Long-gate charge integral (or PHA energy)
    pub energy: u16,
    /// Short-gate charge integral (or the PHA auxiliary extra field)
    pub energy_short: u16,
    /// Module identifier assigned by configuration
    pub module: u8,
    /// Channel number (0..127)
    pub channel: u8,
    /// Sampling period in nanoseconds, cached from configuration
    pub time_resolution_ns: u8,
    /// Which physical signal each probe stream carries (raw wire tags)
    pub analog_probe1_type: u8,
    pub analog_probe2_type: u8,
    pub digital_probe1_type: u8,
    pub digital_probe2_type: u8,
    pub digital_probe3_type: u8,
    pub digital_probe4_type: u8,
    /// Waveform down-sampling factor: 1, 2, 4, or 8
    pub down_sample_factor: u8,
    /// Status flag bit-set, see the `FLAG_*` constants
    pub flags: u64,
}

impl EventData {
    /// Pile-up detected
    pub const FLAG_PILEUP: u64 = 0x01;
    /// One or more triggers lost
    pub const FLAG_TRIGGER_LOST: u64 = 0x02;
    /// Signal saturated
    pub const FLAG_OVER_RANGE: u64 = 0x04;
    /// 1024-trigger counter rollover marker
    pub const FLAG_TRIGGER_1024: u64 = 0x08;
    /// N-trigger-lost marker
    pub const FLAG_N_LOST_TRIGGER: u64 = 0x10;

    /// Create an event with all six probe sequences sized to `waveform_size`
    pub fn new(waveform_size: usize) -> Self {
        Self {
            timestamp_ns: 0.0,
            waveform_size,
            analog_probe1: vec![0; waveform_size],
            analog_probe2: vec![0; waveform_size],
            digital_probe1: vec![0; waveform_size],
            digital_probe2: vec![0; waveform_size],
            digital_probe3: vec![0; waveform_size],
            digital_probe4: vec![0; waveform_size],
            energy: 0,
            energy_short: 0,
            module: 0,
            channel: 0,
            time_resolution_ns: 0,
            analog_probe1_type: 0,
            analog_probe2_type: 0,
            digital_probe1_type: 0,
            digital_probe2_type: 0,
            digital_probe3_type: 0,
            digital_probe4_type: 0,
            down_sample_factor: 1,
            flags: 0,
        }
    }

    /// Resize all six probe sequences in place, zero-filling new samples
    pub fn resize_waveform(&mut self, size: usize) {
        self.waveform_size = size;
        self.analog_probe1.resize(size, 0);
        self.analog_probe2.resize(size, 0);
        self.digital_probe1.resize(size, 0);
        self.digital_probe2.resize(size, 0);
        self.digital_probe3.resize(size, 0);
        self.digital_probe4.resize(size, 0);
    }

    /// Drop the waveform, leaving all six sequences empty
    pub fn clear_waveform(&mut self) {
        self.resize_waveform(0);
    }

    pub fn has_pileup(&self) -> bool {
        (self.flags & Self::FLAG_PILEUP) != 0
    }

    pub fn has_trigger_lost(&self) -> bool {
        (self.flags & Self::FLAG_TRIGGER_LOST) != 0
    }

    pub fn has_over_range(&self) -> bool {
        (self.flags & Self::FLAG_OVER_RANGE) != 0
    }

    /// Interpretation of the digital-probe-1 wire tag
    pub fn digital_probe1_kind(&self) -> DigitalProbeKind {
        DigitalProbeKind::from_raw(self.digital_probe1_type)
    }

    /// Format the leading waveform samples, at most `max_samples` per probe
    pub fn waveform_preview(&self, max_samples: usize) -> String {
        let shown = self.waveform_size.min(max_samples);
        let mut out = format!("waveform ({} samples)", self.waveform_size);
        if shown == 0 {
            return out;
        }
        out.push_str(&format!("\n  AP1: {:?}", &self.analog_probe1[..shown]));
        out.push_str(&format!("\n  AP2: {:?}", &self.analog_probe2[..shown]));
        out.push_str(&format!("\n  DP1: {:?}", &self.digital_probe1[..shown]));
        out.push_str(&format!("\n  DP2: {:?}", &self.digital_probe2[..shown]));
        out.push_str(&format!("\n  DP3: {:?}", &self.digital_probe3[..shown]));
        out.push_str(&format!("\n  DP4: {:?}", &self.digital_probe4[..shown]));
        if shown < self.waveform_size {
            out.push_str(&format!("\n  ... {} more", self.waveform_size - shown));
        }
        out
    }

    /// Format a one-line summary for display
    pub fn summary(&self) -> String {
        format!(
            "Mod:{:2} Ch:{:3} T:{:15.3}ns E:{:5} Es:{:5} F:0x{:05x}{}",
            self.module,
            self.channel,
            self.timestamp_ns,
            self.energy,
            self.energy_short,
            self.flags,
            if self.waveform_size > 0 {
                format!(" [WF {}]", self.waveform_size)
            } else {
                String::new()
            }
        )
    }
}

impl Default for EventData {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Display for EventData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Digital-probe signal selection as encoded in the dig1 pair header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitalProbeKind {
    Trigger,
    Trapezoid,
    Energy,
    Timestamp,
    Reserved(u8),
}

impl DigitalProbeKind {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Trigger,
            1 => Self::Trapezoid,
            2 => Self::Energy,
            3 => Self::Timestamp,
            n => Self::Reserved(n),
        }
    }
}
