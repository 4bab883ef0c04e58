//! Engine configuration (§6 "Configuration"): the recognized keys and their
//! defaults, collected into one record so both dialect drivers build their
//! flow-control state from the same source.
//!
//! Reuses `ConnectionParams` (`crate::communication`) for the serial-framing
//! half; the flow-control and operation defaults are new.

use crate::communication::ConnectionParams;
use cncctl_core::state::AxisMaxFeeds;
use std::collections::HashMap;

/// Tri-state override for TinyG probe coordinate-frame handling (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeCoordFrame {
    #[default]
    AutoDetect,
    Machine,
    Work,
}

/// All configuration recognized by the engine (§6).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Serial framing; `port` is required.
    pub connection: ConnectionParams,

    /// Ordered axis letters this controller is configured with (default
    /// `['X', 'Y', 'Z']`).
    pub axis_labels: Vec<char>,
    pub used_axes: Vec<bool>,
    pub homable_axes: Vec<bool>,
    pub axis_max_feeds: AxisMaxFeeds,

    /// TinyG: cap on unacked requests before admission refuses further
    /// writes (default 32).
    pub max_unacked_requests: usize,
    /// GRBL: firmware receive buffer size (default 128).
    pub rx_buffer_size: usize,
    /// GRBL: planner/block buffer depth, autodetected from `OPT` when
    /// available (default 16, matching stock GRBL 1.1 firmware).
    pub block_buffer_size: u32,

    /// Status-report polling tick (default 250 ms).
    pub status_update_interval_ms: u64,

    pub stream_send_queue_high_water_mark: usize,
    pub stream_send_queue_low_water_mark: usize,

    pub real_time_moves_max_queued: usize,
    pub real_time_moves_max_overshoot_factor: f64,

    pub probe_uses_machine_coords: ProbeCoordFrame,

    /// Extra per-key overrides not otherwise modeled, preserved for
    /// forward compatibility with device-specific tuning.
    pub extra: HashMap<String, String>,
}

impl EngineConfig {
    /// Build a configuration for the given port with every other key at
    /// its documented default (§6).
    pub fn new(port: impl Into<String>) -> Self {
        let mut connection = ConnectionParams::default();
        connection.port = port.into();

        let high_water = 20;
        Self {
            connection,
            axis_labels: vec!['X', 'Y', 'Z'],
            used_axes: vec![true; 3],
            homable_axes: vec![true; 3],
            axis_max_feeds: AxisMaxFeeds::new(),
            max_unacked_requests: crate::firmware::tinyg::DEFAULT_MAX_UNACKED_REQUESTS,
            rx_buffer_size: crate::firmware::grbl::GRBL_DEFAULT_BUFFER_SIZE,
            block_buffer_size: 16,
            status_update_interval_ms: 250,
            stream_send_queue_high_water_mark: high_water,
            stream_send_queue_low_water_mark: (high_water / 5).min(10).max(1),
            real_time_moves_max_queued: 8,
            real_time_moves_max_overshoot_factor: 2.0,
            probe_uses_machine_coords: ProbeCoordFrame::AutoDetect,
            extra: HashMap::new(),
        }
    }

    pub fn with_axis_labels(mut self, labels: &[char]) -> Self {
        self.axis_labels = labels.to_vec();
        self.used_axes = vec![true; labels.len()];
        self.homable_axes = vec![true; labels.len()];
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_water_mark_defaults_to_one_fifth_of_high_water() {
        let cfg = EngineConfig::new("/dev/ttyUSB0");
        assert_eq!(cfg.stream_send_queue_high_water_mark, 20);
        assert_eq!(cfg.stream_send_queue_low_water_mark, 4);
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::new("/dev/ttyUSB0");
        assert_eq!(cfg.rx_buffer_size, 128);
        assert_eq!(cfg.max_unacked_requests, 32);
        assert_eq!(cfg.status_update_interval_ms, 250);
        assert_eq!(cfg.real_time_moves_max_queued, 8);
    }
}
