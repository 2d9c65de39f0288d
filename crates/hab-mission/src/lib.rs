pub mod capabilities;
pub mod datalog;
pub mod doctor;
pub mod scheduler;

use std::time::Duration;

pub use capabilities::{Downlink, ImageSource, LogSink, SensorSource, StatusIndicator};
pub use datalog::DataLog;
pub use scheduler::{CycleStats, DownlinkCycleState, DownlinkScheduler, SchedulerConfig};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MissionConfig {
    /// Payload callsign, first field of every beacon.
    pub id: String,
    pub subid: String,
    /// Free text appended to beacons; newlines become " - ".
    pub message: String,
    pub separator: String,
    pub packet_repeat: u32,
    pub packet_delay_s: u64,
    pub inter_packet_delay_ms: u64,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            subid: String::new(),
            message: String::new(),
            separator: String::new(),
            packet_repeat: 3,
            packet_delay_s: 3,
            inter_packet_delay_ms: 100,
        }
    }
}

impl MissionConfig {
    pub fn scheduler(&self, high_power_dbm: i8, low_power_dbm: i8) -> SchedulerConfig {
        SchedulerConfig {
            packet_repeat: self.packet_repeat,
            packet_delay: Duration::from_secs(self.packet_delay_s),
            inter_packet_delay: Duration::from_millis(self.inter_packet_delay_ms),
            high_power_dbm,
            low_power_dbm,
        }
    }
}
