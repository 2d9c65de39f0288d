use anyhow::Result;
use hab_telemetry::{SensorSnapshot, TelemetryEncoder};

use crate::MissionConfig;

/// Field widths of a beacon at the extremes the payload can report.
fn worst_case_snapshot() -> SensorSnapshot {
    SensorSnapshot {
        lat: 8959.999,
        lon: 17959.999,
        altitude_m: 39999.9,
        heading_deg: 359.9,
        speed: 999.9,
        sats: 24,
        battery_v: 99.9,
        pressure_mbar: 1099.9,
        temp_internal_c: -99.9,
        temp_external_c: -99.9,
        high_power: true,
        ..Default::default()
    }
}

pub fn check_mission(cfg: &MissionConfig, high_power_dbm: i8, low_power_dbm: i8) -> Result<()> {
    anyhow::ensure!(!cfg.id.is_empty(), "mission.id is empty");
    anyhow::ensure!(!cfg.subid.is_empty(), "mission.subid is empty");
    anyhow::ensure!(!cfg.message.is_empty(), "mission.message is empty");
    anyhow::ensure!(!cfg.separator.is_empty(), "mission.separator is empty");
    anyhow::ensure!(cfg.packet_repeat >= 1, "mission.packet_repeat must be at least 1");
    anyhow::ensure!(cfg.packet_delay_s >= 1, "mission.packet_delay_s must be at least 1");
    anyhow::ensure!(cfg.inter_packet_delay_ms <= 10_000, "mission.inter_packet_delay_ms is over 10 s");

    anyhow::ensure!(
        (5..=23).contains(&low_power_dbm) && (5..=23).contains(&high_power_dbm),
        "radio powers must be 5..23 dBm"
    );
    anyhow::ensure!(high_power_dbm >= low_power_dbm, "radio.high_power_dbm is below radio.low_power_dbm");

    let mut encoder = TelemetryEncoder::new(cfg.id.as_str(), cfg.message.as_str(), cfg.separator.as_str());
    let record = encoder.update(worst_case_snapshot());
    let len = encoder.to_wire_string(&record).len();
    anyhow::ensure!(len <= 255, "beacon would be {} bytes, over one radio packet; shorten mission.message", len);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edited() -> MissionConfig {
        MissionConfig {
            id: "EKI1".into(),
            subid: "/O".into(),
            message: "hab flight test".into(),
            separator: "/".into(),
            ..Default::default()
        }
    }

    #[test]
    fn default_needs_editing() {
        assert!(check_mission(&MissionConfig::default(), 23, 5).is_err());
        check_mission(&edited(), 23, 5).unwrap();
    }

    #[test]
    fn long_message_rejected() {
        let cfg = MissionConfig { message: "x".repeat(200), ..edited() };
        let err = check_mission(&cfg, 23, 5).unwrap_err();
        assert!(err.to_string().contains("shorten"));
    }

    #[test]
    fn inverted_powers_rejected() {
        assert!(check_mission(&edited(), 7, 20).is_err());
        assert!(check_mission(&edited(), 30, 5).is_err());
    }
}
