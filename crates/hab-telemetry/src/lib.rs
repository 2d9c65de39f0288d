//! Telemetry records and their two renderings: the APRS-style beacon that
//! goes over the air and the CSV line that goes into the data log.
//!
//! Coordinates are kept in NMEA degrees-and-minutes (`ddmm.mmmm`) with a
//! separate hemisphere letter, exactly as the GPS reports them.

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::debug;

/// One reading of every onboard sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub lat: f64,
    pub ns: char,
    pub lon: f64,
    pub ew: char,
    pub altitude_m: f64,
    pub heading_deg: f64,
    pub speed: f64,
    pub sats: u32,
    pub battery_v: f64,
    pub pressure_mbar: f64,
    pub temp_internal_c: f64,
    pub temp_external_c: f64,
    pub high_power: bool,
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            lat: 0.0,
            ns: 'N',
            lon: 0.0,
            ew: 'W',
            altitude_m: 0.0,
            heading_deg: 0.0,
            speed: 0.0,
            sats: 0,
            battery_v: 0.0,
            pressure_mbar: 0.0,
            temp_internal_c: 0.0,
            temp_external_c: 0.0,
            high_power: false,
        }
    }
}

/// A snapshot stamped with its UTC time and the climb rate since the
/// previous record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub sensors: SensorSnapshot,
    pub timestamp: OffsetDateTime,
    /// m/s, positive when climbing.
    pub ascension_rate: f64,
}

impl TelemetryRecord {
    pub fn date(&self) -> String {
        self.timestamp.format(format_description!("[day]-[month]-[year]")).unwrap_or_default()
    }

    pub fn time(&self) -> String {
        self.timestamp.format(format_description!("[hour]:[minute]:[second]")).unwrap_or_default()
    }
}

/// NMEA `ddmm.mmmm` / `dddmm.mmmm` to decimal degrees.
pub fn to_decimal_degrees(v: f64) -> f64 {
    let degrees = (v / 100.0).trunc();
    degrees + (v - degrees * 100.0) / 60.0
}

#[derive(Debug, Clone)]
pub struct TelemetryEncoder {
    id: String,
    message: String,
    separator: String,
    last: Option<(f64, OffsetDateTime)>,
}

impl TelemetryEncoder {
    pub fn new(id: impl Into<String>, message: impl Into<String>, separator: impl Into<String>) -> Self {
        Self { id: id.into(), message: message.into(), separator: separator.into(), last: None }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stamp a snapshot with the current UTC time.
    pub fn update(&mut self, snapshot: SensorSnapshot) -> TelemetryRecord {
        self.update_at(snapshot, OffsetDateTime::now_utc())
    }

    pub fn update_at(&mut self, snapshot: SensorSnapshot, now: OffsetDateTime) -> TelemetryRecord {
        let ascension_rate = match self.last {
            Some((prev_alt, prev_ts)) => {
                let elapsed = (now - prev_ts).as_seconds_f64();
                if elapsed == 0.0 {
                    0.0
                } else {
                    (snapshot.altitude_m - prev_alt) / elapsed
                }
            }
            None => 0.0,
        };
        self.last = Some((snapshot.altitude_m, now));
        debug!("telemetry: alt {:.1} m, ascension {:.2} m/s", snapshot.altitude_m, ascension_rate);

        TelemetryRecord { sensors: snapshot, timestamp: now, ascension_rate }
    }

    /// The beacon sentence, newline-terminated.
    pub fn to_wire_string(&self, r: &TelemetryRecord) -> String {
        let s = &r.sensors;
        let sep = &self.separator;
        let power = if s.high_power { " - H" } else { " - L" };

        let mut out = format!("$${}!", self.id);
        out += &format!("{:07.2}{}{}{:08.2}{}", s.lat, s.ns, sep, s.lon, s.ew);
        out += &format!("O{:.1}{sep}{:.1}{sep}", s.heading_deg, s.speed);
        out += &format!("A={:.1}{sep}V={:.1}{sep}", s.altitude_m, s.battery_v);
        out += &format!("P={:.1}{sep}", s.pressure_mbar);
        out += &format!("TI={:.1}{sep}TO={:.1}{sep}", s.temp_internal_c, s.temp_external_c);
        out += &format!("{}{sep}{}{sep}", r.date(), r.time());
        out += &format!(
            "GPS={:09.6}{},{:010.6}{}{sep}",
            to_decimal_degrees(s.lat),
            s.ns,
            to_decimal_degrees(s.lon),
            s.ew
        );
        out += &format!("SATS={}{sep}AR={:.1}{sep}", s.sats, r.ascension_rate);
        out += &self.message.replace('\n', " - ");
        out += power;
        out.push('\n');
        out
    }

    /// Data-log line; every field is followed by a comma.
    pub fn to_archive_string(&self, r: &TelemetryRecord) -> String {
        let s = &r.sensors;
        format!(
            "{},{},{:.6},{},{:.6},{},{:.1},{:.2},{:.1},{:.1},{:.1},{:.1},{:.1},{},{:.1},",
            r.date(),
            r.time(),
            to_decimal_degrees(s.lat),
            s.ns,
            to_decimal_degrees(s.lon),
            s.ew,
            s.altitude_m,
            s.battery_v,
            s.temp_internal_c,
            s.temp_external_c,
            s.pressure_mbar,
            s.heading_deg,
            s.speed,
            s.sats,
            r.ascension_rate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    fn sample() -> SensorSnapshot {
        SensorSnapshot {
            lat: 4332.944,
            ns: 'N',
            lon: 539.783,
            ew: 'W',
            pressure_mbar: 1019.5,
            temp_internal_c: 15.5,
            temp_external_c: 5.4,
            ..Default::default()
        }
    }

    #[test]
    fn decimal_degrees() {
        assert!((to_decimal_degrees(4332.944) - 43.549_066_67).abs() < 1e-6);
        assert!((to_decimal_degrees(539.783) - 5.663_05).abs() < 1e-6);
        assert_eq!(to_decimal_degrees(0.0), 0.0);
    }

    #[test]
    fn wire_string_layout() {
        let mut enc = TelemetryEncoder::new("TEST", "Test telemetry message", "/");
        let rec = enc.update_at(sample(), datetime!(2024-07-14 09:05:03 UTC));
        let wire = enc.to_wire_string(&rec);
        assert!(wire.contains("P=1019.5"));
        assert_eq!(
            wire,
            "$$TEST!4332.94N/00539.78WO0.0/0.0/A=0.0/V=0.0/P=1019.5/TI=15.5/TO=5.4/\
             14-07-2024/09:05:03/GPS=43.549067N,005.663050W/SATS=0/AR=0.0/\
             Test telemetry message - L\n"
        );
    }

    #[test]
    fn wire_string_folds_newlines_and_flags_high_power() {
        let mut enc = TelemetryEncoder::new("HAB1", "line one\nline two", "|");
        let snap = SensorSnapshot { high_power: true, sats: 9, ..sample() };
        let rec = enc.update_at(snap, datetime!(2024-01-02 03:04:05 UTC));
        let wire = enc.to_wire_string(&rec);
        assert!(wire.starts_with("$$HAB1!4332.94N|00539.78W"));
        assert!(wire.contains("|SATS=9|"));
        assert!(wire.ends_with("|line one - line two - H\n"));
        assert!(wire.contains("|02-01-2024|03:04:05|"));
    }

    #[test]
    fn archive_line() {
        let mut enc = TelemetryEncoder::new("TEST", "msg", "/");
        let snap = SensorSnapshot { altitude_m: 1234.56, battery_v: 3.987, sats: 7, ..sample() };
        let rec = enc.update_at(snap, datetime!(2024-07-14 09:05:03 UTC));
        assert_eq!(
            enc.to_archive_string(&rec),
            "14-07-2024,09:05:03,43.549067,N,5.663050,W,1234.6,3.99,15.5,5.4,1019.5,0.0,0.0,7,0.0,"
        );
    }

    #[test]
    fn ascension_rate_from_altitude_delta() {
        let t0 = datetime!(2024-07-14 09:00:00 UTC);
        let mut enc = TelemetryEncoder::new("TEST", "", "/");

        let first = enc.update_at(SensorSnapshot { altitude_m: 100.0, ..sample() }, t0);
        assert_eq!(first.ascension_rate, 0.0);

        let r = enc.update_at(SensorSnapshot { altitude_m: 150.0, ..sample() }, t0 + Duration::seconds(5));
        assert!((r.ascension_rate - 10.0).abs() < 1e-9);

        let r = enc.update_at(SensorSnapshot { altitude_m: 140.0, ..sample() }, t0 + Duration::milliseconds(7500));
        assert!((r.ascension_rate + 4.0).abs() < 1e-9);
    }

    #[test]
    fn ascension_rate_zero_when_no_time_elapsed() {
        let t0 = datetime!(2024-07-14 09:00:00 UTC);
        let mut enc = TelemetryEncoder::new("TEST", "", "/");
        enc.update_at(SensorSnapshot { altitude_m: 100.0, ..sample() }, t0);
        let r = enc.update_at(SensorSnapshot { altitude_m: 150.0, ..sample() }, t0);
        assert_eq!(r.ascension_rate, 0.0);
    }
}
