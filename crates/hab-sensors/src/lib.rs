pub mod battery;
pub mod doctor;
pub mod ds18b20;
pub mod gps;
pub mod led;
pub mod mcp3002;
pub mod ms5607;
pub mod pwrsel;

use anyhow::{Context, Result};
use rppal::gpio::Gpio;
use tracing::{debug, warn};

use hab_telemetry::SensorSnapshot;

use battery::{AdcConfig, Battery};
use ds18b20::Ds18b20;
use gps::{GpsConfig, GpsFix, GpsReceiver};
use ms5607::{BaroConfig, Ms5607};
use pwrsel::PowerSelect;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TempConfig {
    /// 1-Wire ids of the two DS18B20 probes.
    pub internal_addr: String,
    pub external_addr: String,
}

/// BCM GPIO numbers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PinsConfig {
    pub led: u8,
    pub batt_enable: u8,
    pub power_select: u8,
}

impl Default for PinsConfig {
    fn default() -> Self {
        Self { led: 17, batt_enable: 24, power_select: 26 }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SensorsConfig {
    pub gps: GpsConfig,
    pub baro: BaroConfig,
    pub temp: TempConfig,
    pub adc: AdcConfig,
    pub pins: PinsConfig,
}

/// Every sensor on the board. A GPS failure fails the whole read, so no
/// beacon goes out with a position that was not confirmed. The barometer,
/// temperature probes and battery keep their last value when they fail;
/// the failure is logged.
pub struct BoardSensors {
    gps: GpsReceiver,
    baro: Ms5607,
    temp_internal: Ds18b20,
    temp_external: Ds18b20,
    battery: Battery,
    power_select: PowerSelect,
    last: SensorSnapshot,
}

impl BoardSensors {
    pub async fn open(cfg: &SensorsConfig, gpio: &Gpio) -> Result<Self> {
        Ok(Self {
            gps: GpsReceiver::open(&cfg.gps)?,
            baro: Ms5607::open(&cfg.baro).await?,
            temp_internal: Ds18b20::new(&cfg.temp.internal_addr),
            temp_external: Ds18b20::new(&cfg.temp.external_addr),
            battery: Battery::open(gpio, cfg.pins.batt_enable, &cfg.adc)?,
            power_select: PowerSelect::open(gpio, cfg.pins.power_select)?,
            last: SensorSnapshot::default(),
        })
    }

    pub fn gps_fix(&self) -> &GpsFix {
        self.gps.fix()
    }

    pub async fn update_gps(&mut self) -> Result<&GpsFix> {
        self.gps.update().await
    }

    pub async fn read_all(&mut self) -> Result<SensorSnapshot> {
        refresh_position(&mut self.gps, &mut self.last).await?;

        match self.baro.read().await {
            Ok(r) => self.last.pressure_mbar = r.pressure_mbar,
            Err(e) => warn!("barometer: {:#}", e),
        }
        match self.temp_internal.read() {
            Ok(t) => self.last.temp_internal_c = t,
            Err(e) => warn!("internal temperature: {:#}", e),
        }
        match self.temp_external.read() {
            Ok(t) => self.last.temp_external_c = t,
            Err(e) => warn!("external temperature: {:#}", e),
        }
        match self.battery.read_volts().await {
            Ok(v) => self.last.battery_v = v,
            Err(e) => warn!("battery: {:#}", e),
        }
        self.last.high_power = self.power_select.is_high_power();

        debug!(
            "sensors: baro {:.1} mbar, tin {:.2} C, tout {:.2} C, vbatt {:.2} V, high power {}",
            self.last.pressure_mbar,
            self.last.temp_internal_c,
            self.last.temp_external_c,
            self.last.battery_v,
            self.last.high_power
        );
        Ok(self.last.clone())
    }
}

/// Take a new fix into `snap`; on failure `snap` is left untouched.
async fn refresh_position(gps: &mut GpsReceiver, snap: &mut SensorSnapshot) -> Result<()> {
    let fix = gps.update().await.context("gps")?;
    apply_fix(snap, fix);
    Ok(())
}

fn apply_fix(snap: &mut SensorSnapshot, fix: &GpsFix) {
    snap.lat = fix.lat;
    snap.ns = fix.ns;
    snap.lon = fix.lon;
    snap.ew = fix.ew;
    snap.altitude_m = fix.altitude_m;
    snap.heading_deg = fix.heading_deg;
    snap.speed = fix.speed;
    snap.sats = fix.sats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_fields_land_in_snapshot() {
        let mut snap = SensorSnapshot { pressure_mbar: 1013.2, ..Default::default() };
        let fix = GpsFix { lat: 4332.944, ns: 'N', lon: 539.783, ew: 'W', altitude_m: 812.0, sats: 7, ..Default::default() };
        apply_fix(&mut snap, &fix);
        assert_eq!(snap.lat, 4332.944);
        assert_eq!(snap.ew, 'W');
        assert_eq!(snap.altitude_m, 812.0);
        assert_eq!(snap.sats, 7);
        assert_eq!(snap.pressure_mbar, 1013.2);
    }

    fn nmea_file(name: &str, gga: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("hab-sensors-{}-{}.nmea", std::process::id(), name));
        let rmc = "$GNRMC,092725.00,A,4717.11437,N,00833.91522,E,0.004,77.52,091202,,,A*57";
        std::fs::write(&path, format!("{}\n{}\n", gga, rmc)).unwrap();
        path
    }

    fn receiver(path: &std::path::Path) -> GpsReceiver {
        let src = gps::NmeaSource::file(path.to_str().unwrap()).unwrap();
        GpsReceiver::new(src, std::time::Duration::from_secs(5))
    }

    #[tokio::test]
    async fn lost_fix_fails_the_read() {
        let path = nmea_file("nofix", "$GPGGA,101500.00,,,,,0,02,,,M,,M,,*00");
        let mut gps = receiver(&path);
        let mut snap = SensorSnapshot { lat: 4332.944, sats: 9, ..Default::default() };

        let err = refresh_position(&mut gps, &mut snap).await.unwrap_err();
        assert!(format!("{:#}", err).contains("not enough satellites"));
        assert_eq!(snap.lat, 4332.944);
        assert_eq!(snap.sats, 9);
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn good_fix_lands_in_snapshot() {
        let path = nmea_file("fix", "$GNGGA,092725.00,4717.11399,N,00833.91590,E,1,08,1.01,499.6,M,48.0,M,,*5B");
        let mut gps = receiver(&path);
        let mut snap = SensorSnapshot::default();
        refresh_position(&mut gps, &mut snap).await.unwrap();
        assert_eq!(snap.lat, 4717.11399);
        assert_eq!(snap.ew, 'E');
        assert_eq!(snap.sats, 8);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn config_sections_round_trip_through_toml() {
        let text = toml::to_string(&SensorsConfig::default()).unwrap();
        assert!(text.contains("[gps]"));
        assert!(text.contains("[pins]"));
        let back: SensorsConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.pins.led, 17);
        assert_eq!(back.baro.i2c_addr, 0x77);
    }
}
