use anyhow::Result;

use crate::SensorsConfig;

const GPS_BAUDS: [u32; 6] = [4800, 9600, 19200, 38400, 57600, 115200];

pub fn check_sensors(cfg: &SensorsConfig) -> Result<()> {
    anyhow::ensure!(!cfg.gps.port.is_empty(), "gps.port is empty");
    anyhow::ensure!(cfg.gps.source == "serial" || cfg.gps.source == "file", "gps.source must be serial or file");
    anyhow::ensure!(GPS_BAUDS.contains(&cfg.gps.speed), "gps.speed {} is not a standard baud rate", cfg.gps.speed);
    anyhow::ensure!(cfg.gps.timeout_s >= 1 && cfg.gps.timeout_s <= 30, "gps.timeout_s should be 1..30");

    // CSB pin selects 0x76 or 0x77
    anyhow::ensure!(matches!(cfg.baro.i2c_addr, 0x76 | 0x77), "baro.i2c_addr must be 0x76 or 0x77");

    anyhow::ensure!(
        cfg.temp.internal_addr.starts_with("28-") && cfg.temp.external_addr.starts_with("28-"),
        "temp addresses must be DS18B20 ids (28-xxxxxxxxxxxx)"
    );
    anyhow::ensure!(cfg.temp.internal_addr != cfg.temp.external_addr, "internal and external probes share an id");

    anyhow::ensure!(cfg.adc.channel <= 1, "adc.channel must be 0 or 1");
    anyhow::ensure!(cfg.adc.v_divider > 0.0 && cfg.adc.v_multiplier > 0.0, "adc voltage scaling must be positive");

    let p = &cfg.pins;
    anyhow::ensure!(
        p.led != p.batt_enable && p.led != p.power_select && p.batt_enable != p.power_select,
        "pins must be distinct"
    );
    Ok(())
}
