//! MS5607 barometer over I2C.

use std::time::Duration;

use anyhow::{Context, Result};
use rppal::i2c::I2c;
use tracing::debug;

const CMD_RESET: u8 = 0x1e;
const CMD_ADC_READ: u8 = 0x00;
const CMD_ADC_CONV: u8 = 0x40;
const CMD_ADC_D1: u8 = 0x00;
const CMD_ADC_D2: u8 = 0x10;
const CMD_ADC_4096: u8 = 0x08;
const CMD_PROM_RD: u8 = 0xa0;

const CONVERSION_TIME: Duration = Duration::from_millis(10);
const RESET_TIME: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BaroConfig {
    pub i2c_bus: u8,
    pub i2c_addr: u16,
}

impl Default for BaroConfig {
    fn default() -> Self {
        Self { i2c_bus: 1, i2c_addr: 0x77 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaroReading {
    pub temp_c: f64,
    pub pressure_mbar: f64,
}

/// Datasheet compensation, first and second order. `prom[1..=6]` are the
/// calibration words C1..C6. Returns (°C × 100, mbar × 100).
pub fn compensate(prom: &[u16; 7], d1: u32, d2: u32) -> (i64, i64) {
    let c = |i: usize| prom[i] as i64;
    let (d1, d2) = (d1 as i64, d2 as i64);

    let dt = d2 - c(5) * (1 << 8);
    let mut temp = 2000 + dt * c(6) / (1 << 23);
    let mut off = c(2) * (1 << 17) + c(4) * dt / (1 << 6);
    let mut sens = c(1) * (1 << 16) + c(3) * dt / (1 << 7);

    if temp < 2000 {
        let t2 = dt * dt / (1i64 << 31);
        let cold = (temp - 2000) * (temp - 2000);
        let mut off2 = 61 * cold / (1 << 4);
        let mut sens2 = 2 * cold;
        if temp < -1500 {
            let very_cold = (temp + 1500) * (temp + 1500);
            off2 += 15 * very_cold;
            sens2 += 8 * very_cold;
        }
        temp -= t2;
        off -= off2;
        sens -= sens2;
    }

    let p = (d1 * sens / (1 << 21) - off) / (1 << 15);
    (temp, p)
}

pub struct Ms5607 {
    i2c: I2c,
    prom: [u16; 7],
}

impl Ms5607 {
    /// Reset the sensor and load its calibration PROM.
    pub async fn open(cfg: &BaroConfig) -> Result<Self> {
        let mut i2c = I2c::with_bus(cfg.i2c_bus).with_context(|| format!("open i2c bus {}", cfg.i2c_bus))?;
        i2c.set_slave_address(cfg.i2c_addr)
            .with_context(|| format!("barometer address {:#x}", cfg.i2c_addr))?;

        i2c.write(&[CMD_RESET]).context("barometer reset")?;
        tokio::time::sleep(RESET_TIME).await;

        let mut prom = [0u16; 7];
        for (i, word) in prom.iter_mut().enumerate() {
            let mut rx = [0u8; 2];
            i2c.write_read(&[CMD_PROM_RD + 2 * i as u8], &mut rx).context("barometer prom read")?;
            *word = u16::from_be_bytes(rx);
        }
        debug!("baro: prom {:?}", prom);
        anyhow::ensure!(prom[1..].iter().all(|&w| w != 0 && w != 0xffff), "barometer prom looks blank");

        Ok(Self { i2c, prom })
    }

    async fn read_adc(&mut self, cmd: u8) -> Result<u32> {
        self.i2c.write(&[CMD_ADC_CONV + cmd]).context("barometer start conversion")?;
        tokio::time::sleep(CONVERSION_TIME).await;
        let mut rx = [0u8; 3];
        self.i2c.write_read(&[CMD_ADC_READ], &mut rx).context("barometer adc read")?;
        Ok(u32::from_be_bytes([0, rx[0], rx[1], rx[2]]))
    }

    pub async fn read(&mut self) -> Result<BaroReading> {
        let d2 = self.read_adc(CMD_ADC_D2 + CMD_ADC_4096).await?;
        let d1 = self.read_adc(CMD_ADC_D1 + CMD_ADC_4096).await?;
        let (temp, p) = compensate(&self.prom, d1, d2);
        let r = BaroReading { temp_c: temp as f64 / 100.0, pressure_mbar: p as f64 / 100.0 };
        debug!("baro: {:.2} mbar, {:.2} C", r.pressure_mbar, r.temp_c);
        Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROM: [u16; 7] = [0, 46372, 43981, 29059, 27842, 31553, 28165];

    #[test]
    fn datasheet_example() {
        assert_eq!(compensate(&PROM, 6_465_444, 8_077_636), (2000, 110_002));
    }

    #[test]
    fn second_order_below_minus_15() {
        assert_eq!(compensate(&PROM, 6_465_444, 7_000_000), (-2157, 100_348));
    }
}
