use std::time::Duration;

use anyhow::{Context, Result};
use rppal::gpio::{Gpio, OutputPin};

use crate::mcp3002::Mcp3002;

const SETTLE: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AdcConfig {
    pub spi_bus: u8,
    pub cs: u8,
    pub channel: u8,
    /// Volts = raw × multiplier / divider.
    pub v_multiplier: f64,
    pub v_divider: f64,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self { spi_bus: 0, cs: 1, channel: 0, v_multiplier: 3.3, v_divider: 1023.0 / 2.0 }
    }
}

pub fn raw_to_volts(raw: u16, multiplier: f64, divider: f64) -> f64 {
    raw as f64 * multiplier / divider
}

/// Battery divider behind an enable switch, read through the ADC.
pub struct Battery {
    enable: OutputPin,
    adc: Mcp3002,
    channel: u8,
    multiplier: f64,
    divider: f64,
}

impl Battery {
    pub fn open(gpio: &Gpio, enable_pin: u8, cfg: &AdcConfig) -> Result<Self> {
        let enable = gpio.get(enable_pin)
            .with_context(|| format!("battery enable pin {}", enable_pin))?
            .into_output_low();
        let adc = Mcp3002::open(cfg.spi_bus, cfg.cs)?;
        Ok(Self { enable, adc, channel: cfg.channel, multiplier: cfg.v_multiplier, divider: cfg.v_divider })
    }

    pub async fn read_volts(&mut self) -> Result<f64> {
        self.enable.set_high();
        tokio::time::sleep(SETTLE).await;
        let raw = self.adc.read(self.channel);
        self.enable.set_low();
        Ok(raw_to_volts(raw?, self.multiplier, self.divider))
    }
}
