//! MCP3002 2-channel 10-bit ADC on SPI.

use anyhow::{Context, Result};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

const CLOCK_HZ: u32 = 488_000;
// start bit, single-ended, MSB first
const CMD_SINGLE: u8 = 0b1101_0000;

pub struct Mcp3002 {
    spi: Spi,
}

fn command(channel: u8) -> [u8; 3] {
    [CMD_SINGLE | (channel << 5), 0x00, 0x00]
}

/// 10 bits straddle all three bytes: 1 + 8 + 1.
fn decode(rx: &[u8; 3]) -> u16 {
    ((rx[0] as u16 & 0x01) << 9) | ((rx[1] as u16) << 1) | ((rx[2] as u16 & 0x80) >> 7)
}

impl Mcp3002 {
    pub fn open(bus: u8, chip_select: u8) -> Result<Self> {
        let bus_id = match bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            other => anyhow::bail!("adc spi bus {} not supported", other),
        };
        let ss = match chip_select {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            other => anyhow::bail!("adc chip select {} not supported", other),
        };
        let spi = Spi::new(bus_id, ss, CLOCK_HZ, Mode::Mode0)
            .with_context(|| format!("open spidev{}.{}", bus, chip_select))?;
        Ok(Self { spi })
    }

    pub fn read(&mut self, channel: u8) -> Result<u16> {
        anyhow::ensure!(channel <= 1, "wrong MCP3002 channel {}", channel);
        let tx = command(channel);
        let mut rx = [0u8; 3];
        self.spi.transfer(&mut rx, &tx).context("adc transfer")?;
        Ok(decode(&rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_select_bit() {
        assert_eq!(command(0)[0], 0xd0);
        assert_eq!(command(1)[0], 0xf0);
    }

    #[test]
    fn decodes_ten_bits() {
        assert_eq!(decode(&[0x01, 0xff, 0x80]), 1023);
        assert_eq!(decode(&[0xfe, 0x00, 0x7f]), 0);
        assert_eq!(decode(&[0x00, 0x80, 0x00]), 256);
        assert_eq!(decode(&[0x01, 0x00, 0x80]), 513);
    }
}
