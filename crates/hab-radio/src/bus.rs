//! Register-addressed serial bus.
//!
//! One transaction = one chip-select frame: an address byte (bit 7 set for a
//! write) followed by the data bytes, MSB first. Reads clock out one dummy
//! byte per register byte and take the data from the bytes after the address.

use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use thiserror::Error;

const WRITE_MASK: u8 = 0x80;
const READ_MASK: u8 = 0x7f;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("spi: {0}")]
    Spi(#[from] rppal::spi::Error),
    #[error("bus i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("short transfer: expected {expected} bytes, moved {moved}")]
    Short { expected: usize, moved: usize },
    #[error("unknown bus device: {0}")]
    UnknownDevice(String),
}

/// Full-duplex transport under the radio driver. Implementors only provide
/// `transfer`; the register helpers encode the address byte.
pub trait RegisterBus {
    /// Clock `write` out and fill `read` (same length) with what came back.
    fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError>;

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        self.write_burst(reg, &[value])
    }

    fn write_burst(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError> {
        let mut tx = Vec::with_capacity(data.len() + 1);
        tx.push(reg | WRITE_MASK);
        tx.extend_from_slice(data);
        let mut rx = vec![0u8; tx.len()];
        self.transfer(&tx, &mut rx)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, BusError> {
        let mut b = [0u8; 1];
        self.read_burst(reg, &mut b)?;
        Ok(b[0])
    }

    fn read_burst(&mut self, reg: u8, out: &mut [u8]) -> Result<(), BusError> {
        let mut tx = vec![0u8; out.len() + 1];
        tx[0] = reg & READ_MASK;
        let mut rx = vec![0u8; tx.len()];
        self.transfer(&tx, &mut rx)?;
        out.copy_from_slice(&rx[1..]);
        Ok(())
    }
}

/// Linux spidev bus, opened once and held for the lifetime of the driver.
pub struct SpiRegisterBus {
    spi: Spi,
}

impl SpiRegisterBus {
    pub fn open(bus: u8, chip_select: u8, clock_hz: u32) -> Result<Self, BusError> {
        let bus = match bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            2 => Bus::Spi2,
            3 => Bus::Spi3,
            4 => Bus::Spi4,
            5 => Bus::Spi5,
            6 => Bus::Spi6,
            other => return Err(BusError::UnknownDevice(format!("spi bus {}", other))),
        };
        let ss = match chip_select {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            other => return Err(BusError::UnknownDevice(format!("chip select {}", other))),
        };
        let spi = Spi::new(bus, ss, clock_hz, Mode::Mode0)?;
        Ok(Self { spi })
    }
}

impl RegisterBus for SpiRegisterBus {
    fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError> {
        let moved = self.spi.transfer(read, write)?;
        if moved != write.len() {
            return Err(BusError::Short { expected: write.len(), moved });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<Vec<u8>>,
        reply: Vec<u8>,
    }

    impl RegisterBus for Recorder {
        fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError> {
            self.sent.push(write.to_vec());
            for (i, b) in read.iter_mut().enumerate() {
                *b = self.reply.get(i).copied().unwrap_or(0);
            }
            Ok(())
        }
    }

    #[test]
    fn write_sets_bit7_on_address() {
        let mut bus = Recorder::default();
        bus.write_reg(0x01, 0x81).unwrap();
        bus.write_burst(0x00, &[1, 2, 3]).unwrap();
        assert_eq!(bus.sent[0], vec![0x81, 0x81]);
        assert_eq!(bus.sent[1], vec![0x80, 1, 2, 3]);
    }

    #[test]
    fn read_clears_bit7_and_skips_address_byte() {
        let mut bus = Recorder { reply: vec![0xee, 0x12, 0x34], ..Default::default() };
        assert_eq!(bus.read_reg(0xc2).unwrap(), 0x12);
        assert_eq!(bus.sent[0], vec![0x42, 0x00]);

        let mut out = [0u8; 2];
        bus.read_burst(0x00, &mut out).unwrap();
        assert_eq!(out, [0x12, 0x34]);
        assert_eq!(bus.sent[1], vec![0x00, 0x00, 0x00]);
    }
}
