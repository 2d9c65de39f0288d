//! In-memory SX127x register file for driver tests.

use std::sync::{Arc, Mutex};

use crate::bus::{BusError, RegisterBus};
use crate::regs;

struct SimState {
    regs: [u8; 128],
    fifo: [u8; 256],
    log: Vec<Vec<u8>>,
    frames: Vec<Vec<u8>>,
    absent: bool,
    fail_next: bool,
    /// Fail the next write to this register.
    fail_write: Option<u8>,
    /// IRQ_FLAGS polls before TX_DONE rises after entering TX; None = never.
    tx_done_after: Option<usize>,
    tx_pending: Option<usize>,
}

#[derive(Clone)]
pub struct SimBus(Arc<Mutex<SimState>>);

impl SimBus {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(SimState {
            regs: [0; 128],
            fifo: [0; 256],
            log: Vec::new(),
            frames: Vec::new(),
            absent: false,
            fail_next: false,
            fail_write: None,
            tx_done_after: Some(0),
            tx_pending: None,
        })))
    }

    pub fn set_absent(&self, absent: bool) {
        self.0.lock().unwrap().absent = absent;
    }

    pub fn fail_next(&self) {
        self.0.lock().unwrap().fail_next = true;
    }

    pub fn fail_write_to(&self, reg: u8) {
        self.0.lock().unwrap().fail_write = Some(reg);
    }

    pub fn set_tx_done_after(&self, polls: Option<usize>) {
        self.0.lock().unwrap().tx_done_after = polls;
    }

    pub fn set_irq(&self, flags: u8) {
        self.0.lock().unwrap().regs[regs::IRQ_FLAGS as usize] |= flags;
    }

    pub fn reg(&self, addr: u8) -> u8 {
        self.0.lock().unwrap().regs[addr as usize]
    }

    pub fn log(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().log.clone()
    }

    pub fn clear_log(&self) {
        self.0.lock().unwrap().log.clear();
    }

    /// Payloads that were in the FIFO each time TX mode was entered.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().frames.clone()
    }

    /// Place a received packet at FIFO address 0 and raise RX_DONE.
    pub fn inject_rx(&self, data: &[u8], rssi: u8, crc_error: bool) {
        let mut s = self.0.lock().unwrap();
        s.fifo[..data.len()].copy_from_slice(data);
        s.regs[regs::RX_NB_BYTES as usize] = data.len() as u8;
        s.regs[regs::FIFO_RX_CURRENT_ADDR as usize] = 0;
        s.regs[regs::PKT_RSSI_VALUE as usize] = rssi;
        let mut flags = regs::IRQ_RX_DONE;
        if crc_error {
            flags |= regs::IRQ_PAYLOAD_CRC_ERROR;
        }
        s.regs[regs::IRQ_FLAGS as usize] |= flags;
    }
}

impl SimState {
    fn write(&mut self, addr: u8, data: &[u8]) {
        match addr {
            regs::FIFO => {
                for &b in data {
                    let ptr = self.regs[regs::FIFO_ADDR_PTR as usize];
                    self.fifo[ptr as usize] = b;
                    self.regs[regs::FIFO_ADDR_PTR as usize] = ptr.wrapping_add(1);
                }
            }
            regs::IRQ_FLAGS => {
                for &b in data {
                    self.regs[regs::IRQ_FLAGS as usize] &= !b;
                }
            }
            regs::OP_MODE => {
                for &b in data {
                    self.regs[regs::OP_MODE as usize] = b;
                    if b & regs::MODE_MASK == regs::MODE_TX {
                        let base = self.regs[regs::FIFO_TX_BASE_ADDR as usize] as usize;
                        let len = self.regs[regs::PAYLOAD_LENGTH as usize] as usize;
                        let frame = self.fifo[base..(base + len).min(256)].to_vec();
                        self.frames.push(frame);
                        self.tx_pending = self.tx_done_after;
                    }
                }
            }
            _ => {
                for (i, &b) in data.iter().enumerate() {
                    self.regs[(addr as usize + i) & 0x7f] = b;
                }
            }
        }
    }

    fn read(&mut self, addr: u8, out: &mut [u8]) {
        for (i, o) in out.iter_mut().enumerate() {
            *o = match addr {
                regs::FIFO => {
                    let ptr = self.regs[regs::FIFO_ADDR_PTR as usize];
                    self.regs[regs::FIFO_ADDR_PTR as usize] = ptr.wrapping_add(1);
                    self.fifo[ptr as usize]
                }
                regs::IRQ_FLAGS => {
                    if let Some(n) = self.tx_pending {
                        if n == 0 {
                            self.regs[regs::IRQ_FLAGS as usize] |= regs::IRQ_TX_DONE;
                            self.tx_pending = None;
                        } else {
                            self.tx_pending = Some(n - 1);
                        }
                    }
                    self.regs[regs::IRQ_FLAGS as usize]
                }
                _ => self.regs[(addr as usize + i) & 0x7f],
            };
        }
    }
}

impl RegisterBus for SimBus {
    fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), BusError> {
        let mut s = self.0.lock().unwrap();
        let write_fault = matches!(write.first(), Some(&b) if s.fail_write == Some(b & 0x7f) && b & 0x80 != 0);
        if s.fail_next || write_fault {
            s.fail_next = false;
            if write_fault {
                s.fail_write = None;
            }
            return Err(BusError::Io(std::io::Error::new(std::io::ErrorKind::Other, "injected fault")));
        }
        s.log.push(write.to_vec());
        read.fill(0);
        if s.absent || write.is_empty() {
            return Ok(());
        }
        let addr = write[0] & 0x7f;
        if write[0] & 0x80 != 0 {
            s.write(addr, &write[1..]);
        } else {
            s.read(addr, &mut read[1..]);
        }
        Ok(())
    }
}
