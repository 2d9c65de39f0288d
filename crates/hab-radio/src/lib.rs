//! LoRa transceiver driver (SX127x / RFM9x family) for the downlink.
//!
//! The driver owns the bus handle and the radio's operating mode. Transmit
//! is split in two: [`RadioLink::send`] queues a frame and returns once the
//! chip is in TX, [`RadioLink::wait_for_tx_complete`] polls for TX_DONE.
//! `send` always waits out the previous frame first, so at most one frame
//! is ever in flight.

pub mod bus;
pub mod doctor;
pub mod preset;
mod regs;

#[cfg(test)]
mod sim;

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use bus::{BusError, RegisterBus, SpiRegisterBus};
pub use preset::{Bandwidth, CodingRate, ModemPreset, SpreadingFactor};

/// Largest frame the FIFO takes.
pub const MAX_PAYLOAD: usize = 255;

/// Crystal oscillator and synthesizer step (FXOSC / 2^19, ~61.035 Hz).
pub const FXOSC_HZ: f64 = 32_000_000.0;
pub const FSTEP_HZ: f64 = FXOSC_HZ / 524_288.0;

pub const MIN_TX_POWER_DBM: i8 = 5;
pub const MAX_TX_POWER_DBM: i8 = 23;

const BOOST_THRESHOLD_DBM: i8 = 20;
const TX_DEADLINE_MARGIN: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("radio not responding: OP_MODE read back {found:#04x}, expected {expected:#04x}")]
    DeviceNotResponding { expected: u8, found: u8 },
    #[error("radio already configured")]
    AlreadyConfigured,
    #[error("radio not configured")]
    NotConfigured,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("payload too large: {0} bytes (max {max})", max = MAX_PAYLOAD)]
    PayloadTooLarge(usize),
    #[error("operation not allowed in mode {0:?}")]
    InvalidMode(RadioMode),
    #[error("transmit not complete after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Bus(#[from] BusError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Initializing,
    Sleep,
    Idle,
    Transmit,
    Receive,
    ChannelActivityDetect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioConfig {
    pub frequency_mhz: f64,
    pub tx_power_dbm: i8,
    pub preamble_symbols: u16,
    pub preset: ModemPreset,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_mhz: 868.5,
            tx_power_dbm: MIN_TX_POWER_DBM,
            preamble_symbols: 8,
            preset: ModemPreset::default(),
        }
    }
}

/// How long `wait_for_tx_complete` may poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxWait {
    /// Twice the preset's worst-case airtime plus a margin.
    #[default]
    Auto,
    Fixed(Duration),
    /// Poll until TX_DONE, however long that takes.
    Unbounded,
}

/// Register values for a tx power request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerSetting {
    pub pa_dac: u8,
    pub pa_config: u8,
}

impl PowerSetting {
    pub fn boosted(&self) -> bool {
        self.pa_dac == regs::PA_DAC_ENABLE
    }

    /// The 4-bit output power field.
    pub fn level(&self) -> u8 {
        self.pa_config & 0x0f
    }
}

/// Clamp to 5..=23 dBm. Above 20 dBm the PA_DAC booster adds ~3 dB, so the
/// programmed level drops by 3.
pub fn encode_tx_power(dbm: i8) -> PowerSetting {
    let mut p = dbm.clamp(MIN_TX_POWER_DBM, MAX_TX_POWER_DBM);
    let pa_dac = if p > BOOST_THRESHOLD_DBM {
        p -= 3;
        regs::PA_DAC_ENABLE
    } else {
        regs::PA_DAC_DISABLE
    };
    PowerSetting { pa_dac, pa_config: regs::PA_SELECT | (p - MIN_TX_POWER_DBM) as u8 }
}

/// 24-bit FRF value: round(f / FSTEP).
pub fn frequency_to_register(frequency_mhz: f64) -> Result<u32, RadioError> {
    let steps = (frequency_mhz * 1_000_000.0 / FSTEP_HZ).round();
    if !steps.is_finite() || steps <= 0.0 || steps > 0x00ff_ffff as f64 {
        return Err(RadioError::InvalidArgument(format!("frequency out of range: {} MHz", frequency_mhz)));
    }
    Ok(steps as u32)
}

pub fn register_to_frequency(frf: u32) -> f64 {
    frf as f64 * FSTEP_HZ / 1_000_000.0
}

pub struct RadioLink<B: RegisterBus> {
    bus: B,
    mode: RadioMode,
    config: Option<RadioConfig>,
    tx_wait: TxWait,
    poll_interval: Duration,

    tx_good: u32,
    rx_good: u32,
    rx_bad: u32,
    rx_buf: Vec<u8>,
    rx_valid: bool,
    last_rssi: i16,
    cad_detected: bool,
}

impl<B: RegisterBus> RadioLink<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            mode: RadioMode::Initializing,
            config: None,
            tx_wait: TxWait::Auto,
            poll_interval: Duration::from_millis(1),
            tx_good: 0,
            rx_good: 0,
            rx_bad: 0,
            rx_buf: Vec::with_capacity(MAX_PAYLOAD),
            rx_valid: false,
            last_rssi: -99,
            cad_detected: false,
        }
    }

    pub fn with_tx_wait(mut self, tx_wait: TxWait) -> Self {
        self.tx_wait = tx_wait;
        self
    }

    /// Sleep between IRQ polls; zero busy-polls (yielding to the runtime).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bring the chip up in LoRa mode and apply `cfg`. Only valid once,
    /// straight after construction.
    pub fn configure(&mut self, cfg: &RadioConfig) -> Result<(), RadioError> {
        if self.mode != RadioMode::Initializing {
            return Err(RadioError::AlreadyConfigured);
        }

        // LongRangeMode can only be switched while asleep.
        let expected = regs::MODE_SLEEP | regs::LONG_RANGE_MODE;
        self.bus.write_reg(regs::OP_MODE, expected)?;
        let found = self.bus.read_reg(regs::OP_MODE)?;
        if found != expected {
            return Err(RadioError::DeviceNotResponding { expected, found });
        }
        self.mode = RadioMode::Sleep;

        // A half-applied configuration leaves the link unconfigured.
        if let Err(e) = self.apply_config(cfg) {
            self.mode = RadioMode::Initializing;
            return Err(e);
        }

        self.config = Some(*cfg);
        info!(
            "radio: configured {:.4} MHz, {} dBm, preset {}, preamble {}",
            cfg.frequency_mhz, cfg.tx_power_dbm, cfg.preset, cfg.preamble_symbols
        );
        Ok(())
    }

    fn apply_config(&mut self, cfg: &RadioConfig) -> Result<(), RadioError> {
        self.bus.write_reg(regs::FIFO_TX_BASE_ADDR, 0)?;
        self.bus.write_reg(regs::FIFO_RX_BASE_ADDR, 0)?;

        self.set_idle()?;
        self.write_frequency(cfg.frequency_mhz)?;
        self.write_tx_power(cfg.tx_power_dbm)?;
        self.write_modem_preset(&cfg.preset)?;
        self.write_preamble_length(cfg.preamble_symbols)
    }

    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    pub fn config(&self) -> Option<&RadioConfig> {
        self.config.as_ref()
    }

    /// Frames whose TX_DONE has been observed.
    pub fn tx_count(&self) -> u32 {
        self.tx_good
    }

    pub fn rx_counts(&self) -> (u32, u32) {
        (self.rx_good, self.rx_bad)
    }

    pub fn last_rssi(&self) -> i16 {
        self.last_rssi
    }

    pub fn channel_activity(&self) -> bool {
        self.cad_detected
    }

    // ----- re-tuning -----

    /// Returns the frequency actually programmed (MHz).
    pub fn set_frequency(&mut self, frequency_mhz: f64) -> Result<f64, RadioError> {
        self.ensure_configured()?;
        let realized = self.write_frequency(frequency_mhz)?;
        if let Some(c) = self.config.as_mut() {
            c.frequency_mhz = frequency_mhz;
        }
        Ok(realized)
    }

    pub fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError> {
        self.ensure_configured()?;
        self.write_tx_power(dbm)?;
        if let Some(c) = self.config.as_mut() {
            c.tx_power_dbm = dbm.clamp(MIN_TX_POWER_DBM, MAX_TX_POWER_DBM);
        }
        Ok(())
    }

    pub fn set_modem_preset(&mut self, preset: &ModemPreset) -> Result<(), RadioError> {
        self.ensure_configured()?;
        self.write_modem_preset(preset)?;
        if let Some(c) = self.config.as_mut() {
            c.preset = *preset;
        }
        Ok(())
    }

    /// Untyped variant of [`set_modem_preset`](Self::set_modem_preset);
    /// the slice must hold exactly three bytes.
    pub fn set_modem_config_raw(&mut self, bytes: &[u8]) -> Result<(), RadioError> {
        let preset = ModemPreset::from_slice(bytes)?;
        self.set_modem_preset(&preset)
    }

    pub fn set_preamble_length(&mut self, symbols: u16) -> Result<(), RadioError> {
        self.ensure_configured()?;
        self.write_preamble_length(symbols)?;
        if let Some(c) = self.config.as_mut() {
            c.preamble_symbols = symbols;
        }
        Ok(())
    }

    fn write_frequency(&mut self, frequency_mhz: f64) -> Result<f64, RadioError> {
        let frf = frequency_to_register(frequency_mhz)?;
        let bytes = frf.to_be_bytes();
        self.bus.write_reg(regs::FRF_MSB, bytes[1])?;
        self.bus.write_reg(regs::FRF_MID, bytes[2])?;
        self.bus.write_reg(regs::FRF_LSB, bytes[3])?;
        Ok(register_to_frequency(frf))
    }

    fn write_tx_power(&mut self, dbm: i8) -> Result<(), RadioError> {
        let p = encode_tx_power(dbm);
        self.bus.write_reg(regs::PA_DAC, p.pa_dac)?;
        self.bus.write_reg(regs::PA_CONFIG, p.pa_config)?;
        Ok(())
    }

    fn write_modem_preset(&mut self, preset: &ModemPreset) -> Result<(), RadioError> {
        let [c1, c2, c3] = preset.bytes();
        self.bus.write_reg(regs::MODEM_CONFIG1, c1)?;
        self.bus.write_reg(regs::MODEM_CONFIG2, c2)?;
        self.bus.write_reg(regs::MODEM_CONFIG3, c3)?;
        Ok(())
    }

    fn write_preamble_length(&mut self, symbols: u16) -> Result<(), RadioError> {
        let [msb, lsb] = symbols.to_be_bytes();
        self.bus.write_reg(regs::PREAMBLE_MSB, msb)?;
        self.bus.write_reg(regs::PREAMBLE_LSB, lsb)?;
        Ok(())
    }

    fn ensure_configured(&self) -> Result<(), RadioError> {
        match self.mode {
            RadioMode::Initializing => Err(RadioError::NotConfigured),
            _ => Ok(()),
        }
    }

    // ----- mode transitions -----

    pub fn set_idle(&mut self) -> Result<(), RadioError> {
        if self.mode != RadioMode::Idle {
            self.bus.write_reg(regs::OP_MODE, regs::MODE_STDBY)?;
            self.mode = RadioMode::Idle;
        }
        Ok(())
    }

    pub fn set_sleep(&mut self) -> Result<(), RadioError> {
        if self.mode != RadioMode::Sleep {
            self.bus.write_reg(regs::OP_MODE, regs::MODE_SLEEP)?;
            self.mode = RadioMode::Sleep;
        }
        Ok(())
    }

    fn set_receive(&mut self) -> Result<(), RadioError> {
        if self.mode != RadioMode::Receive {
            self.bus.write_reg(regs::OP_MODE, regs::MODE_RXCONTINUOUS)?;
            self.mode = RadioMode::Receive;
            self.bus.write_reg(regs::DIO_MAPPING1, regs::DIO0_RX_DONE)?;
        }
        Ok(())
    }

    fn set_transmit(&mut self) -> Result<(), RadioError> {
        if self.mode != RadioMode::Transmit {
            // The chip is transmitting once OP_MODE lands, whatever happens
            // to the DIO mapping.
            self.bus.write_reg(regs::OP_MODE, regs::MODE_TX)?;
            self.mode = RadioMode::Transmit;
            self.bus.write_reg(regs::DIO_MAPPING1, regs::DIO0_TX_DONE)?;
        }
        Ok(())
    }

    /// Idle → ChannelActivityDetect. The result is collected by
    /// [`available`](Self::available).
    pub fn start_channel_activity_detect(&mut self) -> Result<(), RadioError> {
        self.ensure_configured()?;
        if self.mode == RadioMode::Transmit {
            return Err(RadioError::InvalidMode(self.mode));
        }
        if self.mode != RadioMode::ChannelActivityDetect {
            self.set_idle()?;
            self.bus.write_reg(regs::OP_MODE, regs::MODE_CAD)?;
            self.mode = RadioMode::ChannelActivityDetect;
            self.bus.write_reg(regs::DIO_MAPPING1, regs::DIO0_CAD_DONE)?;
        }
        Ok(())
    }

    // ----- transmit -----

    /// Queue one frame. Waits for the previous frame first; returns as soon
    /// as the chip has been switched to TX.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(RadioError::PayloadTooLarge(payload.len()));
        }
        if payload.is_empty() {
            return Err(RadioError::InvalidArgument("empty frame".into()));
        }
        self.ensure_configured()?;

        self.wait_for_tx_complete().await?;
        self.set_idle()?;

        self.bus.write_reg(regs::FIFO_ADDR_PTR, 0)?;
        self.bus.write_burst(regs::FIFO, payload)?;
        self.bus.write_reg(regs::PAYLOAD_LENGTH, payload.len() as u8)?;

        self.set_transmit()?;
        debug!("radio: queued {} bytes", payload.len());
        Ok(())
    }

    /// Poll for TX_DONE. `Ok(false)` when nothing is being transmitted.
    pub async fn wait_for_tx_complete(&mut self) -> Result<bool, RadioError> {
        if self.mode != RadioMode::Transmit {
            return Ok(false);
        }

        let limit = self.tx_deadline();
        let started = Instant::now();
        loop {
            let flags = self.bus.read_reg(regs::IRQ_FLAGS)?;
            if flags & regs::IRQ_TX_DONE != 0 {
                break;
            }
            if let Some(limit) = limit {
                if started.elapsed() >= limit {
                    warn!("radio: no TX_DONE after {:?}, forcing idle", limit);
                    self.bus.write_reg(regs::IRQ_FLAGS, regs::IRQ_CLEAR_ALL)?;
                    self.set_idle()?;
                    return Err(RadioError::Timeout(limit));
                }
            }
            if self.poll_interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        self.tx_good = self.tx_good.wrapping_add(1);
        self.bus.write_reg(regs::IRQ_FLAGS, regs::IRQ_CLEAR_ALL)?;
        self.set_idle()?;
        Ok(true)
    }

    fn tx_deadline(&self) -> Option<Duration> {
        match self.tx_wait {
            TxWait::Unbounded => None,
            TxWait::Fixed(d) => Some(d),
            TxWait::Auto => {
                let cfg = self.config.unwrap_or_default();
                Some(cfg.preset.worst_case_airtime(cfg.preamble_symbols) * 2 + TX_DEADLINE_MARGIN)
            }
        }
    }

    // ----- receive -----

    /// Non-interrupt receive check: collects a finished packet or CAD result,
    /// then (re)enters continuous receive. True when a valid packet is
    /// buffered.
    pub fn available(&mut self) -> Result<bool, RadioError> {
        self.ensure_configured()?;
        if self.mode == RadioMode::Transmit {
            return Err(RadioError::InvalidMode(self.mode));
        }

        let flags = self.bus.read_reg(regs::IRQ_FLAGS)?;
        if self.mode == RadioMode::Receive && flags & regs::IRQ_RX_DONE != 0 {
            if flags & regs::IRQ_PAYLOAD_CRC_ERROR != 0 {
                self.rx_bad = self.rx_bad.wrapping_add(1);
            } else {
                let len = self.bus.read_reg(regs::RX_NB_BYTES)? as usize;
                let ptr = self.bus.read_reg(regs::FIFO_RX_CURRENT_ADDR)?;
                self.bus.write_reg(regs::FIFO_ADDR_PTR, ptr)?;
                self.rx_buf.resize(len, 0);
                self.bus.read_burst(regs::FIFO, &mut self.rx_buf)?;
                let raw = self.bus.read_reg(regs::PKT_RSSI_VALUE)?;
                self.last_rssi = raw as i16 - regs::RSSI_OFFSET;
                self.rx_good = self.rx_good.wrapping_add(1);
                self.rx_valid = true;
            }
            self.set_idle()?;
        } else if self.mode == RadioMode::ChannelActivityDetect && flags & regs::IRQ_CAD_DONE != 0 {
            self.cad_detected = flags & regs::IRQ_CAD_DETECTED != 0;
            self.set_idle()?;
        }
        self.bus.write_reg(regs::IRQ_FLAGS, regs::IRQ_CLEAR_ALL)?;

        self.set_receive()?;
        Ok(self.rx_valid)
    }

    /// Hand out the buffered packet, if any, and clear the buffer.
    pub fn take_received(&mut self) -> Option<Vec<u8>> {
        if !self.rx_valid {
            return None;
        }
        self.rx_valid = false;
        Some(std::mem::take(&mut self.rx_buf))
    }

    pub fn clear_rx_buf(&mut self) {
        self.rx_valid = false;
        self.rx_buf.clear();
    }
}
