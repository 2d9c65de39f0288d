//! SX127x / RFM9x register map, LoRa mode.

pub const FIFO: u8 = 0x00;
pub const OP_MODE: u8 = 0x01;
pub const FRF_MSB: u8 = 0x06;
pub const FRF_MID: u8 = 0x07;
pub const FRF_LSB: u8 = 0x08;
pub const PA_CONFIG: u8 = 0x09;
pub const FIFO_ADDR_PTR: u8 = 0x0d;
pub const FIFO_TX_BASE_ADDR: u8 = 0x0e;
pub const FIFO_RX_BASE_ADDR: u8 = 0x0f;
pub const FIFO_RX_CURRENT_ADDR: u8 = 0x10;
pub const IRQ_FLAGS: u8 = 0x12;
pub const RX_NB_BYTES: u8 = 0x13;
pub const PKT_RSSI_VALUE: u8 = 0x1a;
pub const MODEM_CONFIG1: u8 = 0x1d;
pub const MODEM_CONFIG2: u8 = 0x1e;
pub const PREAMBLE_MSB: u8 = 0x20;
pub const PREAMBLE_LSB: u8 = 0x21;
pub const PAYLOAD_LENGTH: u8 = 0x22;
pub const MODEM_CONFIG3: u8 = 0x26;
pub const DIO_MAPPING1: u8 = 0x40;
pub const PA_DAC: u8 = 0x4d;

// OP_MODE
pub const LONG_RANGE_MODE: u8 = 0x80;
#[cfg(test)]
pub const MODE_MASK: u8 = 0x07;
pub const MODE_SLEEP: u8 = 0x00;
pub const MODE_STDBY: u8 = 0x01;
pub const MODE_TX: u8 = 0x03;
pub const MODE_RXCONTINUOUS: u8 = 0x05;
pub const MODE_CAD: u8 = 0x07;

// IRQ_FLAGS
pub const IRQ_RX_DONE: u8 = 0x40;
pub const IRQ_PAYLOAD_CRC_ERROR: u8 = 0x20;
pub const IRQ_TX_DONE: u8 = 0x08;
pub const IRQ_CAD_DONE: u8 = 0x04;
pub const IRQ_CAD_DETECTED: u8 = 0x01;
pub const IRQ_CLEAR_ALL: u8 = 0xff;

// DIO_MAPPING1: DIO0 function per mode
pub const DIO0_RX_DONE: u8 = 0x00;
pub const DIO0_TX_DONE: u8 = 0x40;
pub const DIO0_CAD_DONE: u8 = 0x80;

// PA_CONFIG / PA_DAC
pub const PA_SELECT: u8 = 0x80;
pub const PA_DAC_DISABLE: u8 = 0x04;
pub const PA_DAC_ENABLE: u8 = 0x07;

// RSSI offset for the HF port
pub const RSSI_OFFSET: i16 = 137;
