use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::RadioError;

/// LoRa bandwidth, as encoded in the high nibble of MODEM_CONFIG1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bandwidth {
    BW7_8 = 0,
    BW10_4 = 1,
    BW15_6 = 2,
    BW20_8 = 3,
    BW31_25 = 4,
    BW41_7 = 5,
    BW62_5 = 6,
    BW125 = 7,
    BW250 = 8,
    BW500 = 9,
}

/// Forward error correction, 4/5 .. 4/8.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodingRate {
    CR4_5 = 1,
    CR4_6 = 2,
    CR4_7 = 3,
    CR4_8 = 4,
}

/// Chips per symbol = 2^SF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpreadingFactor {
    SF6 = 6,
    SF7 = 7,
    SF8 = 8,
    SF9 = 9,
    SF10 = 10,
    SF11 = 11,
    SF12 = 12,
}

const BANDWIDTH_HZ: [f64; 10] = [
    7_800.0, 10_400.0, 15_600.0, 20_800.0, 31_250.0, 41_700.0, 62_500.0, 125_000.0, 250_000.0, 500_000.0,
];

const IMPLICIT_HEADER: u8 = 0x01;
const RX_PAYLOAD_CRC_ON: u8 = 0x04;
const AGC_AUTO_ON: u8 = 0x04;
const LOW_DATA_RATE_OPTIMIZE: u8 = 0x08;

/// The three modem configuration bytes, written verbatim into
/// MODEM_CONFIG1, MODEM_CONFIG2 and MODEM_CONFIG3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModemPreset([u8; 3]);

impl ModemPreset {
    /// 125 kHz, 4/5, SF7, CRC on. Medium range, the default.
    pub const BW125_CR45_SF128: Self = Self([0x72, 0x74, 0x00]);
    /// 500 kHz, 4/5, SF7, CRC on. Fast, short range.
    pub const BW500_CR45_SF128: Self = Self([0x92, 0x74, 0x00]);
    /// 31.25 kHz, 4/8, SF9, CRC on. Slow, long range.
    pub const BW31_25_CR48_SF512: Self = Self([0x48, 0x94, 0x00]);
    /// 125 kHz, 4/8, SF12, CRC on. Slowest, longest range.
    pub const BW125_CR48_SF4096: Self = Self([0x78, 0xc4, 0x00]);

    pub const NAMED: [(&'static str, ModemPreset); 4] = [
        ("bw125_cr45_sf128", Self::BW125_CR45_SF128),
        ("bw500_cr45_sf128", Self::BW500_CR45_SF128),
        ("bw31_25_cr48_sf512", Self::BW31_25_CR48_SF512),
        ("bw125_cr48_sf4096", Self::BW125_CR48_SF4096),
    ];

    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    /// Raw register triple from an untyped source; anything but exactly
    /// three bytes is rejected.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RadioError> {
        let arr: [u8; 3] = bytes.try_into().map_err(|_| {
            RadioError::InvalidArgument(format!("modem config needs 3 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Assemble a preset from its bit fields.
    pub fn custom(
        bandwidth: Bandwidth,
        coding_rate: CodingRate,
        implicit_header: bool,
        spreading_factor: SpreadingFactor,
        crc: bool,
        agc_auto: bool,
    ) -> Self {
        let c1 = ((bandwidth as u8) << 4) | ((coding_rate as u8) << 1) | if implicit_header { IMPLICIT_HEADER } else { 0 };
        let c2 = ((spreading_factor as u8) << 4) | if crc { RX_PAYLOAD_CRC_ON } else { 0 };
        let c3 = if agc_auto { AGC_AUTO_ON } else { 0 };
        Self([c1, c2, c3])
    }

    pub fn bytes(&self) -> [u8; 3] {
        self.0
    }

    /// None for reserved bandwidth codes.
    pub fn bandwidth_hz(&self) -> Option<f64> {
        BANDWIDTH_HZ.get((self.0[0] >> 4) as usize).copied()
    }

    pub fn spreading_factor(&self) -> u8 {
        (self.0[1] >> 4).clamp(6, 12)
    }

    /// Denominator of the coding rate (5..=8). Reserved codes count as 4/8.
    pub fn coding_rate_denominator(&self) -> u8 {
        match (self.0[0] >> 1) & 0x07 {
            cr @ 1..=4 => cr + 4,
            _ => 8,
        }
    }

    pub fn implicit_header(&self) -> bool {
        self.0[0] & IMPLICIT_HEADER != 0
    }

    pub fn crc_on(&self) -> bool {
        self.0[1] & RX_PAYLOAD_CRC_ON != 0
    }

    pub fn low_data_rate_optimize(&self) -> bool {
        self.0[2] & LOW_DATA_RATE_OPTIMIZE != 0
    }

    /// Time on air for one packet (Semtech AN1200.13). Reserved bandwidth
    /// codes are costed at the narrowest bandwidth.
    pub fn airtime(&self, payload_len: usize, preamble_symbols: u16) -> Duration {
        let sf = self.spreading_factor() as f64;
        let bw = self.bandwidth_hz().unwrap_or(BANDWIDTH_HZ[0]);
        let t_sym = 2f64.powf(sf) / bw;
        let t_preamble = (preamble_symbols as f64 + 4.25) * t_sym;

        let de = if self.low_data_rate_optimize() { 1.0 } else { 0.0 };
        let ih = if self.implicit_header() { 1.0 } else { 0.0 };
        let crc = if self.crc_on() { 1.0 } else { 0.0 };
        let cr = (self.coding_rate_denominator() - 4) as f64;

        let num = 8.0 * payload_len as f64 - 4.0 * sf + 28.0 + 16.0 * crc - 20.0 * ih;
        let den = 4.0 * (sf - 2.0 * de);
        let payload_symbols = 8.0 + ((num / den).ceil() * (cr + 4.0)).max(0.0);

        Duration::from_secs_f64(t_preamble + payload_symbols * t_sym)
    }

    /// Airtime of a full 255-byte frame.
    pub fn worst_case_airtime(&self, preamble_symbols: u16) -> Duration {
        self.airtime(crate::MAX_PAYLOAD, preamble_symbols)
    }
}

impl Default for ModemPreset {
    fn default() -> Self {
        Self::BW125_CR45_SF128
    }
}

impl FromStr for ModemPreset {
    type Err = RadioError;

    /// Accepts a preset name (`bw125_cr45_sf128`, ...) or three hex bytes
    /// (`72:74:00`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((_, p)) = Self::NAMED.iter().find(|(name, _)| name.eq_ignore_ascii_case(s)) {
            return Ok(*p);
        }
        let bytes = s
            .split(':')
            .map(|b| u8::from_str_radix(b, 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| RadioError::InvalidArgument(format!("unknown modem preset: {}", s)))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for ModemPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::NAMED.iter().find(|(_, p)| p == self) {
            Some((name, _)) => f.write_str(name),
            None => write!(f, "{:02x}:{:02x}:{:02x}", self.0[0], self.0[1], self.0[2]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(d: Duration) -> f64 {
        d.as_secs_f64() * 1000.0
    }

    #[test]
    fn named_presets_decode() {
        let p = ModemPreset::BW125_CR45_SF128;
        assert_eq!(p.bandwidth_hz(), Some(125_000.0));
        assert_eq!(p.spreading_factor(), 7);
        assert_eq!(p.coding_rate_denominator(), 5);
        assert!(p.crc_on());
        assert!(!p.implicit_header());

        let p = ModemPreset::BW125_CR48_SF4096;
        assert_eq!(p.spreading_factor(), 12);
        assert_eq!(p.coding_rate_denominator(), 8);
    }

    #[test]
    fn custom_matches_named() {
        let p = ModemPreset::custom(
            Bandwidth::BW125,
            CodingRate::CR4_5,
            false,
            SpreadingFactor::SF7,
            true,
            false,
        );
        assert_eq!(p, ModemPreset::BW125_CR45_SF128);

        let p = ModemPreset::custom(
            Bandwidth::BW31_25,
            CodingRate::CR4_8,
            false,
            SpreadingFactor::SF9,
            true,
            false,
        );
        assert_eq!(p, ModemPreset::BW31_25_CR48_SF512);
    }

    #[test]
    fn from_slice_requires_three_bytes() {
        assert!(matches!(ModemPreset::from_slice(&[0x72, 0x74]), Err(RadioError::InvalidArgument(_))));
        assert!(matches!(ModemPreset::from_slice(&[0x72, 0x74, 0, 0]), Err(RadioError::InvalidArgument(_))));
        assert_eq!(ModemPreset::from_slice(&[0x92, 0x74, 0x00]).unwrap(), ModemPreset::BW500_CR45_SF128);
    }

    #[test]
    fn parse_names_and_hex() {
        assert_eq!("bw125_cr48_sf4096".parse::<ModemPreset>().unwrap(), ModemPreset::BW125_CR48_SF4096);
        assert_eq!("48:94:00".parse::<ModemPreset>().unwrap(), ModemPreset::BW31_25_CR48_SF512);
        assert!("fast".parse::<ModemPreset>().is_err());
        assert_eq!(ModemPreset::BW500_CR45_SF128.to_string(), "bw500_cr45_sf128");
        assert_eq!(ModemPreset::from_bytes([0x70, 0x64, 0x04]).to_string(), "70:64:04");
    }

    #[test]
    fn airtime_matches_semtech_calculator() {
        // SF7 / 125 kHz / 4/5, explicit header, CRC on, 8 symbol preamble
        let p = ModemPreset::BW125_CR45_SF128;
        assert!((ms(p.airtime(255, 8)) - 399.616).abs() < 0.01);
        assert!((ms(p.airtime(10, 8)) - 41.216).abs() < 0.01);

        assert!((ms(ModemPreset::BW500_CR45_SF128.worst_case_airtime(8)) - 99.904).abs() < 0.01);
        assert!((ms(ModemPreset::BW125_CR48_SF4096.worst_case_airtime(8)) - 11_935.744).abs() < 0.01);
    }
}
