//! Header of one SSDV frame, for inspecting encoded images on the ground
//! side of a bench test.

use std::fmt;

use crate::PACKET_SIZE;

pub const TYPE_NORMAL: u8 = 0x66;
pub const TYPE_NOFEC: u8 = 0x67;

const FLAG_EOI: u8 = 0x04;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: u8,
    pub callsign: String,
    pub image_id: u8,
    pub packet_id: u16,
    pub width: u16,
    pub height: u16,
    /// Set on the final packet of an image.
    pub eoi: bool,
}

impl PacketHeader {
    /// `None` when the frame type byte is not an SSDV type.
    pub fn parse(frame: &[u8; PACKET_SIZE]) -> Option<Self> {
        if frame[0] != TYPE_NORMAL && frame[0] != TYPE_NOFEC {
            return None;
        }
        Some(Self {
            packet_type: frame[0],
            callsign: decode_callsign(u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]])),
            image_id: frame[5],
            packet_id: u16::from_be_bytes([frame[6], frame[7]]),
            width: u16::from(frame[8]) * 16,
            height: u16::from(frame[9]) * 16,
            eoi: frame[10] & FLAG_EOI != 0,
        })
    }
}

impl fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} image {} packet {} {}x{}{}",
            self.callsign,
            self.image_id,
            self.packet_id,
            self.width,
            self.height,
            if self.eoi { " eoi" } else { "" }
        )
    }
}

/// Base-40 callsign, least significant digit first.
pub fn decode_callsign(mut code: u32) -> String {
    if code > 0xf423_ffff {
        return String::new();
    }
    let mut out = String::new();
    while code > 0 {
        let s = (code % 40) as u8;
        out.push(match s {
            0 => '-',
            1..=10 => (b'0' + s - 1) as char,
            11..=13 => '-',
            _ => (b'A' + s - 14) as char,
        });
        code /= 40;
    }
    out
}
