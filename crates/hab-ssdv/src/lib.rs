//! SSDV image downlink: the encoded image file is a run of 256-byte blocks,
//! each one radio frame. Byte 0 of a block is the sync byte, which LoRa
//! does not need, so frames carry bytes 1..256.

pub mod capture;
pub mod doctor;
pub mod header;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use capture::{CameraConfig, SsdvCamera};
pub use header::PacketHeader;

pub const BLOCK_SIZE: u64 = 256;
pub const PACKET_SIZE: usize = 255;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("image has no packets")]
    NoPackets,
    #[error("packet {index} out of range ({count} packets)")]
    IndexOutOfRange { index: u64, count: u64 },
    #[error("image read: {0}")]
    Io(#[from] std::io::Error),
}

/// One encoded image, opened after it was produced. The packet count is
/// taken once, at open.
#[derive(Debug, Clone)]
pub struct ImageTransferSession {
    path: PathBuf,
    packet_count: u64,
}

impl ImageTransferSession {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        let size = std::fs::metadata(&path)?.len();
        let packet_count = size / BLOCK_SIZE;
        debug!("ssdv: {} is {} bytes, {} packets", path.display(), size, packet_count);
        Ok(Self { path, packet_count })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole blocks only; a trailing partial block is never sent.
    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Frame `index`: the 255 bytes after the sync byte of block `index`.
    ///
    /// The bound check admits `index == packet_count`, which then reads
    /// past the last whole block and fails with `Io` at end of file.
    pub fn get_packet(&self, index: u64) -> Result<[u8; PACKET_SIZE], TransportError> {
        if self.packet_count == 0 {
            return Err(TransportError::NoPackets);
        }
        if index > self.packet_count {
            return Err(TransportError::IndexOutOfRange { index, count: self.packet_count });
        }

        let mut f = File::open(&self.path)?;
        f.seek(SeekFrom::Start(index * BLOCK_SIZE + 1))?;
        let mut buf = [0u8; PACKET_SIZE];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }
}
