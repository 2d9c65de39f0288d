use anyhow::Result;

use crate::capture::{parse_size, CameraConfig};

pub fn check_camera(cfg: &CameraConfig) -> Result<()> {
    anyhow::ensure!(!cfg.callsign.is_empty(), "camera.callsign is empty");
    anyhow::ensure!(cfg.callsign.len() <= 6, "ssdv callsigns are limited to 6 characters");
    anyhow::ensure!(!cfg.ssdv_name.is_empty(), "camera.ssdv_name is empty");
    anyhow::ensure!(!cfg.command.is_empty() && !cfg.encoder.is_empty(), "camera command/encoder not set");
    let (w, h) = parse_size(&cfg.ssdv_size)?;
    // SSDV works on 16x16 MCUs.
    anyhow::ensure!(w % 16 == 0 && h % 16 == 0, "camera.ssdv_size must be a multiple of 16");
    anyhow::ensure!(cfg.image_dir.is_dir(), "image dir {} does not exist", cfg.image_dir.display());
    Ok(())
}
