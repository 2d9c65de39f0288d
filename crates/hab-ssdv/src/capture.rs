use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CameraConfig {
    /// Still capture tool (`rpicam-still`, or `libcamera-still` on older images).
    pub command: String,
    /// SSDV encoder binary.
    pub encoder: String,
    /// Callsign embedded in every SSDV packet.
    pub callsign: String,
    pub image_dir: PathBuf,
    /// File name of the downlink-sized JPEG; the binary gets `.bin` appended.
    pub ssdv_name: String,
    /// `WIDTHxHEIGHT` of the downlink-sized JPEG.
    pub ssdv_size: String,
    pub rotate: bool,
    /// Capture timeout handed to the camera tool, ms.
    pub timeout_ms: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            command: "rpicam-still".into(),
            encoder: "ssdv".into(),
            callsign: String::new(),
            image_dir: PathBuf::from("images"),
            ssdv_name: "ssdv.jpg".into(),
            ssdv_size: "320x240".into(),
            rotate: true,
            timeout_ms: 1000,
        }
    }
}

/// Parse `WIDTHxHEIGHT`.
pub fn parse_size(s: &str) -> Result<(u32, u32)> {
    let (w, h) = s.split_once('x').with_context(|| format!("image size {:?} is not WIDTHxHEIGHT", s))?;
    let w = w.trim().parse().with_context(|| format!("image width in {:?}", s))?;
    let h = h.trim().parse().with_context(|| format!("image height in {:?}", s))?;
    anyhow::ensure!(w > 0 && h > 0, "image size {:?} must be non-zero", s);
    Ok((w, h))
}

/// Takes the archive shot and the downlink shot, then runs the SSDV encoder.
pub struct SsdvCamera {
    cfg: CameraConfig,
    number: u8,
}

impl SsdvCamera {
    pub fn new(cfg: CameraConfig) -> Self {
        Self { cfg, number: 0 }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.cfg
    }

    /// Image number for the next capture; wraps after 255.
    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn ssdv_jpeg(&self) -> PathBuf {
        self.cfg.image_dir.join(&self.cfg.ssdv_name)
    }

    pub fn ssdv_binary(&self) -> PathBuf {
        self.cfg.image_dir.join(format!("{}.bin", self.cfg.ssdv_name))
    }

    fn archive_path(&self, now: OffsetDateTime) -> PathBuf {
        let stamp = now.format(&Rfc3339).unwrap_or_else(|_| now.unix_timestamp().to_string());
        self.cfg.image_dir.join(format!("{}-{}-{}.jpg", self.cfg.callsign, stamp, self.number))
    }

    fn still_args(&self, out: &Path, size: Option<(u32, u32)>) -> Vec<String> {
        let mut args = vec!["-n".to_string(), "-t".to_string(), self.cfg.timeout_ms.to_string()];
        if self.cfg.rotate {
            args.extend(["--rotation".to_string(), "180".to_string()]);
        }
        if let Some((w, h)) = size {
            args.extend(["--width".to_string(), w.to_string(), "--height".to_string(), h.to_string()]);
        }
        args.extend(["-o".to_string(), out.display().to_string()]);
        args
    }

    fn encode_args(&self, number: u8) -> Vec<String> {
        vec![
            "-e".to_string(),
            "-c".to_string(),
            self.cfg.callsign.clone(),
            "-i".to_string(),
            number.to_string(),
            self.ssdv_jpeg().display().to_string(),
            self.ssdv_binary().display().to_string(),
        ]
    }

    /// Full pipeline; returns the SSDV binary ready for
    /// [`ImageTransferSession::open`](crate::ImageTransferSession::open).
    pub async fn capture(&mut self) -> Result<PathBuf> {
        let archive = self.archive_path(OffsetDateTime::now_utc());
        run(&self.cfg.command, &self.still_args(&archive, None)).await.context("archive shot")?;
        info!("camera: picture shot {}", archive.display());

        // Only advance once a picture exists, so numbers match archived files.
        let number = self.number;
        self.number = self.number.wrapping_add(1);

        let size = parse_size(&self.cfg.ssdv_size)?;
        let small = self.ssdv_jpeg();
        run(&self.cfg.command, &self.still_args(&small, Some(size))).await.context("ssdv shot")?;
        info!("camera: ssdv picture shot {}", small.display());

        run(&self.cfg.encoder, &self.encode_args(number)).await.context("ssdv encode")?;
        let bin = self.ssdv_binary();
        debug!("camera: encoded image {} into {}", number, bin.display());
        Ok(bin)
    }
}

async fn run(program: &str, args: &[String]) -> Result<()> {
    debug!("camera: {} {}", program, args.join(" "));
    let out = Command::new(program).args(args).output().await.with_context(|| format!("run {}", program))?;
    anyhow::ensure!(
        out.status.success(),
        "{} failed ({}): {}",
        program,
        out.status,
        String::from_utf8_lossy(&out.stderr).trim()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn camera() -> SsdvCamera {
        SsdvCamera::new(CameraConfig {
            callsign: "EKI2".into(),
            image_dir: PathBuf::from("/data/img"),
            ..Default::default()
        })
    }

    #[test]
    fn size_parsing() {
        assert_eq!(parse_size("320x240").unwrap(), (320, 240));
        assert!(parse_size("320").is_err());
        assert!(parse_size("0x240").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn archive_name_carries_callsign_time_and_number() {
        let cam = camera();
        let p = cam.archive_path(datetime!(2024-07-14 09:05:03 UTC));
        assert_eq!(p, PathBuf::from("/data/img/EKI2-2024-07-14T09:05:03Z-0.jpg"));
    }

    #[test]
    fn still_and_encoder_arguments() {
        let cam = camera();
        let args = cam.still_args(Path::new("/data/img/ssdv.jpg"), Some((320, 240)));
        assert_eq!(
            args,
            ["-n", "-t", "1000", "--rotation", "180", "--width", "320", "--height", "240", "-o", "/data/img/ssdv.jpg"]
        );
        let args = cam.encode_args(7);
        assert_eq!(args, ["-e", "-c", "EKI2", "-i", "7", "/data/img/ssdv.jpg", "/data/img/ssdv.jpg.bin"]);
    }

    #[tokio::test]
    async fn failed_capture_keeps_image_number() {
        let mut cam = SsdvCamera::new(CameraConfig {
            command: "/nonexistent/rpicam-still".into(),
            image_dir: std::env::temp_dir(),
            ..Default::default()
        });
        assert!(cam.capture().await.is_err());
        assert_eq!(cam.number(), 0);
    }
}
