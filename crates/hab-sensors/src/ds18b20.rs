use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const W1_DEVICES: &str = "/sys/bus/w1/devices";

/// DS18B20 probe read through the w1-therm sysfs interface.
#[derive(Debug, Clone)]
pub struct Ds18b20 {
    path: PathBuf,
}

impl Ds18b20 {
    /// `addr` is the 1-Wire id, e.g. `28-0316a2795cff`.
    pub fn new(addr: &str) -> Self {
        Self::with_path(Path::new(W1_DEVICES).join(addr).join("w1_slave"))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Degrees Celsius.
    pub fn read(&self) -> Result<f64> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read temperature probe {}", self.path.display()))?;
        parse_w1_slave(&content)
    }
}

/// ```text
/// 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
/// 72 01 4b 46 7f ff 0e 10 57 t=23125
/// ```
fn parse_w1_slave(content: &str) -> Result<f64> {
    let mut lines = content.lines();
    let status = lines.next().context("w1_slave data is empty")?;
    let data = lines.next().context("w1_slave data, not enough lines")?;
    anyhow::ensure!(status.trim_end().ends_with("YES"), "w1_slave crc check failed");

    let raw = data
        .split_whitespace()
        .find_map(|f| f.strip_prefix("t="))
        .context("w1_slave data has no t= field")?;
    let millidegrees: i32 = raw.parse().context("parse temperature value")?;

    Ok(millidegrees as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_millidegrees() {
        let s = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";
        assert_eq!(parse_w1_slave(s).unwrap(), 23.125);
        let s = "5e ff 4b 46 7f ff 02 10 d4 : crc=d4 YES\n5e ff 4b 46 7f ff 02 10 d4 t=-10125\n";
        assert_eq!(parse_w1_slave(s).unwrap(), -10.125);
    }

    #[test]
    fn rejects_bad_crc_and_short_data() {
        let s = "72 01 4b 46 7f ff 0e 10 57 : crc=00 NO\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";
        assert!(parse_w1_slave(s).is_err());
        assert!(parse_w1_slave("72 01 : crc=57 YES\n").is_err());
        assert!(parse_w1_slave("").is_err());
    }

    #[test]
    fn reads_from_sysfs_path() {
        let path = std::env::temp_dir().join(format!("hab-w1-{}", std::process::id()));
        std::fs::write(&path, "aa : crc=aa YES\naa t=5400\n").unwrap();
        let probe = Ds18b20::with_path(&path);
        assert_eq!(probe.read().unwrap(), 5.4);
        std::fs::remove_file(path).ok();

        let missing = Ds18b20::new("28-000000000000");
        assert!(missing.path().ends_with("28-000000000000/w1_slave"));
    }
}
