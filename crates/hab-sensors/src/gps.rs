use std::time::Duration;

use anyhow::{Context, Result};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

const MIN_SATS: u32 = 4;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GpsConfig {
    /// "serial" | "file"
    pub source: String,
    pub port: String,
    pub speed: u32,
    /// Per-sentence read timeout.
    pub timeout_s: u64,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self { source: "serial".into(), port: String::new(), speed: 9600, timeout_s: 5 }
    }
}

/// Last known position, in NMEA units (ddmm.mmmm, knots, degrees).
#[derive(Debug, Clone, PartialEq)]
pub struct GpsFix {
    /// hhmmss.ss as sent by the receiver.
    pub time: String,
    /// ddmmyy as sent by the receiver.
    pub date: String,
    pub lat: f64,
    pub ns: char,
    pub lon: f64,
    pub ew: char,
    pub altitude_m: f64,
    pub sats: u32,
    pub heading_deg: f64,
    pub speed: f64,
}

impl Default for GpsFix {
    fn default() -> Self {
        Self {
            time: String::new(),
            date: String::new(),
            lat: 0.0,
            ns: 'N',
            lon: 0.0,
            ew: 'W',
            altitude_m: 0.0,
            sats: 0,
            heading_deg: 0.0,
            speed: 0.0,
        }
    }
}

impl GpsFix {
    pub fn hms(&self) -> Option<(u8, u8, u8)> {
        Some((two_digits(&self.time, 0)?, two_digits(&self.time, 2)?, two_digits(&self.time, 4)?))
    }

    /// (day, month, full year)
    pub fn dmy(&self) -> Option<(u8, u8, i32)> {
        let year = two_digits(&self.date, 4)?;
        Some((two_digits(&self.date, 0)?, two_digits(&self.date, 2)?, i32::from(year) + 2000))
    }

    /// Receiver clock as a UTC timestamp, once both date and time are known.
    pub fn utc(&self) -> Option<OffsetDateTime> {
        let (h, m, s) = self.hms()?;
        let (day, month, year) = self.dmy()?;
        let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
        let time = Time::from_hms(h, m, s).ok()?;
        Some(PrimitiveDateTime::new(date, time).assume_utc())
    }
}

pub enum NmeaSource {
    Serial(BufReader<SerialStream>),
    File(BufReader<File>),
}

impl NmeaSource {
    pub fn serial(dev: &str, baud: u32) -> Result<Self> {
        let port = tokio_serial::new(dev, baud).open_native_async()
            .with_context(|| format!("open serial {}", dev))?;
        Ok(Self::Serial(BufReader::new(port)))
    }

    pub fn file(path: &str) -> Result<Self> {
        let f = std::fs::File::open(path).with_context(|| format!("open nmea file {}", path))?;
        Ok(Self::File(BufReader::new(File::from_std(f))))
    }

    async fn next_line(&mut self) -> Result<String> {
        let mut buf = Vec::with_capacity(96);
        loop {
            buf.clear();
            let n = match self {
                NmeaSource::Serial(r) => r.read_until(b'\n', &mut buf).await?,
                NmeaSource::File(r) => r.read_until(b'\n', &mut buf).await?,
            };
            if n == 0 {
                // EOF on a replay file: wait for more
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }
            // Line noise is common right after power-up.
            return Ok(String::from_utf8_lossy(&buf).trim().to_string());
        }
    }
}

/// NMEA receiver; collects one GGA and one RMC sentence per update.
pub struct GpsReceiver {
    source: NmeaSource,
    read_timeout: Duration,
    fix: GpsFix,
}

impl GpsReceiver {
    pub fn open(cfg: &GpsConfig) -> Result<Self> {
        let source = match cfg.source.as_str() {
            "serial" => NmeaSource::serial(&cfg.port, cfg.speed)?,
            "file" => NmeaSource::file(&cfg.port)?,
            other => anyhow::bail!("unknown gps.source: {}", other),
        };
        Ok(Self::new(source, Duration::from_secs(cfg.timeout_s)))
    }

    pub fn new(source: NmeaSource, read_timeout: Duration) -> Self {
        Self { source, read_timeout, fix: GpsFix::default() }
    }

    pub fn fix(&self) -> &GpsFix {
        &self.fix
    }

    /// Refresh the fix. With too few satellites the time, date and
    /// satellite count are still taken, the position is not.
    pub async fn update(&mut self) -> Result<&GpsFix> {
        let gga = self.read_sentence("GGA").await?;
        let rmc = self.read_sentence("RMC").await?;
        apply_sentences(&mut self.fix, &gga, &rmc)?;
        debug!(
            "gps: {:.4}{} {:.4}{} alt {:.1} m, {} sats",
            self.fix.lat, self.fix.ns, self.fix.lon, self.fix.ew, self.fix.altitude_m, self.fix.sats
        );
        Ok(&self.fix)
    }

    async fn read_sentence(&mut self, kind: &str) -> Result<String> {
        let source = &mut self.source;
        let wait = async {
            loop {
                let line = source.next_line().await?;
                if is_sentence(&line, kind) {
                    return Ok::<_, anyhow::Error>(line);
                }
            }
        };
        tokio::time::timeout(self.read_timeout, wait)
            .await
            .map_err(|_| anyhow::anyhow!("timeout waiting for {} sentence", kind))?
    }
}

/// Two ASCII digits at byte `at`; serial noise yields `None`.
fn two_digits(field: &str, at: usize) -> Option<u8> {
    let d = field.as_bytes().get(at..at + 2)?;
    if !d.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some((d[0] - b'0') * 10 + (d[1] - b'0'))
}

/// `$xxKIND,...` for any talker id.
fn is_sentence(line: &str, kind: &str) -> bool {
    line.starts_with('$') && line.get(3..6) == Some(kind) && line.get(6..7) == Some(",")
}

fn apply_sentences(fix: &mut GpsFix, gga: &str, rmc: &str) -> Result<()> {
    let gga: Vec<&str> = gga.split(',').collect();
    let rmc: Vec<&str> = rmc.split(',').collect();
    anyhow::ensure!(gga.len() > 9 && rmc.len() > 9, "gps parse error, not enough fields");

    let sats: u32 = gga[7].parse().with_context(|| format!("gps satellites field {:?}", gga[7]))?;
    fix.sats = sats;
    fix.time = gga[1].to_string();
    fix.date = rmc[9].to_string();
    anyhow::ensure!(sats >= MIN_SATS, "not enough satellites ({})", sats);

    fix.lat = gga[2].parse().unwrap_or(0.0);
    fix.ns = gga[3].chars().next().unwrap_or('N');
    fix.lon = gga[4].parse().unwrap_or(0.0);
    fix.ew = gga[5].chars().next().unwrap_or('W');
    fix.altitude_m = gga[9].parse().unwrap_or(0.0);
    fix.speed = rmc[7].parse().unwrap_or(0.0);
    fix.heading_deg = rmc[8].parse().unwrap_or(0.0);
    Ok(())
}
