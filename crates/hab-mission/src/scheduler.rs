use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use hab_ssdv::{ImageTransferSession, TransportError};
use hab_telemetry::{TelemetryEncoder, TelemetryRecord};

use crate::capabilities::{Downlink, ImageSource, LogSink, SensorSource, StatusIndicator};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Beacons per cycle before the image.
    pub packet_repeat: u32,
    /// Pause after each beacon, and the longest the image may hold off a
    /// beacon.
    pub packet_delay: Duration,
    /// Pause between image packets so the ground decoder keeps up.
    pub inter_packet_delay: Duration,
    pub high_power_dbm: i8,
    pub low_power_dbm: i8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            packet_repeat: 3,
            packet_delay: Duration::from_secs(3),
            inter_packet_delay: Duration::from_millis(100),
            high_power_dbm: 23,
            low_power_dbm: 5,
        }
    }
}

/// Running totals across cycles.
#[derive(Debug, Clone, Default)]
pub struct DownlinkCycleState {
    pub beacons_sent: u64,
    pub image_packets_sent: u64,
    pub last_beacon: Option<Instant>,
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub beacons_sent: u32,
    pub beacons_failed: u32,
    pub image_packets: u64,
    pub packets_sent: u64,
    pub packets_failed: u64,
    pub image_aborted: bool,
}

/// The mission loop: `packet_repeat` beacons, then one image, with beacons
/// interleaved whenever the image has held them off for `packet_delay`.
/// Nothing that fails inside a cycle ends the loop.
pub struct DownlinkScheduler<R, S, I, L, St> {
    cfg: SchedulerConfig,
    radio: R,
    sensors: S,
    images: I,
    log: L,
    led: St,
    encoder: TelemetryEncoder,
    state: DownlinkCycleState,
    high_power: Option<bool>,
}

impl<R, S, I, L, St> DownlinkScheduler<R, S, I, L, St>
where
    R: Downlink,
    S: SensorSource,
    I: ImageSource,
    L: LogSink,
    St: StatusIndicator,
{
    pub fn new(cfg: SchedulerConfig, radio: R, sensors: S, images: I, log: L, led: St, encoder: TelemetryEncoder) -> Self {
        Self { cfg, radio, sensors, images, log, led, encoder, state: DownlinkCycleState::default(), high_power: None }
    }

    pub fn state(&self) -> &DownlinkCycleState {
        &self.state
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub async fn run(&mut self) {
        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            let s = self.run_cycle().await;
            info!(
                "cycle {}: beacons {}/{} ok, image packets {}/{} ok{}",
                cycle,
                s.beacons_sent,
                s.beacons_sent + s.beacons_failed,
                s.packets_sent,
                s.image_packets,
                if s.image_aborted { ", image aborted" } else { "" }
            );
        }
    }

    pub async fn run_cycle(&mut self) -> CycleStats {
        let mut stats = CycleStats::default();

        for _ in 0..self.cfg.packet_repeat {
            match self.sample().await {
                Ok(record) => {
                    match self.transmit_beacon(&record).await {
                        Ok(()) => stats.beacons_sent += 1,
                        Err(e) => {
                            stats.beacons_failed += 1;
                            warn!("problem sending telemetry: {:#}", e);
                        }
                    }
                    let line = self.encoder.to_archive_string(&record);
                    if let Err(e) = self.log.append(&line).await {
                        warn!("problem writing datalog: {:#}", e);
                    }
                }
                Err(e) => {
                    stats.beacons_failed += 1;
                    warn!("error updating telemetry: {:#}", e);
                }
            }
            sleep(self.cfg.packet_delay).await;
        }

        self.image_phase(&mut stats).await;
        sleep(self.cfg.packet_delay).await;
        stats
    }

    /// Sample, send and archive a single beacon.
    pub async fn beacon_once(&mut self) -> Result<TelemetryRecord> {
        let record = self.sample().await?;
        self.transmit_beacon(&record).await?;
        let line = self.encoder.to_archive_string(&record);
        self.log.append(&line).await?;
        Ok(record)
    }

    async fn sample(&mut self) -> Result<TelemetryRecord> {
        let snapshot = self.sensors.read_all().await.context("read sensors")?;
        self.retune(snapshot.high_power);
        Ok(self.encoder.update(snapshot))
    }

    async fn transmit_beacon(&mut self, record: &TelemetryRecord) -> Result<()> {
        let wire = self.encoder.to_wire_string(record);
        info!("sending telemetry packet");
        self.transmit(wire.as_bytes()).await.context("telemetry")?;
        self.state.beacons_sent += 1;
        self.state.last_beacon = Some(Instant::now());
        info!("telemetry packet sent");
        Ok(())
    }

    async fn transmit(&mut self, frame: &[u8]) -> Result<()> {
        self.radio.send(frame).await.context("send")?;
        self.radio.wait_for_tx_complete().await.context("wait for tx")?;
        self.led.blink();
        Ok(())
    }

    fn retune(&mut self, high: bool) {
        if self.high_power == Some(high) {
            return;
        }
        let dbm = if high { self.cfg.high_power_dbm } else { self.cfg.low_power_dbm };
        match self.radio.set_tx_power(dbm) {
            Ok(()) => {
                info!("radio: tx power {} dBm ({} power)", dbm, if high { "high" } else { "low" });
                self.high_power = Some(high);
            }
            Err(e) => warn!("radio: could not set tx power: {:#}", e),
        }
    }

    async fn image_phase(&mut self, stats: &mut CycleStats) {
        let path = match self.images.capture().await {
            Ok(p) => p,
            Err(e) => {
                warn!("problem sending SSDV: {:#}", e);
                stats.image_aborted = true;
                return;
            }
        };
        let session = match ImageTransferSession::open(&path) {
            Ok(s) => s,
            Err(e) => {
                warn!("problem opening SSDV image {}: {:#}", path.display(), e);
                stats.image_aborted = true;
                return;
            }
        };

        let n = session.packet_count();
        stats.image_packets = n;
        if n == 0 {
            warn!("SSDV image {} has no packets", path.display());
            stats.image_aborted = true;
            return;
        }
        info!("sending SSDV picture, {} packets", n);

        let mut last_beacon = Instant::now();
        for i in 0..n {
            match session.get_packet(i) {
                Ok(packet) => match self.transmit(&packet).await {
                    Ok(()) => {
                        stats.packets_sent += 1;
                        self.state.image_packets_sent += 1;
                        info!("SSDV sent packet {}/{}", i + 1, n);
                    }
                    Err(e) => {
                        stats.packets_failed += 1;
                        warn!("SSDV packet {}: {:#}", i, e);
                    }
                },
                Err(e @ (TransportError::NoPackets | TransportError::IndexOutOfRange { .. })) => {
                    warn!("SSDV image abandoned: {}", e);
                    stats.image_aborted = true;
                    return;
                }
                Err(e) => {
                    stats.packets_failed += 1;
                    warn!("SSDV packet {}: {}", i, e);
                }
            }

            // Keep telemetry flowing during long transfers.
            if last_beacon.elapsed() > self.cfg.packet_delay {
                let sent = match self.sample().await {
                    Ok(record) => self.transmit_beacon(&record).await,
                    Err(e) => Err(e),
                };
                match sent {
                    Ok(()) => {
                        stats.beacons_sent += 1;
                        last_beacon = Instant::now();
                    }
                    Err(e) => {
                        stats.beacons_failed += 1;
                        warn!("interleaved telemetry failed: {:#}", e);
                    }
                }
            }

            sleep(self.cfg.inter_packet_delay).await;
        }
        info!("SSDV image, {} packets sent", stats.packets_sent);
    }
}
