use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use hab_mission::datalog::timestamped_name;
use hab_mission::{doctor as mission_doctor, DataLog, DownlinkScheduler, MissionConfig};
use hab_radio::{doctor as radio_doctor, ModemPreset, RadioConfig, RadioLink, SpiRegisterBus, TxWait};
use hab_sensors::led::StatusLed;
use hab_sensors::{doctor as sensors_doctor, BoardSensors, SensorsConfig};
use hab_ssdv::{doctor as ssdv_doctor, CameraConfig, ImageTransferSession, PacketHeader, SsdvCamera};
use hab_telemetry::TelemetryEncoder;

#[derive(Debug, Parser)]
#[command(name = "hab", version, about = "High-altitude balloon flight software: LoRa telemetry and SSDV downlink")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    /// Fly: beacons and SSDV images until interrupted.
    Run,
    /// Configure the radio, send a single beacon and exit.
    Beacon,
    Ssdv { #[command(subcommand)] cmd: SsdvCmd },
    Config { #[command(subcommand)] cmd: ConfigCmd },
}

#[derive(Debug, Subcommand)]
enum SsdvCmd {
    /// List the packets of an encoded image.
    Inspect { file: PathBuf },
}

#[derive(Debug, Subcommand)]
enum ConfigCmd {
    /// Write a default config file at --config.
    Init,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct Config {
    mission: MissionConfig,
    radio: RadioCfg,
    camera: CameraConfig,
    paths: PathsCfg,
    #[serde(flatten)]
    sensors: SensorsConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct RadioCfg {
    frequency_mhz: f64,
    low_power_dbm: i8,
    high_power_dbm: i8,
    preamble_symbols: u16,
    /// Preset name or three hex bytes, e.g. `72:74:00`.
    preset: String,
    spi_bus: u8,
    spi_cs: u8,
    spi_clock_hz: u32,
    /// `auto`, `unbounded`, or a timeout in ms.
    tx_wait: String,
}

impl Default for RadioCfg {
    fn default() -> Self {
        Self {
            frequency_mhz: 868.5,
            low_power_dbm: 5,
            high_power_dbm: 23,
            preamble_symbols: 8,
            preset: ModemPreset::default().to_string(),
            spi_bus: 0,
            spi_cs: 0,
            spi_clock_hz: 5_000_000,
            tx_wait: "auto".into(),
        }
    }
}

impl RadioCfg {
    fn link_config(&self, tx_power_dbm: i8) -> Result<RadioConfig> {
        Ok(RadioConfig {
            frequency_mhz: self.frequency_mhz,
            tx_power_dbm,
            preamble_symbols: self.preamble_symbols,
            preset: self.preset.parse().context("radio.preset")?,
        })
    }

    fn tx_wait(&self) -> Result<TxWait> {
        match self.tx_wait.trim() {
            "auto" => Ok(TxWait::Auto),
            "unbounded" => Ok(TxWait::Unbounded),
            ms => {
                let ms: u64 = ms
                    .parse()
                    .with_context(|| format!("radio.tx_wait {:?} is not auto, unbounded or a timeout in ms", ms))?;
                anyhow::ensure!(ms > 0, "radio.tx_wait must be positive");
                Ok(TxWait::Fixed(Duration::from_millis(ms)))
            }
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct PathsCfg {
    /// Mission log and data log directory.
    main_dir: String,
    log_prefix: String,
}

impl Default for PathsCfg {
    fn default() -> Self {
        Self { main_dir: String::new(), log_prefix: "mission".into() }
    }
}

const CONFIG_HEADER: &str = "\
# hab flight configuration.
# Fill in mission.id, mission.subid, mission.message, mission.separator,
# paths.main_dir, gps.port and the temp probe ids before flying;
# `hab --config <file> doctor` refuses the unedited defaults.

";

type Mission = DownlinkScheduler<RadioLink<SpiRegisterBus>, BoardSensors, SsdvCamera, DataLog, StatusLed>;

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config {} (create one with `hab --config {} config init`)", path, path))?;
    toml::from_str(&s).context("parse config toml")
}

fn init_logging(mission_log: Option<std::fs::File>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = mission_log.map(|f| fmt::layer().with_ansi(false).with_writer(Mutex::new(f)));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

fn open_mission_log(paths: &PathsCfg) -> Result<std::fs::File> {
    let path = Path::new(&paths.main_dir).join(timestamped_name(&paths.log_prefix, OffsetDateTime::now_utc()));
    std::fs::File::create(&path).with_context(|| format!("create mission log {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Config { cmd: ConfigCmd::Init } = cli.cmd {
        init_logging(None);
        return config_init(&cli.config);
    }

    let cfg = load_config(&cli.config)?;
    if matches!(cli.cmd, Command::Run | Command::Beacon) {
        preflight(&cfg)?;
    }
    let mission_log = match cli.cmd {
        Command::Run => Some(open_mission_log(&cfg.paths)?),
        _ => None,
    };
    init_logging(mission_log);

    match cli.cmd {
        Command::Doctor => doctor(&cfg).await?,
        Command::Run => run(&cfg).await?,
        Command::Beacon => beacon(&cfg).await?,
        Command::Ssdv { cmd } => ssdv_cmd(cmd)?,
        Command::Config { .. } => {}
    }
    Ok(())
}

fn config_init(path: &str) -> Result<()> {
    anyhow::ensure!(!Path::new(path).exists(), "{} already exists", path);
    let body = toml::to_string(&Config::default()).context("serialize default config")?;
    std::fs::write(path, format!("{}{}", CONFIG_HEADER, body)).with_context(|| format!("write {}", path))?;
    info!("config: default written to {}, edit it before flying", path);
    Ok(())
}

fn check_config(cfg: &Config) -> Result<()> {
    mission_doctor::check_mission(&cfg.mission, cfg.radio.high_power_dbm, cfg.radio.low_power_dbm)?;
    radio_doctor::check_radio(&cfg.radio.link_config(cfg.radio.low_power_dbm)?)?;
    radio_doctor::check_radio(&cfg.radio.link_config(cfg.radio.high_power_dbm)?)?;
    cfg.radio.tx_wait()?;
    sensors_doctor::check_sensors(&cfg.sensors)?;
    ssdv_doctor::check_camera(&cfg.camera)?;

    anyhow::ensure!(!cfg.paths.main_dir.is_empty(), "paths.main_dir is empty");
    anyhow::ensure!(Path::new(&cfg.paths.main_dir).is_dir(), "paths.main_dir {} is not a directory", cfg.paths.main_dir);
    anyhow::ensure!(!cfg.paths.log_prefix.is_empty(), "paths.log_prefix is empty");
    Ok(())
}

/// Nothing is transmitted from a config that fails the doctor checks.
fn preflight(cfg: &Config) -> Result<()> {
    check_config(cfg).context("please edit the configuration file (see `hab doctor`)")
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    check_config(cfg)?;
    info!("doctor: OK");
    Ok(())
}

fn open_radio(cfg: &RadioCfg) -> Result<RadioLink<SpiRegisterBus>> {
    let bus = SpiRegisterBus::open(cfg.spi_bus, cfg.spi_cs, cfg.spi_clock_hz).context("open radio spi bus")?;
    let mut radio = RadioLink::new(bus).with_tx_wait(cfg.tx_wait()?);
    radio.configure(&cfg.link_config(cfg.low_power_dbm)?).context("configure radio")?;
    info!("radio: {} MHz, preset {}", cfg.frequency_mhz, cfg.preset);
    Ok(radio)
}

async fn build_mission(cfg: &Config) -> Result<Mission> {
    let radio = open_radio(&cfg.radio)?;

    let gpio = rppal::gpio::Gpio::new().context("open gpio")?;
    let led = StatusLed::open(&gpio, cfg.sensors.pins.led)?;
    let mut sensors = BoardSensors::open(&cfg.sensors, &gpio).await?;

    // Only reported; the system clock is left to the OS.
    match sensors.update_gps().await {
        Ok(fix) => match fix.utc() {
            Some(t) => info!("gps time {}", t),
            None => warn!("gps fix carries no time"),
        },
        Err(e) => warn!("error updating gps: {:#}", e),
    }

    let camera = SsdvCamera::new(cfg.camera.clone());
    let datalog = DataLog::create(Path::new(&cfg.paths.main_dir), "datalog_").await?;
    info!("datalog: {}", datalog.path().display());

    let encoder = TelemetryEncoder::new(cfg.mission.id.as_str(), cfg.mission.message.as_str(), cfg.mission.separator.as_str());
    let sched = cfg.mission.scheduler(cfg.radio.high_power_dbm, cfg.radio.low_power_dbm);
    Ok(DownlinkScheduler::new(sched, radio, sensors, camera, datalog, led, encoder))
}

async fn shutdown_signal() -> Result<()> {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("install SIGTERM handler")?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r.context("wait for ctrl-c")?,
        _ = term.recv() => {}
    }
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    info!("run: starting {} ({})", cfg.mission.id, cfg.mission.subid);
    let mut mission = build_mission(cfg).await?;

    tokio::select! {
        _ = mission.run() => {}
        r = shutdown_signal() => {
            r?;
            info!("run: shutdown requested");
        }
    }

    if let Err(e) = mission.radio_mut().set_sleep() {
        warn!("radio: could not enter sleep: {:#}", e);
    }
    info!(
        "run: {} beacons, {} image packets sent",
        mission.state().beacons_sent,
        mission.state().image_packets_sent
    );
    Ok(())
}

async fn beacon(cfg: &Config) -> Result<()> {
    let mut mission = build_mission(cfg).await?;
    let sent = mission.beacon_once().await;
    if let Err(e) = mission.radio_mut().set_sleep() {
        warn!("radio: could not enter sleep: {:#}", e);
    }
    let record = sent?;
    info!("beacon: sent, {} sats, {:.1} m", record.sensors.sats, record.sensors.altitude_m);
    Ok(())
}

fn ssdv_cmd(cmd: SsdvCmd) -> Result<()> {
    match cmd {
        SsdvCmd::Inspect { file } => {
            let session = ImageTransferSession::open(&file).with_context(|| format!("open {}", file.display()))?;
            println!("{}: {} packets", file.display(), session.packet_count());
            for i in 0..session.packet_count() {
                let packet = session.get_packet(i)?;
                match PacketHeader::parse(&packet) {
                    Some(h) => println!("{:4} {}", i, h),
                    None => println!("{:4} not an ssdv packet (type {:#04x})", i, packet[0]),
                }
            }
            Ok(())
        }
    }
}
