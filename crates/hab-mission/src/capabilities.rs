//! What the scheduler needs from the rest of the payload, and the board
//! implementations of each.
#![allow(async_fn_in_trait)]

use std::path::PathBuf;

use anyhow::Result;

use hab_radio::{RadioError, RadioLink, RegisterBus};
use hab_sensors::led::StatusLed;
use hab_sensors::BoardSensors;
use hab_ssdv::SsdvCamera;
use hab_telemetry::SensorSnapshot;

use crate::datalog::DataLog;

pub trait Downlink {
    async fn send(&mut self, frame: &[u8]) -> Result<(), RadioError>;
    async fn wait_for_tx_complete(&mut self) -> Result<bool, RadioError>;
    fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError>;
}

pub trait SensorSource {
    async fn read_all(&mut self) -> Result<SensorSnapshot>;
}

pub trait ImageSource {
    /// Capture and encode one image; returns the encoded file.
    async fn capture(&mut self) -> Result<PathBuf>;
}

pub trait LogSink {
    async fn append(&mut self, line: &str) -> Result<()>;
}

/// Fire-and-forget.
pub trait StatusIndicator {
    fn blink(&self);
}

impl<B: RegisterBus> Downlink for RadioLink<B> {
    async fn send(&mut self, frame: &[u8]) -> Result<(), RadioError> {
        RadioLink::send(self, frame).await
    }

    async fn wait_for_tx_complete(&mut self) -> Result<bool, RadioError> {
        RadioLink::wait_for_tx_complete(self).await
    }

    fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError> {
        RadioLink::set_tx_power(self, dbm)
    }
}

impl SensorSource for BoardSensors {
    async fn read_all(&mut self) -> Result<SensorSnapshot> {
        BoardSensors::read_all(self).await
    }
}

impl ImageSource for SsdvCamera {
    async fn capture(&mut self) -> Result<PathBuf> {
        SsdvCamera::capture(self).await
    }
}

impl LogSink for DataLog {
    async fn append(&mut self, line: &str) -> Result<()> {
        DataLog::append(self, line).await
    }
}

impl StatusIndicator for StatusLed {
    fn blink(&self) {
        StatusLed::blink(self)
    }
}
