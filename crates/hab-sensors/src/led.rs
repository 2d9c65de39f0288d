use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use rppal::gpio::{Gpio, OutputPin};

const BLINK: Duration = Duration::from_millis(1);

/// Status LED; each blink runs on its own task and is never awaited.
#[derive(Clone)]
pub struct StatusLed {
    pin: Arc<Mutex<OutputPin>>,
}

impl StatusLed {
    pub fn open(gpio: &Gpio, pin: u8) -> Result<Self> {
        let pin = gpio.get(pin).with_context(|| format!("led pin {}", pin))?.into_output_low();
        Ok(Self { pin: Arc::new(Mutex::new(pin)) })
    }

    pub fn blink(&self) {
        let pin = self.pin.clone();
        tokio::spawn(async move {
            if let Ok(mut p) = pin.lock() {
                p.set_high();
            }
            tokio::time::sleep(BLINK).await;
            if let Ok(mut p) = pin.lock() {
                p.set_low();
            }
        });
    }
}
