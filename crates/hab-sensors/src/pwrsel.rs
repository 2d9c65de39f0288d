use anyhow::{Context, Result};
use rppal::gpio::{Gpio, InputPin};

/// Jumper selecting high or low transmit power. Pulled up, so an open
/// jumper means high power.
pub struct PowerSelect {
    pin: InputPin,
}

impl PowerSelect {
    pub fn open(gpio: &Gpio, pin: u8) -> Result<Self> {
        let pin = gpio.get(pin).with_context(|| format!("power select pin {}", pin))?.into_input_pullup();
        Ok(Self { pin })
    }

    pub fn is_high_power(&self) -> bool {
        self.pin.is_high()
    }
}
