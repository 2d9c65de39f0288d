use anyhow::Result;

use crate::{frequency_to_register, RadioConfig, MAX_TX_POWER_DBM, MIN_TX_POWER_DBM};

pub fn check_radio(cfg: &RadioConfig) -> Result<()> {
    anyhow::ensure!(
        (137.0..=1020.0).contains(&cfg.frequency_mhz),
        "radio.frequency_mhz should be 137..1020"
    );
    frequency_to_register(cfg.frequency_mhz)?;
    anyhow::ensure!(
        (MIN_TX_POWER_DBM..=MAX_TX_POWER_DBM).contains(&cfg.tx_power_dbm),
        "radio tx power should be {}..{} dBm",
        MIN_TX_POWER_DBM,
        MAX_TX_POWER_DBM
    );
    anyhow::ensure!(cfg.preamble_symbols >= 6, "radio.preamble_symbols must be >= 6");
    anyhow::ensure!(cfg.preset.bandwidth_hz().is_some(), "radio.preset uses a reserved bandwidth code");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes() {
        check_radio(&RadioConfig::default()).unwrap();
    }

    #[test]
    fn rejects_out_of_band_and_overpower() {
        let cfg = RadioConfig { frequency_mhz: 2400.0, ..Default::default() };
        assert!(check_radio(&cfg).is_err());
        let cfg = RadioConfig { tx_power_dbm: 30, ..Default::default() };
        assert!(check_radio(&cfg).is_err());
        let cfg = RadioConfig { preamble_symbols: 4, ..Default::default() };
        assert!(check_radio(&cfg).is_err());
    }
}
