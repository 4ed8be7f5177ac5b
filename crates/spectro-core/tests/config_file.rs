//! The shipped configuration file loads and matches the defaults.

use spectro_core::config::{ExtractionPolicyKind, SpectroConfig};
use spectro_core::SlitWidth;
use std::path::Path;

#[test]
fn test_shipped_config_matches_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/spectro.toml");
    let config = SpectroConfig::load_from(&path).unwrap();
    config.validate().unwrap();

    let defaults = SpectroConfig::default();
    assert_eq!(config.calibration, defaults.calibration);
    assert_eq!(config.acquisition, defaults.acquisition);
    assert_eq!(config.motion, defaults.motion);
    assert_eq!(config.processing, defaults.processing);
    assert_eq!(config.acquisition.kinetics_policy, ExtractionPolicyKind::PeakAverage);
    assert_eq!(config.motion.default_slit, SlitWidth::Nm2);
}
