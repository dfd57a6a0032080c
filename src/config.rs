//! Layered settings loader for a sale host.
//!
//! Layers (highest precedence last):
//!   1) Built-in defaults
//!   2) Config file (explicit path or auto-discovered)
//!   3) Environment variables (optionally via .env), prefix `FIXED_SALE__`
//!
//! Amounts are read as decimal strings because `config` stores integers as
//! `i64`, which is too narrow for 18-decimal balances. Environment values are
//! kept as strings for the same reason; numeric and bool fields are converted
//! when deserialized.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config as cfg;
use directories::ProjectDirs;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SaleError;
use crate::ledger::SaleConfig;
use crate::rate::DEFAULT_DECIMALS;
use crate::telemetry::LoggingConfig;
use crate::{Address, AssetId, Balance};

/// 0.01 of an 18-decimal funding asset per allocation unit.
const DEFAULT_RATE: &str = "10000000000000000";
const DEFAULT_BENEFICIARY: &str = "0x0000000000000000000000000000000000000000";

/// Host settings: the sale itself plus logging.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sale: SaleSettings,
    pub telemetry: TelemetrySettings,
}

/// Raw `[sale]` table; see [`Settings::sale_config`] for validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SaleSettings {
    pub allocation_asset: u32,
    pub allocation_decimals: u8,
    /// Hex address, `0x`-prefixed or raw.
    pub beneficiary: String,
    /// Decimal string, funding units per whole allocation unit.
    pub rate_per_unit: String,
    #[serde(with = "humantime_serde")]
    pub claim_delay: Duration,
    pub event_capacity: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// RUST_LOG-like directive, e.g. "info,fixed_sale=debug".
    pub log_filter: String,
    pub json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self { sale: SaleSettings::default(), telemetry: TelemetrySettings::default() }
    }
}

impl Default for SaleSettings {
    fn default() -> Self {
        Self {
            allocation_asset: 0,
            allocation_decimals: DEFAULT_DECIMALS,
            beneficiary: DEFAULT_BENEFICIARY.into(),
            rate_per_unit: DEFAULT_RATE.into(),
            claim_delay: Duration::from_secs(7 * 24 * 3600),
            event_capacity: 1024,
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self { log_filter: "info".into(), json: false }
    }
}

/// Why settings could not be loaded or validated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] cfg::ConfigError),
    #[error("path not found `{0}`")]
    PathNotFound(String),
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
    #[error("invalid amount `{0}`")]
    InvalidAmount(String),
    #[error(transparent)]
    Sale(#[from] SaleError),
}

impl Settings {
    /// Validated, immutable sale parameters.
    pub fn sale_config(&self) -> Result<SaleConfig, ConfigError> {
        let s = &self.sale;
        let beneficiary: Address = s
            .beneficiary
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(s.beneficiary.clone()))?;
        let rate_per_unit: Balance = s
            .rate_per_unit
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAmount(s.rate_per_unit.clone()))?;

        let config = SaleConfig {
            allocation_asset: AssetId(s.allocation_asset),
            beneficiary,
            rate_per_unit,
            claim_delay: s.claim_delay,
            allocation_decimals: s.allocation_decimals,
        };
        // rate and decimals checks live with the converter
        config.converter()?;
        Ok(config)
    }

    /// Logging options for [`crate::telemetry::init`].
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            env_filter: Some(self.telemetry.log_filter.clone()),
            json: self.telemetry.json,
            ..LoggingConfig::default()
        }
    }
}

/// Load settings: defaults → file(s) → environment.
/// Env keys: `FIXED_SALE__SALE__RATE_PER_UNIT=...`, `FIXED_SALE__SALE__CLAIM_DELAY=3d`.
pub fn load(explicit_file: Option<&Path>) -> Result<Settings, ConfigError> {
    let _ = dotenv();

    let mut builder = with_defaults(cfg::Config::builder())?;
    for path in discover_config_files(explicit_file)? {
        builder = builder.add_source(cfg::File::from(path));
    }
    builder = builder.add_source(
        cfg::Environment::with_prefix("FIXED_SALE")
            .prefix_separator("__")
            .separator("__"),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.sale_config()?;
    Ok(settings)
}

fn with_defaults(
    builder: cfg::ConfigBuilder<cfg::builder::DefaultState>,
) -> Result<cfg::ConfigBuilder<cfg::builder::DefaultState>, ConfigError> {
    let d = Settings::default();
    Ok(builder
        .set_default("sale.allocation_asset", d.sale.allocation_asset as u64)?
        .set_default("sale.allocation_decimals", d.sale.allocation_decimals as u64)?
        .set_default("sale.beneficiary", d.sale.beneficiary)?
        .set_default("sale.rate_per_unit", d.sale.rate_per_unit)?
        .set_default("sale.claim_delay", "7d")?
        .set_default("sale.event_capacity", d.sale.event_capacity as u64)?
        .set_default("telemetry.log_filter", d.telemetry.log_filter)?
        .set_default("telemetry.json", d.telemetry.json)?)
}

/// Explicit path if given, otherwise `sale.{toml,yaml,yml,json}` in the
/// platform config dir and then the working directory.
fn discover_config_files(explicit: Option<&Path>) -> Result<Vec<PathBuf>, ConfigError> {
    if let Some(p) = explicit {
        if !p.exists() {
            return Err(ConfigError::PathNotFound(p.display().to_string()));
        }
        return Ok(vec![p.to_path_buf()]);
    }

    let names = ["sale.toml", "sale.yaml", "sale.yml", "sale.json"];
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(pd) = ProjectDirs::from("io", "FixedSale", "fixed-sale") {
        candidates.extend(names.iter().map(|n| pd.config_dir().join(n)));
    }
    candidates.extend(names.iter().map(PathBuf::from));

    Ok(candidates.into_iter().filter(|c| c.exists()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::env;
    use std::io::Write;

    // Environment is process-wide; every test that calls `load` holds this.
    static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

    /// Sets variables for the lifetime of the guard.
    struct EnvVars(Vec<&'static str>);

    impl EnvVars {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            for (k, v) in vars {
                env::set_var(k, v);
            }
            Self(vars.iter().map(|(k, _)| *k).collect())
        }
    }

    impl Drop for EnvVars {
        fn drop(&mut self) {
            for k in &self.0 {
                env::remove_var(k);
            }
        }
    }

    fn write_toml(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = Settings::default().sale_config().unwrap();
        assert_eq!(cfg.rate_per_unit, 10_000_000_000_000_000);
        assert_eq!(cfg.claim_delay, Duration::from_secs(604_800));
        assert_eq!(cfg.beneficiary, Address::ZERO);
        assert_eq!(cfg.allocation_decimals, 18);
    }

    #[test]
    fn file_overrides_defaults() {
        let f = write_toml(
            r#"
            [sale]
            allocation_asset = 7
            beneficiary = "0x0100000000000000000000000000000000000002"
            rate_per_unit = "250000000000000000000"
            claim_delay = "36h"

            [telemetry]
            json = true
            "#,
        );
        let settings = {
            let _env = ENV_LOCK.lock();
            load(Some(f.path())).unwrap()
        };
        let cfg = settings.sale_config().unwrap();
        assert_eq!(cfg.allocation_asset, AssetId(7));
        assert_eq!(cfg.beneficiary.0[0], 0x01);
        assert_eq!(cfg.beneficiary.0[19], 0x02);
        assert_eq!(cfg.rate_per_unit, 250_000_000_000_000_000_000);
        assert_eq!(cfg.claim_delay, Duration::from_secs(36 * 3600));
        assert_eq!(settings.sale.event_capacity, 1024);
        assert!(settings.logging().json);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let f = write_toml("[sale]\nrate_per_unit = \"0\"\n");
        let _env = ENV_LOCK.lock();
        assert!(matches!(
            load(Some(f.path())),
            Err(ConfigError::Sale(SaleError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut s = Settings::default();
        s.sale.beneficiary = "0x1234".into();
        assert!(matches!(s.sale_config(), Err(ConfigError::InvalidAddress(_))));

        let mut s = Settings::default();
        s.sale.rate_per_unit = "0.01".into();
        assert!(matches!(s.sale_config(), Err(ConfigError::InvalidAmount(_))));

        let mut s = Settings::default();
        s.sale.allocation_decimals = 39;
        assert!(matches!(s.sale_config(), Err(ConfigError::Sale(SaleError::InvalidConfig(_)))));
    }

    #[test]
    fn missing_explicit_file() {
        let p = Path::new("/definitely/not/here/sale.toml");
        let _env = ENV_LOCK.lock();
        assert!(matches!(load(Some(p)), Err(ConfigError::PathNotFound(_))));
    }

    #[test]
    fn environment_overrides_file_and_defaults() {
        let f = write_toml(
            r#"
            [sale]
            allocation_asset = 7
            beneficiary = "0x0100000000000000000000000000000000000002"
            rate_per_unit = "250000000000000000000"
            claim_delay = "36h"
            "#,
        );
        let _env = ENV_LOCK.lock();
        let _vars = EnvVars::set(&[
            // wider than i64 and not exact in f64
            ("FIXED_SALE__SALE__RATE_PER_UNIT", "123456789012345678901"),
            // all digits, no 0x prefix
            ("FIXED_SALE__SALE__BENEFICIARY", "0000000000000000000000000000000000000001"),
            ("FIXED_SALE__SALE__CLAIM_DELAY", "3d"),
            ("FIXED_SALE__SALE__ALLOCATION_DECIMALS", "6"),
            ("FIXED_SALE__TELEMETRY__JSON", "true"),
        ]);

        let settings = load(Some(f.path())).unwrap();
        assert_eq!(settings.sale.rate_per_unit, "123456789012345678901");
        assert_eq!(settings.sale.beneficiary, "0000000000000000000000000000000000000001");

        let cfg = settings.sale_config().unwrap();
        assert_eq!(cfg.rate_per_unit, 123_456_789_012_345_678_901);
        let mut expected = [0u8; 20];
        expected[19] = 0x01;
        assert_eq!(cfg.beneficiary, Address(expected));
        assert_eq!(cfg.claim_delay, Duration::from_secs(3 * 24 * 3600));
        assert_eq!(cfg.allocation_decimals, 6);
        // from the file
        assert_eq!(cfg.allocation_asset, AssetId(7));
        // from the defaults
        assert_eq!(settings.sale.event_capacity, 1024);
        assert_eq!(settings.telemetry.log_filter, "info");
        assert!(settings.logging().json);
    }
}
