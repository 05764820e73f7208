use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use dotenvy::dotenv;
use tracing::info;

/// Application-level constants.
pub const APP_NAME: &str = "Wardline";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime configuration, environment-driven with working defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Directory holding the SQLite database file.
    pub data_dir: PathBuf,

    /// Default and maximum beacon durations, seconds.
    pub beacon_default_secs: u32,
    pub beacon_max_secs: u32,
    /// Default extension length, seconds.
    pub beacon_extend_secs: u32,
    /// Interval between expiry sweeps, seconds.
    pub sweep_interval_secs: u64,

    /// Delay before the simulated notification dispatch fires, seconds.
    pub dispatch_delay_secs: u64,

    /// Default and maximum nearby-search radius, meters.
    pub nearby_default_radius_m: f64,
    pub nearby_max_radius_m: f64,

    /// Rate limits: requests per window, per account and action.
    pub rate_default_limit: u32,
    pub rate_default_window_secs: u64,
    /// Tighter cap for alert-producing actions (SOS, beacon activation).
    pub rate_alert_limit: u32,
    pub rate_alert_window_secs: u64,

    /// Failed-login lockout.
    pub login_max_failures: u32,
    pub login_lockout_secs: u64,

    /// Bearer session lifetime, seconds.
    pub token_ttl_secs: u64,
}

impl AppConfig {
    pub fn load() -> Self {
        dotenv().ok();

        Self {
            bind_addr: try_load("WARDLINE_BIND", "0.0.0.0"),
            port: try_load("WARDLINE_PORT", "8080"),
            data_dir: env::var("WARDLINE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir()),
            beacon_default_secs: try_load("WARDLINE_BEACON_DEFAULT_SECS", "300"),
            beacon_max_secs: try_load("WARDLINE_BEACON_MAX_SECS", "14400"),
            beacon_extend_secs: try_load("WARDLINE_BEACON_EXTEND_SECS", "300"),
            sweep_interval_secs: try_load("WARDLINE_SWEEP_INTERVAL_SECS", "30"),
            dispatch_delay_secs: try_load("WARDLINE_DISPATCH_DELAY_SECS", "2"),
            nearby_default_radius_m: try_load("WARDLINE_NEARBY_RADIUS_M", "2000"),
            nearby_max_radius_m: try_load("WARDLINE_NEARBY_MAX_RADIUS_M", "10000"),
            rate_default_limit: try_load("WARDLINE_RATE_LIMIT", "60"),
            rate_default_window_secs: try_load("WARDLINE_RATE_WINDOW_SECS", "60"),
            rate_alert_limit: try_load("WARDLINE_ALERT_RATE_LIMIT", "5"),
            rate_alert_window_secs: try_load("WARDLINE_ALERT_RATE_WINDOW_SECS", "300"),
            login_max_failures: try_load("WARDLINE_LOGIN_MAX_FAILURES", "5"),
            login_lockout_secs: try_load("WARDLINE_LOGIN_LOCKOUT_SECS", "900"),
            token_ttl_secs: try_load("WARDLINE_TOKEN_TTL_SECS", "86400"),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("wardline.db")
    }
}

/// ~/Wardline/ on all platforms (user-visible).
fn default_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(APP_NAME)
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| format!("Invalid {key} value: {e}"))
        .expect("Environment misconfigured!")
}
