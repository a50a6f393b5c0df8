use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{Duration, NaiveTime};

/// Application-level constants
pub const APP_NAME: &str = "Carebook";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_PORT: u16 = 4001;
const DEFAULT_CLIENT_URL: &str = "http://localhost:5173";
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 20;
const DEFAULT_PAGE_SIZE: u32 = 10;

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "carebook_lib=info,carebook=info,tower_http=info"
}

/// Get the application data directory
/// ~/Carebook/ on all platforms, falling back to the working directory
/// when no home directory can be resolved.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the SQLite database.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("carebook.db")
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Invalid business hours: {0}")]
    BusinessHours(String),
}

// ═══════════════════════════════════════════════════════════
// Business hours
// ═══════════════════════════════════════════════════════════

/// The daily window appointments can be booked in, as a fixed grid.
///
/// Candidates run from `open` in `step` increments while strictly before
/// `close`; `close` itself is appended as a final boundary slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessHours {
    open: NaiveTime,
    close: NaiveTime,
    step_minutes: u32,
}

impl BusinessHours {
    pub fn new(open: NaiveTime, close: NaiveTime, step_minutes: u32) -> Result<Self, ConfigError> {
        if step_minutes == 0 {
            return Err(ConfigError::BusinessHours("slot length must be positive".into()));
        }
        if open >= close {
            return Err(ConfigError::BusinessHours(format!(
                "opening time {} must be before closing time {}",
                open.format("%H:%M"),
                close.format("%H:%M")
            )));
        }
        Ok(Self {
            open,
            close,
            step_minutes,
        })
    }

    pub fn open(&self) -> NaiveTime {
        self.open
    }

    pub fn close(&self) -> NaiveTime {
        self.close
    }

    pub fn step_minutes(&self) -> u32 {
        self.step_minutes
    }

    /// Every candidate slot time of a day, ascending.
    pub fn candidates(&self) -> Vec<NaiveTime> {
        let step = Duration::minutes(i64::from(self.step_minutes));
        let mut slots = Vec::new();
        let mut time = self.open;
        while time < self.close {
            slots.push(time);
            let (next, wrapped_secs) = time.overflowing_add_signed(step);
            if wrapped_secs != 0 {
                break;
            }
            time = next;
        }
        slots.push(self.close);
        slots
    }
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            step_minutes: 30,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Service configuration
// ═══════════════════════════════════════════════════════════

/// Runtime settings for the HTTP service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    /// Origin allowed by CORS (the front-end URL).
    pub client_url: String,
    pub rate_limit_per_minute: u32,
    pub default_page_size: u32,
    pub business_hours: BusinessHours,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            db_path: default_db_path(),
            client_url: DEFAULT_CLIENT_URL.to_string(),
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            default_page_size: DEFAULT_PAGE_SIZE,
            business_hours: BusinessHours::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from `CAREBOOK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let ip: IpAddr = parse_var(&lookup, "CAREBOOK_BIND", defaults.bind_addr.ip())?;
        let port: u16 = parse_var(&lookup, "CAREBOOK_PORT", defaults.bind_addr.port())?;
        let db_path = lookup("CAREBOOK_DB_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let client_url = lookup("CAREBOOK_CLIENT_URL")
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(defaults.client_url);
        let rate_limit_per_minute = parse_var(
            &lookup,
            "CAREBOOK_RATE_LIMIT_PER_MINUTE",
            defaults.rate_limit_per_minute,
        )?;
        let default_page_size = parse_var(&lookup, "CAREBOOK_PAGE_SIZE", defaults.default_page_size)?;
        if default_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                var: "CAREBOOK_PAGE_SIZE",
                value: "0".into(),
            });
        }

        let open = parse_time(&lookup, "CAREBOOK_OPEN", defaults.business_hours.open())?;
        let close = parse_time(&lookup, "CAREBOOK_CLOSE", defaults.business_hours.close())?;
        let step = parse_var(
            &lookup,
            "CAREBOOK_SLOT_MINUTES",
            defaults.business_hours.step_minutes(),
        )?;

        Ok(Self {
            bind_addr: SocketAddr::new(ip, port),
            db_path,
            client_url,
            rate_limit_per_minute,
            default_page_size,
            business_hours: BusinessHours::new(open, close, step)?,
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}

fn parse_time<F>(lookup: &F, var: &'static str, default: NaiveTime) -> Result<NaiveTime, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}
