use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::simulation::{AdjudicatorConfig, SimulationConfig};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

const MAX_CALL_TIMEOUT_MS: u64 = 300_000;
const MAX_RETRIES: u32 = 10;
const MAX_BACKOFF_MS: u64 = 60_000;

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub adjudication: AdjudicationSettings,
    pub simulation: SimulationSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let adjudication = AdjudicationSettings {
            api_key: optional_var("GEMINI_API_KEY"),
            model: env::var("SIM_AI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            max_output_tokens: parse_var("SIM_AI_MAX_OUTPUT_TOKENS", 2000)?,
            temperature: parse_var("SIM_AI_TEMPERATURE", 0.7)?,
            timeout_ms: parse_bounded("SIM_AI_TIMEOUT_MS", 20_000, 1..=MAX_CALL_TIMEOUT_MS)?,
            max_retries: parse_bounded("SIM_AI_MAX_RETRIES", 2, 0..=MAX_RETRIES)?,
            backoff_ms: parse_bounded("SIM_AI_BACKOFF_MS", 500, 0..=MAX_BACKOFF_MS)?,
            transcript_window: parse_var("SIM_TRANSCRIPT_WINDOW", 6)?,
        };
        if !(0.0..=2.0).contains(&adjudication.temperature) {
            return Err(ConfigError::InvalidValue {
                variable: "SIM_AI_TEMPERATURE",
                value: adjudication.temperature.to_string(),
            });
        }

        let simulation = SimulationSettings {
            max_adjudication_failures: parse_var("SIM_MAX_ADJUDICATION_FAILURES", 2)?,
            scenario_dir: optional_var("SIM_SCENARIO_DIR").map(PathBuf::from),
        };
        if simulation.max_adjudication_failures == 0 {
            return Err(ConfigError::InvalidValue {
                variable: "SIM_MAX_ADJUDICATION_FAILURES",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            adjudication,
            simulation,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Text-generation backend and retry policy.
#[derive(Clone)]
pub struct AdjudicationSettings {
    /// Absent key means adjudication reports the capability as unavailable.
    pub api_key: Option<String>,
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub transcript_window: usize,
}

impl fmt::Debug for AdjudicationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdjudicationSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("backoff_ms", &self.backoff_ms)
            .field("transcript_window", &self.transcript_window)
            .finish()
    }
}

impl AdjudicationSettings {
    pub fn adjudicator_config(&self) -> AdjudicatorConfig {
        AdjudicatorConfig {
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            call_timeout: Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_ms),
            transcript_window: self.transcript_window,
        }
    }
}

/// Session lifecycle policy and scenario source.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub max_adjudication_failures: u32,
    /// Directory of `<id>.json` scenario files; the built-in catalog is used when unset.
    pub scenario_dir: Option<PathBuf>,
}

impl SimulationSettings {
    pub fn engine_config(&self) -> SimulationConfig {
        SimulationConfig {
            max_adjudication_failures: self.max_adjudication_failures,
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bounded<T>(
    name: &'static str,
    default: T,
    bounds: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + fmt::Display,
{
    let value = parse_var(name, default)?;
    if bounds.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            variable: name,
            value: value.to_string(),
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
            variable: name,
            value: raw,
        }),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { variable: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { variable, value } => {
                write!(f, "{variable} has an invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "GEMINI_API_KEY",
            "SIM_AI_MODEL",
            "SIM_AI_MAX_OUTPUT_TOKENS",
            "SIM_AI_TEMPERATURE",
            "SIM_AI_TIMEOUT_MS",
            "SIM_AI_MAX_RETRIES",
            "SIM_AI_BACKOFF_MS",
            "SIM_TRANSCRIPT_WINDOW",
            "SIM_MAX_ADJUDICATION_FAILURES",
            "SIM_SCENARIO_DIR",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.adjudication.api_key.is_none());
        assert_eq!(config.adjudication.model, "gemini-2.0-flash");
        assert_eq!(config.simulation.max_adjudication_failures, 2);
        assert!(config.simulation.scenario_dir.is_none());

        let adjudicator = config.adjudication.adjudicator_config();
        assert_eq!(adjudicator.call_timeout, Duration::from_secs(20));
        assert_eq!(adjudicator.backoff_base, Duration::from_millis(500));
        assert_eq!(adjudicator.transcript_window, 6);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn reports_offending_variable() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SIM_AI_MAX_RETRIES", "several");
        let err = AppConfig::load().expect_err("invalid retries");
        assert!(err.to_string().contains("SIM_AI_MAX_RETRIES"));
        reset_env();
    }

    #[test]
    fn rejects_unbounded_retry_policy() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        for (name, value) in [
            ("SIM_AI_MAX_RETRIES", "4294967295"),
            ("SIM_AI_TIMEOUT_MS", "0"),
            ("SIM_AI_TIMEOUT_MS", "86400000"),
            ("SIM_AI_BACKOFF_MS", "600000"),
        ] {
            reset_env();
            env::set_var(name, value);
            match AppConfig::load() {
                Err(ConfigError::InvalidValue { variable, value: reported }) => {
                    assert_eq!(variable, name);
                    assert_eq!(reported, value);
                }
                other => panic!("{name}={value} should be rejected, got {other:?}"),
            }
        }
        reset_env();
    }

    #[test]
    fn blank_api_key_counts_as_absent() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("GEMINI_API_KEY", "   ");
        env::set_var("SIM_SCENARIO_DIR", "./scenarios");
        let config = AppConfig::load().expect("config loads");
        assert!(config.adjudication.api_key.is_none());
        assert_eq!(
            config.simulation.scenario_dir,
            Some(PathBuf::from("./scenarios"))
        );
        assert!(!format!("{:?}", config.adjudication).contains("   "));
        reset_env();
    }
}
