use std::env;
use tracing::warn;

pub const DEFAULT_DATABASE_PATH: &str = "hospital_registration.db";
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_CANCEL_CUTOFF_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub server_host: String,
    pub server_port: u16,
    /// Minutes before the visit start after which a booking can no longer be cancelled.
    pub cancel_cutoff_minutes: i64,
    pub patient_directory_url: String,
    pub patient_directory_api_key: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            cancel_cutoff_minutes: DEFAULT_CANCEL_CUTOFF_MINUTES,
            patient_directory_url: String::new(),
            patient_directory_api_key: String::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| {
                    warn!("DATABASE_PATH not set, using {}", DEFAULT_DATABASE_PATH);
                    DEFAULT_DATABASE_PATH.to_string()
                }),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
            server_port: parse_or_default("SERVER_PORT", DEFAULT_SERVER_PORT),
            cancel_cutoff_minutes: parse_or_default(
                "CANCEL_CUTOFF_MINUTES",
                DEFAULT_CANCEL_CUTOFF_MINUTES,
            ),
            patient_directory_url: env::var("PATIENT_DIRECTORY_URL")
                .unwrap_or_else(|_| {
                    warn!("PATIENT_DIRECTORY_URL not set, patient ids will not be verified");
                    String::new()
                }),
            patient_directory_api_key: env::var("PATIENT_DIRECTORY_API_KEY")
                .unwrap_or_default(),
        };

        if config.cancel_cutoff_minutes < 0 {
            warn!(
                "CANCEL_CUTOFF_MINUTES is negative ({}), cancellations after the visit start will be accepted",
                config.cancel_cutoff_minutes
            );
        }

        config
    }

    pub fn is_patient_directory_configured(&self) -> bool {
        !self.patient_directory_url.is_empty()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
