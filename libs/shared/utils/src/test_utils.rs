use std::path::PathBuf;

use chrono::{Duration, Local, NaiveDate};
use tempfile::TempDir;

use shared_config::AppConfig;

/// A database file inside a temporary directory. The directory (and the WAL/SHM
/// side files) is removed when this value is dropped.
pub struct TestDatabase {
    _dir: TempDir,
    path: PathBuf,
}

impl TestDatabase {
    pub fn new() -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join("registration-test.db");
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &str {
        self.path.to_str().unwrap_or_default()
    }
}

pub struct TestConfig {
    pub database_path: String,
    pub cancel_cutoff_minutes: i64,
    pub patient_directory_url: String,
}

impl TestConfig {
    pub fn for_database(db: &TestDatabase) -> Self {
        Self {
            database_path: db.path().to_string(),
            cancel_cutoff_minutes: 60,
            patient_directory_url: String::new(),
        }
    }

    pub fn with_directory(mut self, url: &str) -> Self {
        self.patient_directory_url = url.to_string();
        self
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            database_path: self.database_path.clone(),
            cancel_cutoff_minutes: self.cancel_cutoff_minutes,
            patient_directory_url: self.patient_directory_url.clone(),
            patient_directory_api_key: "test-directory-key".to_string(),
            ..AppConfig::default()
        }
    }
}

/// A work date far enough ahead that the cancellation window is still open.
pub fn future_work_date(days_ahead: i64) -> NaiveDate {
    Local::now().date_naive() + Duration::days(days_ahead)
}

pub fn past_work_date(days_ago: i64) -> NaiveDate {
    Local::now().date_naive() - Duration::days(days_ago)
}
