use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::CostRates;
use crate::queue::{JobOptions, RetryPolicy};
use crate::upload::UploadLimits;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub costs: CostsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path().unwrap_or_else(|| PathBuf::from("coatplan.db"))
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub public_base_url: String,
    pub upload_base_url: String,
    #[serde(default = "default_write_ttl_secs")]
    pub write_ttl_secs: u64,
}

fn default_write_ttl_secs() -> u64 {
    3600
}

impl StorageConfig {
    pub fn write_ttl(&self) -> Duration {
        Duration::from_secs(self.write_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_file_size() -> u64 {
    crate::upload::DEFAULT_MAX_FILE_SIZE
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_name")]
    pub name: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

fn default_queue_name() -> String {
    "artifact-analysis".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    2000
}

fn default_priority() -> i32 {
    1
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_retention_hours() -> u64 {
    24
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            priority: default_priority(),
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            retention_hours: default_retention_hours(),
        }
    }
}

impl QueueConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
        }
    }

    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            priority: self.priority,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostsConfig {
    #[serde(default = "default_labor_rate")]
    pub labor_rate: f64,
}

fn default_labor_rate() -> f64 {
    crate::analysis::DEFAULT_LABOR_RATE
}

impl Default for CostsConfig {
    fn default() -> Self {
        Self {
            labor_rate: default_labor_rate(),
        }
    }
}

impl CostsConfig {
    pub fn rates(&self) -> CostRates {
        CostRates {
            labor_rate: self.labor_rate,
        }
    }
}

impl Config {
    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_file_size: self.upload.max_file_size,
            write_ttl: self.storage.write_ttl(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "version": "1.0",
                "storage": {
                    "root": "/srv/blobs",
                    "public_base_url": "https://cdn.example.test",
                    "upload_base_url": "https://upload.example.test"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.storage.write_ttl(), Duration::from_secs(3600));
        assert_eq!(config.upload.max_file_size, 52_428_800);
        assert_eq!(config.queue.name, "artifact-analysis");
        assert_eq!(config.queue.retry_policy(), RetryPolicy::default());
        assert_eq!(config.queue.job_options(), JobOptions::default());
        assert_eq!(config.queue.retention(), Duration::from_secs(86_400));
        assert!(config.workers.count > 0);
        assert_eq!(config.costs.rates(), CostRates::default());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_upload_limits_combine_sections() {
        let mut config: Config = serde_json::from_str(
            r#"{
                "version": "1.0",
                "storage": {
                    "root": "/srv/blobs",
                    "public_base_url": "https://cdn.example.test",
                    "upload_base_url": "https://upload.example.test",
                    "write_ttl_secs": 600
                }
            }"#,
        )
        .unwrap();
        config.upload.max_file_size = 1024;

        let limits = config.upload_limits();
        assert_eq!(limits.max_file_size, 1024);
        assert_eq!(limits.write_ttl, Duration::from_secs(600));
    }
}
