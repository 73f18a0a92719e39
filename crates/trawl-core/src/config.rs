//! Runtime configuration.
//!
//! TOML から読み込み、読み込み時に検証する。省略したセクション・項目はデフォルト値。
//!
//! ```toml
//! [worker]
//! network = "tiktok"
//! poll_interval_secs = 10
//!
//! [store]
//! backend = "json_file"
//! path = "data/extraction_tasks.jsonl"
//!
//! [fan_out]
//! create_detail_tasks = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::domain::Network;
use crate::error::ConfigError;

// ========================================
// Worker
// ========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// ワーカーが担当する network
    ///
    /// - デフォルト: youtube
    pub network: Network,

    /// task がなかったときに次の取得まで待つ秒数
    ///
    /// - デフォルト: 10
    pub poll_interval_secs: u64,

    /// lease の長さ（秒）
    ///
    /// - デフォルト: 900 (15 分)
    /// - 抽出 1 件にかかる最大時間より長くすること。短いと処理中に他のワーカーに奪われる
    pub lease_duration_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            network: Network::Youtube,
            poll_interval_secs: 10,
            lease_duration_secs: 15 * 60,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn lease_duration(&self) -> TimeDelta {
        TimeDelta::seconds(self.lease_duration_secs as i64)
    }
}

// ========================================
// Store
// ========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    Memory,
    JsonFile {
        path: PathBuf,
    },
    Postgres {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::JsonFile {
            path: PathBuf::from("data/extraction_tasks.jsonl"),
        }
    }
}

// ========================================
// Sink / Fan-out / Extractor / HTTP
// ========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SinkConfig {
    /// 結果 JSON の出力先
    pub results_dir: PathBuf,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("data/results"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FanOutConfig {
    /// post list の結果から POST_DETAILS task を作るか
    pub create_detail_tasks: bool,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            create_detail_tasks: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorConfig {
    pub fixtures_dir: PathBuf,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            fixtures_dir: PathBuf::from("data/fixtures"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

// ========================================
// Root
// ========================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrawlConfig {
    pub worker: WorkerConfig,
    pub store: StoreConfig,
    pub sink: SinkConfig,
    pub fan_out: FanOutConfig,
    pub extractor: ExtractorConfig,
    pub http: HttpConfig,
}

impl TrawlConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: TrawlConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.lease_duration_secs == 0 {
            return Err(ConfigError::Invalid(
                "worker.lease_duration_secs must be positive".into(),
            ));
        }
        if self.worker.lease_duration_secs > i64::MAX as u64 / 1000 {
            return Err(ConfigError::Invalid(
                "worker.lease_duration_secs is too large".into(),
            ));
        }
        if let StoreConfig::Postgres {
            max_connections: 0, ..
        } = self.store
        {
            return Err(ConfigError::Invalid(
                "store.max_connections must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_file_gives_defaults() {
        let config = TrawlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TrawlConfig::default());
        assert_eq!(config.worker.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.worker.lease_duration(), TimeDelta::minutes(15));
        assert!(config.fan_out.create_detail_tasks);
    }

    #[test]
    fn sections_override_defaults() {
        let config = TrawlConfig::from_toml_str(
            r#"
            [worker]
            network = "instagram"
            poll_interval_secs = 2

            [store]
            backend = "postgres"
            url = "postgres://localhost/trawl"

            [fan_out]
            create_detail_tasks = false
            "#,
        )
        .unwrap();

        assert_eq!(config.worker.network, Network::Instagram);
        assert_eq!(config.worker.poll_interval_secs, 2);
        assert_eq!(config.worker.lease_duration_secs, 900);
        assert_eq!(
            config.store,
            StoreConfig::Postgres {
                url: "postgres://localhost/trawl".into(),
                max_connections: 5,
            }
        );
        assert!(!config.fan_out.create_detail_tasks);
    }

    #[rstest]
    #[case::unknown_network("[worker]\nnetwork = \"myspace\"")]
    #[case::unknown_backend("[store]\nbackend = \"redis\"")]
    #[case::unknown_key("[worker]\nthreads = 4")]
    #[case::zero_lease("[worker]\nlease_duration_secs = 0")]
    fn invalid_config_is_rejected(#[case] text: &str) {
        assert!(TrawlConfig::from_toml_str(text).is_err());
    }
}
