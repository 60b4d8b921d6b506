//! 升级器配置
//!
//! 加载顺序（后者覆盖前者）：
//! 1. 内置默认值
//! 2. `config/chaindb.toml`（可选）
//! 3. `CHAINDB__*` 环境变量（可由 `.env` 提供），如 `CHAINDB__POOL__MAX_SIZE=4`

use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

const CONFIG_FILE: &str = "config/chaindb";
const ENV_PREFIX: &str = "CHAINDB";

/// 连接池配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_size: u32,
    /// SQLite busy_timeout（毫秒），防止写锁等待无界
    pub busy_timeout_ms: u64,
    pub connection_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            busy_timeout_ms: 3000,
            connection_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpgraderConfig {
    pub database_path: PathBuf,
    /// 升级前是否创建版本 0 基础 schema
    pub apply_base_schema: bool,
    pub pool: PoolConfig,
}

impl Default for UpgraderConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("chaindb.sqlite"),
            apply_base_schema: true,
            pool: PoolConfig::default(),
        }
    }
}

impl UpgraderConfig {
    pub fn from_env_and_file() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut builder = config::Config::builder();
        if std::path::Path::new(&format!("{}.toml", CONFIG_FILE)).exists() {
            builder = builder.add_source(config::File::with_name(CONFIG_FILE));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"));
        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> anyhow::Result<Self> {
        let loaded = builder.build().context("failed to load upgrader configuration")?;
        loaded
            .try_deserialize::<UpgraderConfig>()
            .context("invalid upgrader configuration")
    }
}
