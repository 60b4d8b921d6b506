//! ChainDb - 链数据 SQLite 存储
//!
//! 负责：
//! - r2d2 连接池管理
//! - 基础 schema 初始化
//! - 事务作用域、元数据键值、schema catalog 探测
//! - 升级步骤使用的领域读写能力

pub mod base_schema;
pub mod catalog;
mod error;
pub mod metadata;
pub mod proposer_slashings;
mod tx;

pub use error::DbError;
pub use proposer_slashings::{ProposerSlashing, ProposerSlashingStore};
pub use tx::TxScope;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::PoolConfig;

pub type SqlitePool = Pool<SqliteConnectionManager>;
pub type SqlitePooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// 链数据库句柄（克隆开销很小，共享同一连接池）
#[derive(Clone)]
pub struct ChainDb {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl ChainDb {
    /// 打开（必要时创建）数据库文件并建立连接池
    pub fn open(db_path: &Path, pool_config: &PoolConfig) -> Result<Self, DbError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let pool = Self::build_pool(db_path, pool_config)?;
        tracing::info!("[ChainDb] Opened database at {}", db_path.display());

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    fn build_pool(db_path: &Path, pool_config: &PoolConfig) -> Result<SqlitePool, DbError> {
        let busy_timeout_ms = i64::try_from(pool_config.busy_timeout_ms).unwrap_or(i64::MAX);
        let manager = SqliteConnectionManager::file(db_path).with_init(move |c| {
            // 外键约束需要在每个连接上单独启用
            c.pragma_update(None, "foreign_keys", "ON")?;
            c.pragma_update(None, "journal_mode", "WAL")?;
            c.pragma_update(None, "synchronous", "NORMAL")?;
            c.pragma_update(None, "busy_timeout", busy_timeout_ms)?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(pool_config.max_size)
            .connection_timeout(Duration::from_secs(pool_config.connection_timeout_secs))
            .build(manager)?;

        Ok(pool)
    }

    /// 获取数据库连接
    pub fn get_conn(&self) -> Result<SqlitePooledConnection, DbError> {
        Ok(self.pool.get()?)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// 创建版本 0 的基础 schema（已存在的表不受影响）
    pub fn ensure_base_schema(&self) -> Result<(), DbError> {
        let conn = self.get_conn()?;
        base_schema::apply(&conn)
    }

    /// 独立探测列是否存在
    ///
    /// 供升级流程之外的诊断使用：在自己的只读事务中查询，结束即回滚。
    /// 升级步骤应直接对升级事务调用 [`catalog::column_exists`]。
    pub fn column_exists(&self, table_name: &str, column_name: &str) -> Result<bool, DbError> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let exists = catalog::column_exists(&tx, table_name, column_name)?;
        tx.rollback()?;
        Ok(exists)
    }
}

impl std::fmt::Debug for ChainDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainDb")
            .field("db_path", &self.db_path)
            .field("pool_size", &self.pool.max_size())
            .finish()
    }
}
