//! # Schema Upgrader (Schema 升级器)
//!
//! 将链数据库从当前 schema 版本升级到二进制期望的目标版本。
//!
//! ## 流程
//!
//! 1. 读取当前版本（无记录即版本 0）
//! 2. 已是目标版本：直接返回，不开启事务
//! 3. 开启事务作用域，按 `v+1..=target` 顺序执行已注册迁移的全部步骤
//! 4. 每个迁移执行完毕后在事务内验证预期结构
//! 5. 写入目标版本并提交
//!
//! 整个升级路径共享一个事务：任何失败都会回滚到升级前的版本，
//! 不会出现中间版本。
//!
//! ## 并发
//!
//! 同一数据库同时只允许一个升级运行，由部署方保证。
//! 事务以 IMMEDIATE 开启，并发写入者会在 busy_timeout 内等待或失败。

mod error;
pub mod registry;
pub mod revisions;
pub mod step;
pub mod verifier;
pub mod version;

pub use error::{StepError, UpgradeError};
pub use registry::{Migration, Registry};
pub use step::{Step, StepContext};

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::chaindb::{ChainDb, ProposerSlashingStore, TxScope};
use crate::domain::{HeaderRootHasher, SszHeaderHasher};
use verifier::MigrationVerifier;

/// 升级前的版本状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UpgradeStatus {
    /// 已是目标版本
    UpToDate { version: u64 },
    /// 需要升级；`pending` 为将执行迁移的版本（不含空操作版本）
    UpgradeRequired {
        current: u64,
        target: u64,
        pending: Vec<u64>,
    },
    /// 数据库版本高于本二进制支持的版本
    DatabaseNewer { current: u64, supported: u64 },
}

/// 一次升级运行的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    /// 升级前版本
    pub from_version: u64,
    /// 升级后版本
    pub to_version: u64,
    /// 实际执行了迁移的版本
    pub applied_versions: Vec<u64>,
    /// 是否需要从上游重新获取派生数据
    pub requires_refetch: bool,
    /// 耗时（毫秒）
    pub duration_ms: u64,
}

impl UpgradeReport {
    fn up_to_date(version: u64, start: Instant) -> Self {
        Self {
            from_version: version,
            to_version: version,
            applied_versions: Vec::new(),
            requires_refetch: false,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// 本次运行是否改变了数据库
    pub fn upgraded(&self) -> bool {
        self.from_version != self.to_version
    }
}

/// Schema 升级器
pub struct SchemaUpgrader {
    db: ChainDb,
    registry: Registry,
    store: Arc<dyn ProposerSlashingStore>,
    hasher: Arc<dyn HeaderRootHasher>,
}

impl SchemaUpgrader {
    /// 使用内置注册表、数据库自身的数据访问能力与 SSZ 哈希器
    pub fn new(db: ChainDb) -> Self {
        let store: Arc<dyn ProposerSlashingStore> = Arc::new(db.clone());
        Self {
            db,
            registry: Registry::builtin(),
            store,
            hasher: Arc::new(SszHeaderHasher),
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// 替换区块头哈希实现
    pub fn with_hasher(mut self, hasher: Arc<dyn HeaderRootHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// 替换步骤使用的数据访问实现
    pub fn with_store(mut self, store: Arc<dyn ProposerSlashingStore>) -> Self {
        self.store = store;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn target_version(&self) -> u64 {
        self.registry.target_version()
    }

    /// 读取数据库当前 schema 版本
    pub fn current_version(&self) -> Result<u64, UpgradeError> {
        let conn = self.db.get_conn().map_err(UpgradeError::Connection)?;
        version::read_version(&conn)
    }

    /// 只读检查升级状态
    pub fn status(&self) -> Result<UpgradeStatus, UpgradeError> {
        let current = self.current_version()?;
        let target = self.registry.target_version();

        let status = if current == target {
            UpgradeStatus::UpToDate { version: current }
        } else if current > target {
            UpgradeStatus::DatabaseNewer {
                current,
                supported: target,
            }
        } else {
            UpgradeStatus::UpgradeRequired {
                current,
                target,
                pending: self.registry.pending(current).map(|m| m.version).collect(),
            }
        };
        Ok(status)
    }

    /// 升级到目标版本，返回是否需要重新获取派生数据
    pub fn upgrade(&self) -> Result<bool, UpgradeError> {
        self.upgrade_with_report().map(|report| report.requires_refetch)
    }

    /// 升级到目标版本并返回详细结果
    pub fn upgrade_with_report(&self) -> Result<UpgradeReport, UpgradeError> {
        let start = Instant::now();
        let target = self.registry.target_version();

        let mut conn = self.db.get_conn().map_err(UpgradeError::Connection)?;
        let current = version::read_version(&conn)?;
        self.check_version(current, target)?;
        if current == target {
            tracing::debug!("[SchemaUpgrader] Schema already at version {}", current);
            return Ok(UpgradeReport::up_to_date(current, start));
        }

        let mut scope = TxScope::begin(&mut conn).map_err(UpgradeError::BeginTx)?;

        // 持有写锁后再次确认版本，防止读取与开启事务之间被其他进程升级
        let current = match self.read_locked_version(&scope, target) {
            Ok(current) => current,
            Err(e) => {
                scope.cancel();
                return Err(e);
            }
        };
        if current == target {
            scope.cancel();
            tracing::info!("[SchemaUpgrader] Schema upgraded concurrently to version {}", current);
            return Ok(UpgradeReport::up_to_date(current, start));
        }

        tracing::info!(
            "[SchemaUpgrader] Upgrading schema from version {} to version {}",
            current,
            target
        );

        let (applied_versions, requires_refetch) = match self.apply_pending(&scope, current, target) {
            Ok(result) => result,
            Err(e) => {
                scope.cancel();
                tracing::error!(
                    "[SchemaUpgrader] Upgrade failed, schema remains at version {}: {}",
                    current,
                    e
                );
                return Err(e);
            }
        };

        if let Err(e) = version::write_version(&scope, target) {
            scope.cancel();
            tracing::error!("[SchemaUpgrader] Failed to set schema version {}: {}", target, e);
            return Err(e);
        }

        if let Err(e) = scope.commit() {
            scope.cancel();
            tracing::error!(
                "[SchemaUpgrader] Commit failed, schema remains at version {}: {}",
                current,
                e
            );
            return Err(UpgradeError::Commit(e));
        }

        let report = UpgradeReport {
            from_version: current,
            to_version: target,
            applied_versions,
            requires_refetch,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            "[SchemaUpgrader] Upgrade complete: v{} -> v{}, applied {:?}, requires refetch: {}, {}ms",
            report.from_version,
            report.to_version,
            report.applied_versions,
            report.requires_refetch,
            report.duration_ms
        );
        Ok(report)
    }

    fn check_version(&self, current: u64, target: u64) -> Result<(), UpgradeError> {
        if current > target {
            tracing::error!(
                "[SchemaUpgrader] Database schema version {} is newer than supported version {}",
                current,
                target
            );
            return Err(UpgradeError::DatabaseNewer {
                current,
                supported: target,
            });
        }
        Ok(())
    }

    fn read_locked_version(&self, scope: &TxScope<'_>, target: u64) -> Result<u64, UpgradeError> {
        let tx = scope.tx().map_err(UpgradeError::VersionRead)?;
        let current = version::read_version(tx)?;
        self.check_version(current, target)?;
        Ok(current)
    }

    /// 在事务作用域内按顺序执行 `current+1..=target` 的迁移
    fn apply_pending(
        &self,
        scope: &TxScope<'_>,
        current: u64,
        target: u64,
    ) -> Result<(Vec<u64>, bool), UpgradeError> {
        let ctx = StepContext::new(scope, self.store.as_ref(), self.hasher.as_ref());
        let mut applied_versions = Vec::new();
        let mut requires_refetch = false;

        for version in (current + 1)..=target {
            let Some(migration) = self.registry.get(version) else {
                tracing::debug!("[SchemaUpgrader] No migration registered for version {}", version);
                continue;
            };

            tracing::info!("[SchemaUpgrader] Upgrading to schema version {}/{}", version, target);
            let total = migration.steps.len();
            for (index, step) in migration.steps.iter().enumerate() {
                tracing::info!(
                    "[SchemaUpgrader] Running step {} ({}/{})",
                    step.name,
                    index + 1,
                    total
                );
                (step.run)(&ctx).map_err(|source| UpgradeError::Step {
                    version,
                    step: step.name,
                    source,
                })?;
            }

            let tx = scope.tx().map_err(UpgradeError::VersionRead)?;
            MigrationVerifier::verify(tx, migration)?;

            requires_refetch |= migration.requires_refetch;
            applied_versions.push(version);
        }

        Ok((applied_versions, requires_refetch))
    }
}

impl std::fmt::Debug for SchemaUpgrader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaUpgrader")
            .field("db", &self.db)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn create_test_db() -> (ChainDb, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = ChainDb::open(&temp_dir.path().join("chain.db"), &PoolConfig::default()).unwrap();
        db.ensure_base_schema().unwrap();
        (db, temp_dir)
    }

    fn create_marker(ctx: &StepContext<'_, '_>) -> Result<(), StepError> {
        ctx.execute("CREATE TABLE t_marker (f_id INTEGER)", "failed to create marker table")
    }

    #[test]
    fn test_fresh_database_reports_upgrade_required() {
        let (db, _temp_dir) = create_test_db();
        let upgrader = SchemaUpgrader::new(db);
        assert_eq!(upgrader.current_version().unwrap(), 0);
        assert_eq!(
            upgrader.status().unwrap(),
            UpgradeStatus::UpgradeRequired {
                current: 0,
                target: revisions::CURRENT_VERSION,
                pending: vec![1],
            }
        );
    }

    #[test]
    fn test_upgrade_builtin_then_up_to_date() {
        let (db, _temp_dir) = create_test_db();
        let upgrader = SchemaUpgrader::new(db);

        let report = upgrader.upgrade_with_report().unwrap();
        assert_eq!(report.from_version, 0);
        assert_eq!(report.to_version, revisions::CURRENT_VERSION);
        assert_eq!(report.applied_versions, vec![1]);
        assert!(report.requires_refetch);
        assert!(report.upgraded());

        assert_eq!(
            upgrader.status().unwrap(),
            UpgradeStatus::UpToDate {
                version: revisions::CURRENT_VERSION
            }
        );
        assert!(!upgrader.upgrade().unwrap());
    }

    #[test]
    fn test_noop_versions_only_bump_the_version() {
        static STEPS: [Step; 1] = [Step::new("create_marker", create_marker)];
        static MIGRATIONS: [Migration; 1] = [Migration::new(2, &STEPS).with_expected_tables(&["t_marker"])];

        let (db, _temp_dir) = create_test_db();
        let upgrader = SchemaUpgrader::new(db).with_registry(Registry::new(3, &MIGRATIONS).unwrap());

        let report = upgrader.upgrade_with_report().unwrap();
        assert_eq!(report.applied_versions, vec![2]);
        assert_eq!(report.to_version, 3);
        assert!(!report.requires_refetch);
        assert_eq!(upgrader.current_version().unwrap(), 3);
    }

    #[test]
    fn test_newer_database_is_refused() {
        static MIGRATIONS: [Migration; 0] = [];
        let (db, _temp_dir) = create_test_db();
        {
            let mut conn = db.get_conn().unwrap();
            let mut scope = TxScope::begin(&mut conn).unwrap();
            version::write_version(&scope, 5).unwrap();
            scope.commit().unwrap();
        }

        let upgrader = SchemaUpgrader::new(db).with_registry(Registry::new(2, &MIGRATIONS).unwrap());
        assert_eq!(
            upgrader.status().unwrap(),
            UpgradeStatus::DatabaseNewer {
                current: 5,
                supported: 2
            }
        );
        assert_matches!(
            upgrader.upgrade(),
            Err(UpgradeError::DatabaseNewer {
                current: 5,
                supported: 2
            })
        );
        assert_eq!(upgrader.current_version().unwrap(), 5);
    }

    #[test]
    fn test_status_serializes_with_state_tag() {
        let status = UpgradeStatus::UpToDate { version: 1 };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "up_to_date");
        assert_eq!(json["version"], 1);
    }
}
