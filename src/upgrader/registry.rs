//! # Migration Registry (迁移注册表)
//!
//! 目标版本号 → 迁移定义的静态映射。
//!
//! ## 约定
//!
//! - 迁移按版本号严格递增排列，版本号不重复且不为 0
//! - 中间版本允许没有迁移（视为空操作版本）
//! - 迁移内步骤顺序即执行顺序，不可调整
//! - 已发布的迁移不可修改，修复通过新版本完成

use super::revisions;
use super::step::Step;
use super::UpgradeError;

/// 迁移定义
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// 应用后达到的版本
    pub version: u64,
    /// 应用后是否需要从上游重新获取派生数据
    pub requires_refetch: bool,
    /// 按声明顺序执行的步骤
    pub steps: &'static [Step],
    /// 迁移后必须存在的表
    pub expected_tables: &'static [&'static str],
    /// 迁移后必须存在的列 (table, column)
    pub expected_columns: &'static [(&'static str, &'static str)],
    /// 迁移后必须存在的索引
    pub expected_indexes: &'static [&'static str],
}

impl Migration {
    pub const fn new(version: u64, steps: &'static [Step]) -> Self {
        Self {
            version,
            requires_refetch: false,
            steps,
            expected_tables: &[],
            expected_columns: &[],
            expected_indexes: &[],
        }
    }

    /// 标记为需要重新获取派生数据
    pub const fn requires_refetch(mut self) -> Self {
        self.requires_refetch = true;
        self
    }

    pub const fn with_expected_tables(mut self, tables: &'static [&'static str]) -> Self {
        self.expected_tables = tables;
        self
    }

    pub const fn with_expected_columns(
        mut self,
        columns: &'static [(&'static str, &'static str)],
    ) -> Self {
        self.expected_columns = columns;
        self
    }

    pub const fn with_expected_indexes(mut self, indexes: &'static [&'static str]) -> Self {
        self.expected_indexes = indexes;
        self
    }
}

/// 不可变的迁移注册表
#[derive(Debug, Clone, Copy)]
pub struct Registry {
    target_version: u64,
    migrations: &'static [Migration],
}

impl Registry {
    /// 构造并校验注册表
    pub fn new(
        target_version: u64,
        migrations: &'static [Migration],
    ) -> Result<Self, UpgradeError> {
        let mut previous = 0u64;
        for migration in migrations {
            if migration.version == 0 {
                return Err(UpgradeError::InvalidRegistry(
                    "version 0 cannot have a migration".to_string(),
                ));
            }
            if migration.version <= previous {
                return Err(UpgradeError::InvalidRegistry(format!(
                    "migration for version {} is out of order or duplicated (after {})",
                    migration.version, previous
                )));
            }
            if migration.version > target_version {
                return Err(UpgradeError::InvalidRegistry(format!(
                    "migration for version {} exceeds target version {}",
                    migration.version, target_version
                )));
            }
            previous = migration.version;
        }

        Ok(Self {
            target_version,
            migrations,
        })
    }

    /// 随二进制发布的注册表
    pub fn builtin() -> Self {
        Self {
            target_version: revisions::CURRENT_VERSION,
            migrations: revisions::MIGRATIONS,
        }
    }

    pub fn target_version(&self) -> u64 {
        self.target_version
    }

    pub fn migrations(&self) -> &'static [Migration] {
        self.migrations
    }

    /// 获取指定版本的迁移；空操作版本返回 `None`
    pub fn get(&self, version: u64) -> Option<&'static Migration> {
        self.migrations
            .binary_search_by_key(&version, |m| m.version)
            .ok()
            .map(|index| &self.migrations[index])
    }

    /// 从 `current_version` 升级到目标版本需要执行的迁移
    pub fn pending(&self, current_version: u64) -> impl Iterator<Item = &'static Migration> {
        let target_version = self.target_version;
        let migrations = self.migrations;
        migrations
            .iter()
            .filter(move |m| m.version > current_version && m.version <= target_version)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
