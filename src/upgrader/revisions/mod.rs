//! 各版本的迁移定义
//!
//! ## 新增迁移
//!
//! 1. 新建 `revision_NNNN.rs`，声明步骤列表与 `MIGRATION`
//! 2. 追加到 [`MIGRATIONS`]（保持版本递增）
//! 3. 更新 [`CURRENT_VERSION`]
//!
//! 仅调整版本号而没有结构变化时，可只更新 `CURRENT_VERSION`，不必注册迁移。

pub mod revision_0001;

use super::registry::Migration;

/// 当前二进制期望的 schema 版本
pub const CURRENT_VERSION: u64 = 1;

pub(crate) const MIGRATIONS: &[Migration] = &[revision_0001::MIGRATION];
