//! Schema 版本记录
//!
//! 版本以 `{"version": <u64>}` 的 JSON 形式保存在元数据表的 `"schema"` 键下。
//! 记录不存在或为空表示版本 0。

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::UpgradeError;
use crate::chaindb::{metadata, TxScope};

pub const SCHEMA_METADATA_KEY: &str = "schema";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub version: u64,
}

/// 读取当前 schema 版本
pub fn read_version(conn: &Connection) -> Result<u64, UpgradeError> {
    let data = metadata::get(conn, SCHEMA_METADATA_KEY).map_err(UpgradeError::VersionRead)?;

    let data = match data {
        Some(data) if !data.is_empty() => data,
        // 没有数据即版本 0
        _ => return Ok(0),
    };

    let metadata: SchemaMetadata =
        serde_json::from_slice(&data).map_err(UpgradeError::MalformedMetadata)?;
    Ok(metadata.version)
}

/// 在升级事务内写入 schema 版本
pub fn write_version(scope: &TxScope<'_>, version: u64) -> Result<(), UpgradeError> {
    let tx = scope.tx().map_err(UpgradeError::SetVersion)?;
    let data = serde_json::to_vec(&SchemaMetadata { version })
        .map_err(UpgradeError::MalformedMetadata)?;
    metadata::set(tx, SCHEMA_METADATA_KEY, &data).map_err(UpgradeError::SetVersion)
}
