//! Schema catalog 探测
//!
//! 只读查询 `sqlite_master` / `pragma_table_info`。所有函数接收 `&Connection`，
//! 传入事务（`Transaction` 解引用为 `Connection`）即可在该事务内探测。

use rusqlite::{Connection, OptionalExtension};

use super::DbError;

/// 检查表是否存在
pub fn table_exists(conn: &Connection, table_name: &str) -> Result<bool, DbError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
        [table_name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// 检查表中是否存在指定列
pub fn column_exists(
    conn: &Connection,
    table_name: &str,
    column_name: &str,
) -> Result<bool, DbError> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info(?1) WHERE name = ?2",
        rusqlite::params![table_name, column_name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// 检查索引是否存在
pub fn index_exists(conn: &Connection, index_name: &str) -> Result<bool, DbError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1)",
        [index_name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// 列是否带 NOT NULL 约束；列不存在时返回 `None`
pub fn column_is_not_null(
    conn: &Connection,
    table_name: &str,
    column_name: &str,
) -> Result<Option<bool>, DbError> {
    let not_null: Option<bool> = conn
        .query_row(
            "SELECT \"notnull\" FROM pragma_table_info(?1) WHERE name = ?2",
            rusqlite::params![table_name, column_name],
            |row| row.get::<_, i64>(0).map(|flag| flag != 0),
        )
        .optional()?;
    Ok(not_null)
}
