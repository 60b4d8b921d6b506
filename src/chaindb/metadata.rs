//! 通用元数据键值存储（`t_metadata`）
//!
//! 多个子系统共用这张表，各自只拥有自己的 key。
//! 函数接收 `&Connection`：传入升级事务即在该事务内读写。

use rusqlite::{params, Connection, OptionalExtension};

use super::{catalog, DbError};

/// 读取元数据
///
/// 表不存在（从未初始化的数据库）或 key 不存在时返回 `None`。
pub fn get(conn: &Connection, key: &str) -> Result<Option<Vec<u8>>, DbError> {
    if !catalog::table_exists(conn, "t_metadata")? {
        return Ok(None);
    }

    let value: Option<Vec<u8>> = conn
        .query_row(
            "SELECT f_value FROM t_metadata WHERE f_key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// 写入（覆盖）元数据
pub fn set(conn: &Connection, key: &str, value: &[u8]) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO t_metadata (f_key, f_value) VALUES (?1, ?2)
         ON CONFLICT (f_key) DO UPDATE SET f_value = excluded.f_value",
        params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t_metadata (f_key TEXT NOT NULL PRIMARY KEY, f_value BLOB NOT NULL)",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_get_without_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get(&conn, "schema").unwrap(), None);
    }

    #[test]
    fn test_get_missing_key() {
        let conn = test_conn();
        assert_eq!(get(&conn, "schema").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites() {
        let conn = test_conn();
        set(&conn, "schema", br#"{"version":1}"#).unwrap();
        set(&conn, "schema", br#"{"version":2}"#).unwrap();
        set(&conn, "other", b"unrelated").unwrap();

        assert_eq!(get(&conn, "schema").unwrap(), Some(br#"{"version":2}"#.to_vec()));
        assert_eq!(get(&conn, "other").unwrap(), Some(b"unrelated".to_vec()));
    }
}
