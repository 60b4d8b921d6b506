//! # Migration Verifier (迁移验证器)
//!
//! 迁移步骤执行完毕后、提交之前，在同一事务内确认迁移声明的结构确实存在：
//!
//! - 表是否存在
//! - 列是否存在
//! - 索引是否存在

use rusqlite::Connection;

use super::registry::Migration;
use super::UpgradeError;
use crate::chaindb::catalog;

pub struct MigrationVerifier;

impl MigrationVerifier {
    /// 验证迁移结果
    pub fn verify(conn: &Connection, migration: &Migration) -> Result<(), UpgradeError> {
        let version = migration.version;
        let probe_failed = |e: crate::chaindb::DbError| UpgradeError::VerificationFailed {
            version,
            reason: format!("catalog probe failed: {}", e),
        };

        for table in migration.expected_tables {
            if !catalog::table_exists(conn, table).map_err(probe_failed)? {
                return Err(UpgradeError::VerificationFailed {
                    version,
                    reason: format!("Table '{}' not found", table),
                });
            }
        }

        for (table, column) in migration.expected_columns {
            if !catalog::column_exists(conn, table, column).map_err(probe_failed)? {
                return Err(UpgradeError::VerificationFailed {
                    version,
                    reason: format!("Column '{}.{}' not found", table, column),
                });
            }
        }

        for index in migration.expected_indexes {
            if !catalog::index_exists(conn, index).map_err(probe_failed)? {
                return Err(UpgradeError::VerificationFailed {
                    version,
                    reason: format!("Index '{}' not found", index),
                });
            }
        }

        tracing::debug!("[MigrationVerifier] Version {} verified", version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrader::step::Step;
    use assert_matches::assert_matches;

    const NO_STEPS: &[Step] = &[];

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t_genesis (f_validators_root BLOB NOT NULL PRIMARY KEY, f_time TEXT NOT NULL);
             CREATE INDEX i_genesis_1 ON t_genesis(f_time);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_verify_success() {
        let conn = test_conn();
        let migration = Migration::new(1, NO_STEPS)
            .with_expected_tables(&["t_genesis"])
            .with_expected_columns(&[("t_genesis", "f_time")])
            .with_expected_indexes(&["i_genesis_1"]);
        MigrationVerifier::verify(&conn, &migration).unwrap();
    }

    #[test]
    fn test_verify_missing_table() {
        let conn = test_conn();
        let migration = Migration::new(2, NO_STEPS).with_expected_tables(&["t_chain_spec"]);
        let err = MigrationVerifier::verify(&conn, &migration).unwrap_err();
        assert_matches!(err, UpgradeError::VerificationFailed { version: 2, ref reason } if reason.contains("t_chain_spec"));
    }

    #[test]
    fn test_verify_missing_column() {
        let conn = test_conn();
        let migration =
            Migration::new(1, NO_STEPS).with_expected_columns(&[("t_genesis", "f_fork_version")]);
        assert_matches!(
            MigrationVerifier::verify(&conn, &migration),
            Err(UpgradeError::VerificationFailed { .. })
        );
    }

    #[test]
    fn test_verify_missing_index() {
        let conn = test_conn();
        let migration = Migration::new(1, NO_STEPS).with_expected_indexes(&["i_genesis_2"]);
        assert_matches!(
            MigrationVerifier::verify(&conn, &migration),
            Err(UpgradeError::VerificationFailed { .. })
        );
    }
}
