//! 升级步骤与步骤执行上下文
//!
//! 步骤是普通函数：`fn(&StepContext) -> Result<(), StepError>`。
//! 上下文显式持有升级事务作用域，步骤无法在事务之外执行 SQL。

use std::fmt;

use rusqlite::Transaction;

use super::StepError;
use crate::chaindb::{catalog, ProposerSlashingStore, TxScope};
use crate::domain::HeaderRootHasher;

pub type StepFn = fn(&StepContext<'_, '_>) -> Result<(), StepError>;

/// 具名升级步骤
#[derive(Clone, Copy)]
pub struct Step {
    pub name: &'static str,
    pub run: StepFn,
}

impl Step {
    pub const fn new(name: &'static str, run: StepFn) -> Self {
        Self { name, run }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

/// 需要修改列约束时的 SQLite 表重建描述
///
/// SQLite 不支持 `ALTER COLUMN ... [DROP|SET] NOT NULL`，只能重建：
/// 清理残留 `<table>_new` → 以新列定义建表 → 复制数据 → 删除旧表 → 改名 → 重建索引。
#[derive(Debug, Clone, Copy)]
pub struct TableRebuild<'s> {
    pub table: &'s str,
    /// `CREATE TABLE <table>_new (...)` 括号内的列定义
    pub column_defs: &'s str,
    /// 从旧表复制的列
    pub columns: &'s [&'s str],
    /// 重建后执行的索引语句
    pub indexes: &'s [&'s str],
}

/// 步骤执行上下文
pub struct StepContext<'a, 'conn> {
    scope: &'a TxScope<'conn>,
    store: &'a dyn ProposerSlashingStore,
    hasher: &'a dyn HeaderRootHasher,
}

impl<'a, 'conn> StepContext<'a, 'conn> {
    pub fn new(
        scope: &'a TxScope<'conn>,
        store: &'a dyn ProposerSlashingStore,
        hasher: &'a dyn HeaderRootHasher,
    ) -> Self {
        Self {
            scope,
            store,
            hasher,
        }
    }

    /// 升级事务
    pub fn tx(&self) -> Result<&'a Transaction<'conn>, StepError> {
        self.scope
            .tx()
            .map_err(|e| StepError::db("upgrade transaction unavailable", e))
    }

    pub fn store(&self) -> &'a dyn ProposerSlashingStore {
        self.store
    }

    pub fn hasher(&self) -> &'a dyn HeaderRootHasher {
        self.hasher
    }

    /// 在升级事务内执行 SQL；失败时以 `context` 描述包装错误
    pub fn execute(&self, sql: &str, context: &str) -> Result<(), StepError> {
        self.tx()?
            .execute_batch(sql)
            .map_err(|e| StepError::sql(context, e))
    }

    /// 在升级事务内探测列是否存在
    pub fn column_exists(&self, table_name: &str, column_name: &str) -> Result<bool, StepError> {
        catalog::column_exists(self.tx()?, table_name, column_name).map_err(|e| {
            StepError::db(
                format!("failed to check if {} is present in {}", column_name, table_name),
                e,
            )
        })
    }

    /// 列是否带 NOT NULL 约束（列不存在时为 `None`）
    pub fn column_is_not_null(
        &self,
        table_name: &str,
        column_name: &str,
    ) -> Result<Option<bool>, StepError> {
        catalog::column_is_not_null(self.tx()?, table_name, column_name).map_err(|e| {
            StepError::db(
                format!("failed to read constraints of {}.{}", table_name, column_name),
                e,
            )
        })
    }

    /// 在升级事务内重建表
    pub fn rebuild_table(&self, rebuild: &TableRebuild<'_>) -> Result<(), StepError> {
        let table = rebuild.table;
        let new_table = format!("{}_new", table);
        let columns = rebuild.columns.join(", ");

        // 清理之前失败运行可能遗留的中间表
        self.execute(
            &format!("DROP TABLE IF EXISTS {}", new_table),
            &format!("failed to drop stale {}", new_table),
        )?;
        self.execute(
            &format!("CREATE TABLE {} ({})", new_table, rebuild.column_defs),
            &format!("failed to create {}", new_table),
        )?;
        self.execute(
            &format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                new_table, columns, columns, table
            ),
            &format!("failed to copy rows from {} into {}", table, new_table),
        )?;
        self.execute(
            &format!("DROP TABLE {}", table),
            &format!("failed to drop {}", table),
        )?;
        self.execute(
            &format!("ALTER TABLE {} RENAME TO {}", new_table, table),
            &format!("failed to rename {} to {}", new_table, table),
        )?;
        for index in rebuild.indexes {
            self.execute(index, &format!("failed to recreate index on {}", table))?;
        }

        tracing::debug!("[SchemaUpgrader] Rebuilt table {}", table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaindb::{ChainDb, DbError, ProposerSlashing};
    use crate::domain::SszHeaderHasher;
    use assert_matches::assert_matches;
    use rusqlite::Connection;

    struct NoStore;

    impl ProposerSlashingStore for NoStore {
        fn proposer_slashings_for_slot_range(
            &self,
            _conn: &Connection,
            _from_slot: u64,
            _to_slot: u64,
        ) -> Result<Vec<ProposerSlashing>, DbError> {
            Ok(Vec::new())
        }

        fn set_proposer_slashing(
            &self,
            _conn: &Connection,
            _slashing: &ProposerSlashing,
        ) -> Result<(), DbError> {
            Ok(())
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t_items (f_id INTEGER NOT NULL PRIMARY KEY, f_value INTEGER NOT NULL);
             CREATE INDEX i_items_1 ON t_items(f_value);
             INSERT INTO t_items VALUES (1, 10), (2, 20);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_rebuild_relaxes_constraint_and_keeps_rows() {
        let mut conn = test_conn();
        {
            let mut scope = TxScope::begin(&mut conn).unwrap();
            let ctx = StepContext::new(&scope, &NoStore, &SszHeaderHasher);
            assert_eq!(ctx.column_is_not_null("t_items", "f_value").unwrap(), Some(true));

            ctx.rebuild_table(&TableRebuild {
                table: "t_items",
                column_defs: "f_id INTEGER NOT NULL PRIMARY KEY, f_value INTEGER",
                columns: &["f_id", "f_value"],
                indexes: &["CREATE INDEX IF NOT EXISTS i_items_1 ON t_items(f_value)"],
            })
            .unwrap();
            assert_eq!(ctx.column_is_not_null("t_items", "f_value").unwrap(), Some(false));
            scope.commit().unwrap();
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
        assert!(catalog::index_exists(&conn, "i_items_1").unwrap());
        assert!(!catalog::table_exists(&conn, "t_items_new").unwrap());
    }

    #[test]
    fn test_execute_wraps_errors_with_context() {
        let mut conn = test_conn();
        let scope = TxScope::begin(&mut conn).unwrap();
        let ctx = StepContext::new(&scope, &NoStore, &SszHeaderHasher);
        let err = ctx
            .execute("CREATE TABLE t_items (f_id INTEGER)", "failed to create items table")
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to create items table"));
        assert_matches!(err, StepError::Sql { .. });
    }

    #[test]
    fn test_finished_scope_is_no_transaction() {
        let mut conn = test_conn();
        let mut scope = TxScope::begin(&mut conn).unwrap();
        scope.cancel();
        let ctx = StepContext::new(&scope, &NoStore, &SszHeaderHasher);
        let err = ctx.execute("SELECT 1", "unreachable").unwrap_err();
        assert!(err.is_no_transaction());
    }

    #[test]
    fn test_chain_db_is_a_store() {
        fn assert_store<T: ProposerSlashingStore>() {}
        assert_store::<ChainDb>();
    }
}
