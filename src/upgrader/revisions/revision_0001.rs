//! v0 -> v1
//!
//! - validator 纪元字段允许 NULL，`-1` 哨兵值改为 NULL
//! - 新增 deposits / chain spec / genesis / eth1 deposits 表
//! - 回填 proposer slashing 的区块根
//! - attestations 新增 aggregation indices
//!
//! 区块根回填后需要重新获取区块数据，因此标记 `requires_refetch`。

use crate::chaindb::proposer_slashings::MAX_SLOT;
use crate::upgrader::registry::Migration;
use crate::upgrader::step::{Step, StepContext, TableRebuild};
use crate::upgrader::StepError;

const STEPS: &[Step] = &[
    Step::new("validators_epoch_null", validators_epoch_null),
    Step::new("create_deposits", create_deposits),
    Step::new("create_chain_spec", create_chain_spec),
    Step::new("create_genesis", create_genesis),
    Step::new("add_proposer_slashing_block_roots", add_proposer_slashing_block_roots),
    Step::new("create_eth1_deposits", create_eth1_deposits),
    Step::new("add_attestation_aggregation_indices", add_attestation_aggregation_indices),
];

pub const MIGRATION: Migration = Migration::new(1, STEPS)
    .requires_refetch()
    .with_expected_tables(&["t_deposits", "t_chain_spec", "t_genesis", "t_eth1_deposits"])
    .with_expected_columns(&[
        ("t_proposer_slashings", "f_block_1_root"),
        ("t_proposer_slashings", "f_block_2_root"),
        ("t_attestations", "f_aggregation_indices"),
    ])
    .with_expected_indexes(&[
        "i_validators_1",
        "i_deposits_1",
        "i_proposer_slashings_1",
        "i_eth1_deposits_1",
        "i_eth1_deposits_2",
        "i_eth1_deposits_3",
        "i_eth1_deposits_4",
        "i_eth1_deposits_5",
    ]);

const VALIDATOR_EPOCH_COLUMNS: [&str; 4] = [
    "f_activation_eligibility_epoch",
    "f_activation_epoch",
    "f_exit_epoch",
    "f_withdrawable_epoch",
];

/// 允许 t_validators 的纪元字段为 NULL
fn validators_epoch_null(ctx: &StepContext<'_, '_>) -> Result<(), StepError> {
    // 先放开 NOT NULL 约束；已放开时跳过重建
    let mut constrained = false;
    for column in VALIDATOR_EPOCH_COLUMNS {
        if ctx.column_is_not_null("t_validators", column)? == Some(true) {
            constrained = true;
        }
    }
    if constrained {
        ctx.rebuild_table(&TableRebuild {
            table: "t_validators",
            column_defs: "
  f_public_key                   BLOB NOT NULL PRIMARY KEY
 ,f_index                        INTEGER NOT NULL
 ,f_slashed                      INTEGER NOT NULL
 ,f_activation_eligibility_epoch INTEGER
 ,f_activation_epoch             INTEGER
 ,f_exit_epoch                   INTEGER
 ,f_withdrawable_epoch           INTEGER
 ,f_effective_balance            INTEGER NOT NULL",
            columns: &[
                "f_public_key",
                "f_index",
                "f_slashed",
                "f_activation_eligibility_epoch",
                "f_activation_epoch",
                "f_exit_epoch",
                "f_withdrawable_epoch",
                "f_effective_balance",
            ],
            indexes: &["CREATE UNIQUE INDEX IF NOT EXISTS i_validators_1 ON t_validators(f_index)"],
        })
        .map_err(|e| StepError::Failed(format!("failed to drop NOT NULL constraints on t_validators: {}", e)))?;
    }

    // -1 改为 NULL
    for column in VALIDATOR_EPOCH_COLUMNS {
        ctx.execute(
            &format!("UPDATE t_validators SET {0} = NULL WHERE {0} = -1", column),
            &format!("failed to change -1 to NULL on {}", column),
        )?;
    }

    Ok(())
}

/// 创建 t_deposits
fn create_deposits(ctx: &StepContext<'_, '_>) -> Result<(), StepError> {
    ctx.execute(
        "CREATE TABLE t_deposits (
  f_inclusion_slot         INTEGER NOT NULL
 ,f_inclusion_block_root   BLOB NOT NULL REFERENCES t_blocks(f_root) ON DELETE CASCADE
 ,f_inclusion_index        INTEGER NOT NULL
 ,f_validator_pubkey       BLOB NOT NULL
 ,f_withdrawal_credentials BLOB NOT NULL
 ,f_amount                 INTEGER NOT NULL
)",
        "failed to create deposits table",
    )?;

    ctx.execute(
        "CREATE UNIQUE INDEX i_deposits_1 ON t_deposits(f_inclusion_slot,f_inclusion_block_root,f_inclusion_index)",
        "failed to create deposits index",
    )
}

/// 创建 t_chain_spec
fn create_chain_spec(ctx: &StepContext<'_, '_>) -> Result<(), StepError> {
    ctx.execute(
        "CREATE TABLE t_chain_spec (
  f_key   TEXT NOT NULL PRIMARY KEY
 ,f_value TEXT NOT NULL
)",
        "failed to create chain spec table",
    )
}

/// 创建 t_genesis
fn create_genesis(ctx: &StepContext<'_, '_>) -> Result<(), StepError> {
    ctx.execute(
        "CREATE TABLE t_genesis (
  f_validators_root BLOB NOT NULL PRIMARY KEY
 ,f_time            TEXT NOT NULL
 ,f_fork_version    BLOB NOT NULL
)",
        "failed to create genesis table",
    )
}

/// 为 t_proposer_slashings 回填计算得到的区块根
fn add_proposer_slashing_block_roots(ctx: &StepContext<'_, '_>) -> Result<(), StepError> {
    // 先以可为 NULL 的形式加列
    ctx.execute(
        "ALTER TABLE t_proposer_slashings ADD COLUMN f_block_1_root BLOB",
        "failed to add f_block_1_root to proposer slashings table",
    )?;
    ctx.execute(
        "ALTER TABLE t_proposer_slashings ADD COLUMN f_block_2_root BLOB",
        "failed to add f_block_2_root to proposer slashings table",
    )?;

    // 取出全部已有记录逐条回填
    let tx = ctx.tx()?;
    let slashings = ctx
        .store()
        .proposer_slashings_for_slot_range(tx, 0, MAX_SLOT)
        .map_err(|e| StepError::db("failed to obtain current proposer slashings", e))?;
    let total = slashings.len();

    for mut slashing in slashings {
        let header_1 = slashing
            .header_1()
            .map_err(|e| StepError::hash("failed to calculate proposer slashing block 1 root", e))?;
        let block_1_root = ctx
            .hasher()
            .hash_tree_root(&header_1)
            .map_err(|e| StepError::hash("failed to calculate proposer slashing block 1 root", e))?;

        let header_2 = slashing
            .header_2()
            .map_err(|e| StepError::hash("failed to calculate proposer slashing block 2 root", e))?;
        let block_2_root = ctx
            .hasher()
            .hash_tree_root(&header_2)
            .map_err(|e| StepError::hash("failed to calculate proposer slashing block 2 root", e))?;

        slashing.block_1_root = Some(block_1_root.as_bytes().to_vec());
        slashing.block_2_root = Some(block_2_root.as_bytes().to_vec());
        ctx.store()
            .set_proposer_slashing(tx, &slashing)
            .map_err(|e| StepError::db("failed to update proposer slashing", e))?;
    }
    tracing::info!("[SchemaUpgrader] Backfilled block roots for {} proposer slashings", total);

    // 全部回填后收紧为 NOT NULL；仍有 NULL 时复制阶段即失败
    ctx.rebuild_table(&TableRebuild {
        table: "t_proposer_slashings",
        column_defs: "
  f_inclusion_slot           INTEGER NOT NULL
 ,f_inclusion_block_root     BLOB NOT NULL REFERENCES t_blocks(f_root) ON DELETE CASCADE
 ,f_inclusion_index          INTEGER NOT NULL
 ,f_header_1_slot            INTEGER NOT NULL
 ,f_header_1_proposer_index  INTEGER NOT NULL
 ,f_header_1_parent_root     BLOB NOT NULL
 ,f_header_1_state_root      BLOB NOT NULL
 ,f_header_1_body_root       BLOB NOT NULL
 ,f_header_1_signature       BLOB NOT NULL
 ,f_header_2_slot            INTEGER NOT NULL
 ,f_header_2_proposer_index  INTEGER NOT NULL
 ,f_header_2_parent_root     BLOB NOT NULL
 ,f_header_2_state_root      BLOB NOT NULL
 ,f_header_2_body_root       BLOB NOT NULL
 ,f_header_2_signature       BLOB NOT NULL
 ,f_block_1_root             BLOB NOT NULL
 ,f_block_2_root             BLOB NOT NULL",
        columns: &[
            "f_inclusion_slot",
            "f_inclusion_block_root",
            "f_inclusion_index",
            "f_header_1_slot",
            "f_header_1_proposer_index",
            "f_header_1_parent_root",
            "f_header_1_state_root",
            "f_header_1_body_root",
            "f_header_1_signature",
            "f_header_2_slot",
            "f_header_2_proposer_index",
            "f_header_2_parent_root",
            "f_header_2_state_root",
            "f_header_2_body_root",
            "f_header_2_signature",
            "f_block_1_root",
            "f_block_2_root",
        ],
        indexes: &["CREATE UNIQUE INDEX IF NOT EXISTS i_proposer_slashings_1 ON t_proposer_slashings(f_inclusion_slot,f_inclusion_block_root,f_inclusion_index)"],
    })
    .map_err(|e| {
        StepError::Failed(format!(
            "failed to add NOT NULL constraint for block roots to proposer slashings table: {}",
            e
        ))
    })
}

/// 创建 t_eth1_deposits（可重复执行）
fn create_eth1_deposits(ctx: &StepContext<'_, '_>) -> Result<(), StepError> {
    ctx.execute(
        "CREATE TABLE IF NOT EXISTS t_eth1_deposits (
  f_eth1_block_number      INTEGER NOT NULL
 ,f_eth1_block_hash        BLOB NOT NULL
 ,f_eth1_block_timestamp   TEXT NOT NULL
 ,f_eth1_tx_hash           BLOB NOT NULL
 ,f_eth1_log_index         INTEGER NOT NULL
 ,f_eth1_sender            BLOB NOT NULL
 ,f_eth1_recipient         BLOB NOT NULL
 ,f_eth1_gas_used          INTEGER NOT NULL
 ,f_eth1_gas_price         INTEGER NOT NULL
 ,f_deposit_index          INTEGER UNIQUE NOT NULL
 ,f_validator_pubkey       BLOB NOT NULL
 ,f_withdrawal_credentials BLOB NOT NULL
 ,f_signature              BLOB NOT NULL
 ,f_amount                 INTEGER NOT NULL
)",
        "failed to create Ethereum 1 deposits table",
    )?;

    const INDEXES: [(&str, &str); 5] = [
        (
            "CREATE UNIQUE INDEX IF NOT EXISTS i_eth1_deposits_1 ON t_eth1_deposits(f_eth1_block_hash, f_eth1_tx_hash, f_eth1_log_index)",
            "failed to create Ethereum 1 deposits index 1",
        ),
        (
            "CREATE INDEX IF NOT EXISTS i_eth1_deposits_2 ON t_eth1_deposits(f_validator_pubkey)",
            "failed to create Ethereum 1 deposits index 2",
        ),
        (
            "CREATE INDEX IF NOT EXISTS i_eth1_deposits_3 ON t_eth1_deposits(f_withdrawal_credentials)",
            "failed to create Ethereum 1 deposits index 3",
        ),
        (
            "CREATE INDEX IF NOT EXISTS i_eth1_deposits_4 ON t_eth1_deposits(f_eth1_sender)",
            "failed to create Ethereum 1 deposits index 4",
        ),
        (
            "CREATE INDEX IF NOT EXISTS i_eth1_deposits_5 ON t_eth1_deposits(f_eth1_recipient)",
            "failed to create Ethereum 1 deposits index 5",
        ),
    ];
    for (sql, context) in INDEXES {
        ctx.execute(sql, context)?;
    }

    Ok(())
}

/// 为 t_attestations 添加 aggregation indices（JSON 数组）
fn add_attestation_aggregation_indices(ctx: &StepContext<'_, '_>) -> Result<(), StepError> {
    // 早期部署曾手动执行过此变更，先确认列是否已存在
    if ctx.column_exists("t_attestations", "f_aggregation_indices")? {
        tracing::info!("[SchemaUpgrader] t_attestations.f_aggregation_indices already present, skipping");
        return Ok(());
    }

    ctx.execute(
        "ALTER TABLE t_attestations ADD COLUMN f_aggregation_indices TEXT",
        "failed to add f_aggregation_indices to attestations table",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaindb::{catalog, ChainDb, TxScope};
    use crate::config::PoolConfig;
    use crate::domain::SszHeaderHasher;
    use tempfile::TempDir;

    fn create_test_db() -> (ChainDb, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = ChainDb::open(&temp_dir.path().join("chain.db"), &PoolConfig::default()).unwrap();
        db.ensure_base_schema().unwrap();
        (db, temp_dir)
    }

    fn run_step(db: &ChainDb, step: fn(&StepContext<'_, '_>) -> Result<(), StepError>) -> Result<(), StepError> {
        let mut conn = db.get_conn().unwrap();
        let mut scope = TxScope::begin(&mut conn).unwrap();
        let result = step(&StepContext::new(&scope, db, &SszHeaderHasher));
        if result.is_ok() {
            scope.commit().unwrap();
        }
        result
    }

    fn column_count(db: &ChainDb, table: &str, column: &str) -> i64 {
        let conn = db.get_conn().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            [table, column],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_aggregation_indices_probe_is_reentrant() {
        let (db, _temp_dir) = create_test_db();
        run_step(&db, add_attestation_aggregation_indices).unwrap();
        run_step(&db, add_attestation_aggregation_indices).unwrap();
        assert_eq!(column_count(&db, "t_attestations", "f_aggregation_indices"), 1);
    }

    #[test]
    fn test_aggregation_indices_tolerates_manual_change() {
        let (db, _temp_dir) = create_test_db();
        db.get_conn()
            .unwrap()
            .execute_batch("ALTER TABLE t_attestations ADD COLUMN f_aggregation_indices TEXT")
            .unwrap();
        run_step(&db, add_attestation_aggregation_indices).unwrap();
        assert_eq!(column_count(&db, "t_attestations", "f_aggregation_indices"), 1);
    }

    #[test]
    fn test_eth1_deposits_is_reentrant() {
        let (db, _temp_dir) = create_test_db();
        run_step(&db, create_eth1_deposits).unwrap();
        run_step(&db, create_eth1_deposits).unwrap();
        let conn = db.get_conn().unwrap();
        for index in 1..=5 {
            assert!(catalog::index_exists(&conn, &format!("i_eth1_deposits_{}", index)).unwrap());
        }
    }

    #[test]
    fn test_create_deposits_fails_loudly_on_rerun() {
        let (db, _temp_dir) = create_test_db();
        run_step(&db, create_deposits).unwrap();
        let err = run_step(&db, create_deposits).unwrap_err();
        assert!(err.to_string().contains("failed to create deposits table"));
    }

    #[test]
    fn test_validators_epoch_null_is_reentrant() {
        let (db, _temp_dir) = create_test_db();
        db.get_conn()
            .unwrap()
            .execute(
                "INSERT INTO t_validators VALUES (x'01', 0, 0, -1, -1, -1, -1, 32000000000)",
                [],
            )
            .unwrap();

        run_step(&db, validators_epoch_null).unwrap();
        run_step(&db, validators_epoch_null).unwrap();

        let conn = db.get_conn().unwrap();
        for column in VALIDATOR_EPOCH_COLUMNS {
            assert_eq!(
                catalog::column_is_not_null(&conn, "t_validators", column).unwrap(),
                Some(false)
            );
        }
        let nulls: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM t_validators WHERE f_exit_epoch IS NULL AND f_activation_epoch IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(nulls, 1);
        assert!(catalog::index_exists(&conn, "i_validators_1").unwrap());
    }

    #[test]
    fn test_block_root_backfill_without_rows() {
        let (db, _temp_dir) = create_test_db();
        run_step(&db, add_proposer_slashing_block_roots).unwrap();
        let conn = db.get_conn().unwrap();
        assert_eq!(
            catalog::column_is_not_null(&conn, "t_proposer_slashings", "f_block_1_root").unwrap(),
            Some(true)
        );
        assert!(catalog::index_exists(&conn, "i_proposer_slashings_1").unwrap());
    }
}
