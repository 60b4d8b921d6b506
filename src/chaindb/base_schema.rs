//! 版本 0 的基础 schema
//!
//! 由宿主服务在首次启动时创建，升级器在其上叠加版本化变更。
//! 全部使用 `IF NOT EXISTS`，对已升级的数据库无副作用。

use rusqlite::Connection;

use super::DbError;

pub const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS t_metadata (
  f_key   TEXT NOT NULL PRIMARY KEY
 ,f_value BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS t_blocks (
  f_slot                INTEGER NOT NULL
 ,f_proposer_index      INTEGER NOT NULL
 ,f_root                BLOB NOT NULL PRIMARY KEY
 ,f_graffiti            BLOB NOT NULL
 ,f_randao_reveal       BLOB NOT NULL
 ,f_body_root           BLOB NOT NULL
 ,f_parent_root         BLOB NOT NULL
 ,f_state_root          BLOB NOT NULL
 ,f_eth1_block_hash     BLOB NOT NULL
 ,f_eth1_deposit_count  INTEGER NOT NULL
 ,f_eth1_deposit_root   BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS i_blocks_1 ON t_blocks(f_slot);
CREATE INDEX IF NOT EXISTS i_blocks_2 ON t_blocks(f_parent_root);

CREATE TABLE IF NOT EXISTS t_validators (
  f_public_key                   BLOB NOT NULL PRIMARY KEY
 ,f_index                        INTEGER NOT NULL
 ,f_slashed                      INTEGER NOT NULL
 ,f_activation_eligibility_epoch INTEGER NOT NULL
 ,f_activation_epoch             INTEGER NOT NULL
 ,f_exit_epoch                   INTEGER NOT NULL
 ,f_withdrawable_epoch           INTEGER NOT NULL
 ,f_effective_balance            INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS i_validators_1 ON t_validators(f_index);

CREATE TABLE IF NOT EXISTS t_attestations (
  f_inclusion_slot       INTEGER NOT NULL
 ,f_inclusion_block_root BLOB NOT NULL REFERENCES t_blocks(f_root) ON DELETE CASCADE
 ,f_inclusion_index      INTEGER NOT NULL
 ,f_slot                 INTEGER NOT NULL
 ,f_committee_index      INTEGER NOT NULL
 ,f_aggregation_bits     BLOB NOT NULL
 ,f_beacon_block_root    BLOB NOT NULL
 ,f_source_epoch         INTEGER NOT NULL
 ,f_source_root          BLOB NOT NULL
 ,f_target_epoch         INTEGER NOT NULL
 ,f_target_root          BLOB NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS i_attestations_1 ON t_attestations(f_inclusion_slot,f_inclusion_block_root,f_inclusion_index);

CREATE TABLE IF NOT EXISTS t_proposer_slashings (
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
);
CREATE UNIQUE INDEX IF NOT EXISTS i_proposer_slashings_1 ON t_proposer_slashings(f_inclusion_slot,f_inclusion_block_root,f_inclusion_index);
";

/// 应用基础 schema
pub fn apply(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(BASE_SCHEMA)?;
    Ok(())
}
