//! 提议者罚没记录读写
//!
//! 升级步骤通过 [`ProposerSlashingStore`] 读写记录，只依赖"按 slot 区间读取"
//! 与"按身份 upsert"两个能力。

use rusqlite::{params, Connection, Row};

use super::{ChainDb, DbError};
use crate::domain::{BeaconBlockHeader, HashError, Root};

/// 覆盖全部记录的最大 slot（SQLite INTEGER 上限）
pub const MAX_SLOT: u64 = 0x7fff_ffff_ffff_ffff;

const SELECT_COLUMNS: &str = "
       f_inclusion_slot
      ,f_inclusion_block_root
      ,f_inclusion_index
      ,f_header_1_slot
      ,f_header_1_proposer_index
      ,f_header_1_parent_root
      ,f_header_1_state_root
      ,f_header_1_body_root
      ,f_header_1_signature
      ,f_header_2_slot
      ,f_header_2_proposer_index
      ,f_header_2_parent_root
      ,f_header_2_state_root
      ,f_header_2_body_root
      ,f_header_2_signature
      ,f_block_1_root
      ,f_block_2_root";

/// `t_proposer_slashings` 中的一行
///
/// 根字段保留数据库中的原始字节，转换为 [`Root`] 时再校验长度。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposerSlashing {
    pub inclusion_slot: u64,
    pub inclusion_block_root: Vec<u8>,
    pub inclusion_index: u64,
    pub header_1_slot: u64,
    pub header_1_proposer_index: u64,
    pub header_1_parent_root: Vec<u8>,
    pub header_1_state_root: Vec<u8>,
    pub header_1_body_root: Vec<u8>,
    pub header_1_signature: Vec<u8>,
    pub header_2_slot: u64,
    pub header_2_proposer_index: u64,
    pub header_2_parent_root: Vec<u8>,
    pub header_2_state_root: Vec<u8>,
    pub header_2_body_root: Vec<u8>,
    pub header_2_signature: Vec<u8>,
    pub block_1_root: Option<Vec<u8>>,
    pub block_2_root: Option<Vec<u8>>,
}

impl ProposerSlashing {
    pub fn header_1(&self) -> Result<BeaconBlockHeader, HashError> {
        Ok(BeaconBlockHeader {
            slot: self.header_1_slot,
            proposer_index: self.header_1_proposer_index,
            parent_root: Root::from_slice("header_1_parent_root", &self.header_1_parent_root)?,
            state_root: Root::from_slice("header_1_state_root", &self.header_1_state_root)?,
            body_root: Root::from_slice("header_1_body_root", &self.header_1_body_root)?,
        })
    }

    pub fn header_2(&self) -> Result<BeaconBlockHeader, HashError> {
        Ok(BeaconBlockHeader {
            slot: self.header_2_slot,
            proposer_index: self.header_2_proposer_index,
            parent_root: Root::from_slice("header_2_parent_root", &self.header_2_parent_root)?,
            state_root: Root::from_slice("header_2_state_root", &self.header_2_state_root)?,
            body_root: Root::from_slice("header_2_body_root", &self.header_2_body_root)?,
        })
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            inclusion_slot: row.get::<_, i64>(0)? as u64,
            inclusion_block_root: row.get(1)?,
            inclusion_index: row.get::<_, i64>(2)? as u64,
            header_1_slot: row.get::<_, i64>(3)? as u64,
            header_1_proposer_index: row.get::<_, i64>(4)? as u64,
            header_1_parent_root: row.get(5)?,
            header_1_state_root: row.get(6)?,
            header_1_body_root: row.get(7)?,
            header_1_signature: row.get(8)?,
            header_2_slot: row.get::<_, i64>(9)? as u64,
            header_2_proposer_index: row.get::<_, i64>(10)? as u64,
            header_2_parent_root: row.get(11)?,
            header_2_state_root: row.get(12)?,
            header_2_body_root: row.get(13)?,
            header_2_signature: row.get(14)?,
            block_1_root: row.get(15)?,
            block_2_root: row.get(16)?,
        })
    }
}

/// 提议者罚没记录的数据访问能力（由宿主服务提供）
pub trait ProposerSlashingStore: Send + Sync {
    /// 读取 `from_slot..=to_slot` 范围内包含的全部记录
    fn proposer_slashings_for_slot_range(
        &self,
        conn: &Connection,
        from_slot: u64,
        to_slot: u64,
    ) -> Result<Vec<ProposerSlashing>, DbError>;

    /// 按 (inclusion_slot, inclusion_block_root, inclusion_index) 写入或更新
    fn set_proposer_slashing(
        &self,
        conn: &Connection,
        slashing: &ProposerSlashing,
    ) -> Result<(), DbError>;
}

fn to_sql_int(field: &'static str, value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::InvalidValue {
        field,
        reason: format!("{} exceeds the INTEGER range", value),
    })
}

impl ProposerSlashingStore for ChainDb {
    fn proposer_slashings_for_slot_range(
        &self,
        conn: &Connection,
        from_slot: u64,
        to_slot: u64,
    ) -> Result<Vec<ProposerSlashing>, DbError> {
        let sql = format!(
            "SELECT {}
             FROM t_proposer_slashings
             WHERE f_inclusion_slot >= ?1 AND f_inclusion_slot <= ?2
             ORDER BY f_inclusion_slot, f_inclusion_index",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                to_sql_int("from_slot", from_slot)?,
                to_sql_int("to_slot", to_slot)?
            ],
            ProposerSlashing::from_row,
        )?;

        let mut slashings = Vec::new();
        for row in rows {
            slashings.push(row?);
        }
        Ok(slashings)
    }

    fn set_proposer_slashing(
        &self,
        conn: &Connection,
        slashing: &ProposerSlashing,
    ) -> Result<(), DbError> {
        conn.execute(
            "INSERT INTO t_proposer_slashings (
               f_inclusion_slot
              ,f_inclusion_block_root
              ,f_inclusion_index
              ,f_header_1_slot
              ,f_header_1_proposer_index
              ,f_header_1_parent_root
              ,f_header_1_state_root
              ,f_header_1_body_root
              ,f_header_1_signature
              ,f_header_2_slot
              ,f_header_2_proposer_index
              ,f_header_2_parent_root
              ,f_header_2_state_root
              ,f_header_2_body_root
              ,f_header_2_signature
              ,f_block_1_root
              ,f_block_2_root
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT (f_inclusion_slot, f_inclusion_block_root, f_inclusion_index) DO UPDATE SET
               f_header_1_slot = excluded.f_header_1_slot
              ,f_header_1_proposer_index = excluded.f_header_1_proposer_index
              ,f_header_1_parent_root = excluded.f_header_1_parent_root
              ,f_header_1_state_root = excluded.f_header_1_state_root
              ,f_header_1_body_root = excluded.f_header_1_body_root
              ,f_header_1_signature = excluded.f_header_1_signature
              ,f_header_2_slot = excluded.f_header_2_slot
              ,f_header_2_proposer_index = excluded.f_header_2_proposer_index
              ,f_header_2_parent_root = excluded.f_header_2_parent_root
              ,f_header_2_state_root = excluded.f_header_2_state_root
              ,f_header_2_body_root = excluded.f_header_2_body_root
              ,f_header_2_signature = excluded.f_header_2_signature
              ,f_block_1_root = excluded.f_block_1_root
              ,f_block_2_root = excluded.f_block_2_root",
            params![
                to_sql_int("inclusion_slot", slashing.inclusion_slot)?,
                slashing.inclusion_block_root,
                to_sql_int("inclusion_index", slashing.inclusion_index)?,
                to_sql_int("header_1_slot", slashing.header_1_slot)?,
                to_sql_int("header_1_proposer_index", slashing.header_1_proposer_index)?,
                slashing.header_1_parent_root,
                slashing.header_1_state_root,
                slashing.header_1_body_root,
                slashing.header_1_signature,
                to_sql_int("header_2_slot", slashing.header_2_slot)?,
                to_sql_int("header_2_proposer_index", slashing.header_2_proposer_index)?,
                slashing.header_2_parent_root,
                slashing.header_2_state_root,
                slashing.header_2_body_root,
                slashing.header_2_signature,
                slashing.block_1_root,
                slashing.block_2_root,
            ],
        )?;
        Ok(())
    }
}
