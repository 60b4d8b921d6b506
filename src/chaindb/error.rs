//! ChainDb 数据访问层错误类型

/// 数据访问错误
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 调用方在没有活动事务的情况下执行了需要事务的操作
    #[error("No active transaction")]
    NoTransaction,

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl DbError {
    /// 是否为“无活动事务”哨兵错误（基础设施误用，而非数据库拒绝操作）
    pub fn is_no_transaction(&self) -> bool {
        matches!(self, DbError::NoTransaction)
    }
}
