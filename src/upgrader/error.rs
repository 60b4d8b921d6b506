//! 升级错误类型

use crate::chaindb::DbError;
use crate::domain::HashError;

/// 单个升级步骤的错误（附带步骤内的操作上下文）
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{context}: {source}")]
    Sql {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{context}: {source}")]
    Db {
        context: String,
        #[source]
        source: DbError,
    },

    #[error("{context}: {source}")]
    Hash {
        context: String,
        #[source]
        source: HashError,
    },

    #[error("{0}")]
    Failed(String),
}

impl StepError {
    pub fn sql(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Sql {
            context: context.into(),
            source,
        }
    }

    pub fn db(context: impl Into<String>, source: DbError) -> Self {
        Self::Db {
            context: context.into(),
            source,
        }
    }

    pub fn hash(context: impl Into<String>, source: HashError) -> Self {
        Self::Hash {
            context: context.into(),
            source,
        }
    }

    pub fn is_no_transaction(&self) -> bool {
        matches!(self, Self::Db { source, .. } if source.is_no_transaction())
    }
}

/// 升级错误
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error("Failed to obtain database connection: {0}")]
    Connection(#[source] DbError),

    #[error("Failed to obtain schema version: {0}")]
    VersionRead(#[source] DbError),

    #[error("Failed to parse schema metadata: {0}")]
    MalformedMetadata(#[source] serde_json::Error),

    #[error("Database schema version {current} is newer than this binary supports ({supported})")]
    DatabaseNewer { current: u64, supported: u64 },

    #[error("Invalid migration registry: {0}")]
    InvalidRegistry(String),

    #[error("Failed to begin upgrade transaction: {0}")]
    BeginTx(#[source] DbError),

    #[error("Upgrade to version {version} failed in step '{step}': {source}")]
    Step {
        version: u64,
        step: &'static str,
        #[source]
        source: StepError,
    },

    #[error("Verification failed for version {version}: {reason}")]
    VerificationFailed { version: u64, reason: String },

    #[error("Failed to set latest schema version: {0}")]
    SetVersion(#[source] DbError),

    #[error("Failed to commit upgrade transaction: {0}")]
    Commit(#[source] DbError),
}

impl UpgradeError {
    /// 是否由"无活动事务"引起（基础设施误用，而非数据库拒绝了操作）
    pub fn is_no_transaction(&self) -> bool {
        match self {
            Self::Connection(e)
            | Self::VersionRead(e)
            | Self::BeginTx(e)
            | Self::SetVersion(e)
            | Self::Commit(e) => e.is_no_transaction(),
            Self::Step { source, .. } => source.is_no_transaction(),
            _ => false,
        }
    }
}
