//! 链数据领域类型
//!
//! 升级器只关心回填派生字段所需的最小结构：区块头及其哈希根。
//! 具体的哈希函数通过 [`HeaderRootHasher`] 注入。

pub mod ssz;

use std::fmt;

pub use ssz::SszHeaderHasher;

/// 32 字节哈希根
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Root(pub [u8; 32]);

impl Root {
    pub const LEN: usize = 32;

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// 从数据库中读出的原始字节构造；长度不为 32 时报错
    pub fn from_slice(field: &'static str, bytes: &[u8]) -> Result<Self, HashError> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| HashError::InvalidRootLength { field, len: bytes.len() })?;
        Ok(Self(array))
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// 信标链区块头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconBlockHeader {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: Root,
    pub state_root: Root,
    pub body_root: Root,
}

/// 派生哈希计算错误
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("Invalid length for {field}: expected 32 bytes, got {len}")]
    InvalidRootLength { field: &'static str, len: usize },

    #[error("Hash computation failed: {0}")]
    Computation(String),
}

/// 区块头哈希根计算（由宿主领域注入的纯函数）
pub trait HeaderRootHasher: Send + Sync {
    fn hash_tree_root(&self, header: &BeaconBlockHeader) -> Result<Root, HashError>;
}
