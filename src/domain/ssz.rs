//! SSZ hash-tree-root（仅覆盖 `BeaconBlockHeader`）
//!
//! 区块头有 5 个字段，每个字段占一个 32 字节叶子（uint64 小端序后补零），
//! 叶子数补齐到 8 后两两 SHA-256 合并到根。

use sha2::{Digest, Sha256};

use super::{BeaconBlockHeader, HashError, HeaderRootHasher, Root};

const HEADER_LEAF_COUNT: usize = 8;

/// 基于 SHA-256 的默认区块头哈希实现
#[derive(Debug, Clone, Copy, Default)]
pub struct SszHeaderHasher;

impl HeaderRootHasher for SszHeaderHasher {
    fn hash_tree_root(&self, header: &BeaconBlockHeader) -> Result<Root, HashError> {
        let mut leaves = [[0u8; 32]; HEADER_LEAF_COUNT];
        leaves[0] = uint64_leaf(header.slot);
        leaves[1] = uint64_leaf(header.proposer_index);
        leaves[2] = header.parent_root.0;
        leaves[3] = header.state_root.0;
        leaves[4] = header.body_root.0;
        Ok(Root(merkleize(&leaves)))
    }
}

fn uint64_leaf(value: u64) -> [u8; 32] {
    let mut leaf = [0u8; 32];
    leaf[..8].copy_from_slice(&value.to_le_bytes());
    leaf
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

// leaves.len() 必须是 2 的幂
fn merkleize(leaves: &[[u8; 32]]) -> [u8; 32] {
    let mut layer = leaves.to_vec();
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }
    layer[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(slot: u64, proposer_index: u64, fill: [u8; 3]) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot,
            proposer_index,
            parent_root: Root([fill[0]; 32]),
            state_root: Root([fill[1]; 32]),
            body_root: Root([fill[2]; 32]),
        }
    }

    #[test]
    fn test_zero_header_root() {
        let root = SszHeaderHasher.hash_tree_root(&header(0, 0, [0, 0, 0])).unwrap();
        assert_eq!(
            hex::encode(root.0),
            "c78009fdf07fc56a11f122370658a353aaa542ed63e44c4bc15ff4cd105ab33c"
        );
    }

    #[test]
    fn test_known_header_root() {
        let root = SszHeaderHasher.hash_tree_root(&header(1, 2, [1, 2, 3])).unwrap();
        assert_eq!(
            hex::encode(root.0),
            "bb3917003756216bccee4f87d53d4e52b948b8190b14a552cb1e78fcede06dd5"
        );
    }

    #[test]
    fn test_root_depends_on_every_field() {
        let base = SszHeaderHasher.hash_tree_root(&header(1, 2, [1, 2, 3])).unwrap();
        let variants = [
            header(9, 2, [1, 2, 3]),
            header(1, 9, [1, 2, 3]),
            header(1, 2, [9, 2, 3]),
            header(1, 2, [1, 9, 3]),
            header(1, 2, [1, 2, 9]),
        ];
        for variant in variants {
            assert_ne!(SszHeaderHasher.hash_tree_root(&variant).unwrap(), base);
        }
    }
}
