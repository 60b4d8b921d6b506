//! chaindb-schema
//!
//! 链数据索引服务的 SQLite schema 版本升级引擎。
//!
//! - [`chaindb`]：连接池、事务作用域、元数据与 catalog 探测、领域读写
//! - [`upgrader`]：版本检测、迁移注册表、单事务升级执行
//! - [`domain`]：区块头与 SSZ 哈希
//! - [`config`]：升级器配置加载

pub mod chaindb;
pub mod config;
pub mod domain;
pub mod upgrader;

pub use chaindb::ChainDb;
pub use upgrader::{SchemaUpgrader, UpgradeError, UpgradeReport, UpgradeStatus};
