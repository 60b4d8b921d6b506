//! # Transaction Scope (事务作用域)
//!
//! 一次升级运行中的全部工作都在同一个事务作用域内执行。
//!
//! - `begin`：开启 IMMEDIATE 事务（立即获取写锁，避免升级中途才发现锁冲突）
//! - `commit`：提交；提交失败时事务被回滚，错误原样返回
//! - `cancel`：回滚（可重复调用）
//! - `Drop`：作用域仍处于活动状态时自动回滚，保证任何退出路径都不会泄漏事务

use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::DbError;

/// 显式 begin/commit/cancel 的事务作用域
pub struct TxScope<'conn> {
    tx: Option<Transaction<'conn>>,
}

impl<'conn> TxScope<'conn> {
    /// 在给定连接上开启事务
    pub fn begin(conn: &'conn mut Connection) -> Result<Self, DbError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tracing::debug!("[TxScope] Transaction started");
        Ok(Self { tx: Some(tx) })
    }

    /// 获取活动事务
    ///
    /// 作用域已提交或已取消时返回 `DbError::NoTransaction`。
    pub fn tx(&self) -> Result<&Transaction<'conn>, DbError> {
        self.tx.as_ref().ok_or(DbError::NoTransaction)
    }

    pub fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    /// 提交事务
    ///
    /// rusqlite 在 COMMIT 失败后丢弃 `Transaction` 时会执行回滚，
    /// 因此失败的提交不会留下半提交状态。
    pub fn commit(&mut self) -> Result<(), DbError> {
        let tx = self.tx.take().ok_or(DbError::NoTransaction)?;
        tx.commit()?;
        tracing::debug!("[TxScope] Transaction committed");
        Ok(())
    }

    /// 取消（回滚）事务；作用域已结束时为空操作
    pub fn cancel(&mut self) {
        if let Some(tx) = self.tx.take() {
            match tx.rollback() {
                Ok(()) => tracing::debug!("[TxScope] Transaction rolled back"),
                Err(e) => tracing::error!("[TxScope] Rollback failed: {}", e),
            }
        }
    }
}

impl Drop for TxScope<'_> {
    fn drop(&mut self) {
        if self.is_active() {
            tracing::warn!("[TxScope] Scope dropped while still active, rolling back");
            self.cancel();
        }
    }
}
