//! 同步错误模块
//!
//! 所有远程操作失败都会附带操作名称和对象标识返回给调用方，
//! 同步上下文内部不做重试。

use kyma_common::ErrorKind;
use thiserror::Error;

use crate::remote::{ClientError, LookupError};

/// 同步上下文错误类型
#[derive(Error, Debug)]
pub enum SyncError {
    /// 无法解析远程集群客户端
    #[error("无法解析 {target} 的远程集群客户端: {source}")]
    RemoteUnreachable {
        /// 控制平面对象标识
        target: String,
        /// 解析错误
        #[source]
        source: LookupError,
    },

    /// 远程操作失败
    #[error("{operation} {target} 失败: {source}")]
    Remote {
        /// 操作名称
        operation: &'static str,
        /// 操作对象
        target: String,
        /// 客户端错误
        #[source]
        source: ClientError,
    },

    /// 操作被取消
    #[error("{operation} 已取消")]
    Cancelled {
        /// 操作名称
        operation: &'static str,
    },

    /// 对象模型错误
    #[error(transparent)]
    Model(#[from] kyma_common::Error),
}

impl SyncError {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::RemoteUnreachable { .. } => ErrorKind::RemoteUnreachable,
            SyncError::Remote { source, .. } => source.kind(),
            SyncError::Cancelled { .. } => ErrorKind::Cancelled,
            SyncError::Model(_) => ErrorKind::Other,
        }
    }

    /// 是否为对象不存在
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// 同步结果类型别名
pub type Result<T> = std::result::Result<T, SyncError>;
