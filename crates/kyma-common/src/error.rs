//! 错误处理模块
//!
//! 该模块提供统一的错误类型以及同步过程中使用的错误分类，
//! 调用方可以据此决定重试或上报失败状态。

use std::fmt;
use thiserror::Error;

/// 同步错误分类
///
/// 远程调用失败时会被归入其中一类。只有 `SchemaMissing` 会在同步上下文内部处理，
/// 其余分类均原样返回给调用方。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 无法连接或解析远程集群
    RemoteUnreachable,
    /// 对象不存在
    NotFound,
    /// 远程集群缺少 CRD
    SchemaMissing,
    /// 写入冲突
    Conflict,
    /// 操作被取消
    Cancelled,
    /// 其他错误
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RemoteUnreachable => write!(f, "RemoteUnreachable"),
            ErrorKind::NotFound => write!(f, "NotFound"),
            ErrorKind::SchemaMissing => write!(f, "SchemaMissing"),
            ErrorKind::Conflict => write!(f, "Conflict"),
            ErrorKind::Cancelled => write!(f, "Cancelled"),
            ErrorKind::Other => write!(f, "Other"),
        }
    }
}

/// Kyma 模型错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 对象缺少命名空间
    #[error("对象 {0} 缺少命名空间")]
    MissingNamespace(String),

    /// 对象缺少名称
    #[error("对象缺少名称")]
    MissingName,

    /// JSON 错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, Error>;
