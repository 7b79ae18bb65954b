//! Kyma Common - 控制平面与运行时集群共享的数据结构
//!
//! 该模块提供 Kyma 同步组件共享的数据结构和错误处理。
//! 包括 Kyma 自定义资源、标签/注解常量以及统一的错误分类。

pub mod models;
pub mod error;

/// 重新导出常用类型，方便使用
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;
pub use models::kyma::*;
pub use models::meta::*;
