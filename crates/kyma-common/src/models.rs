//! 数据模型模块
//!
//! 该模块定义了 Kyma 自定义资源以及同步过程中使用的标签、注解和对象标识。

pub mod kyma;
pub mod meta;
