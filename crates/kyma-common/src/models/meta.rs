//! 对象元数据模型
//!
//! 该模块定义了对象标识以及与运行时观察组件约定的标签、注解常量。
//! 这些常量需要与其他组件保持一致，不能随意修改。

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Operator 前缀
pub const OPERATOR_PREFIX: &str = "operator.kyma-project.io";

/// Operator 名称，用作 managed-by 与 watched-by 的取值
pub const OPERATOR_NAME: &str = "lifecycle-manager";

/// 托管标签
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// 所属控制平面对象标签
pub const OWNED_BY_LABEL: &str = "owned-by";

/// 观察者标签
pub const WATCHED_BY_LABEL: &str = "watched-by";

/// 上次同步时间注解
pub const LAST_SYNC_ANNOTATION: &str = "last-synchronized";

/// 标记 kubeconfig Secret 所属 Kyma 的标签
pub const KYMA_NAME_LABEL: &str = "operator.kyma-project.io/kyma-name";

/// Kyma 终结器
pub const KYMA_FINALIZER: &str = "operator.kyma-project.io/Kyma";

/// 命名空间服务端应用时使用的字段管理者
pub const SYNC_FIELD_MANAGER: &str = "kyma-sync-context";

/// 对象标识（命名空间 + 名称）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// 命名空间
    pub namespace: String,
    /// 名称
    pub name: String,
}

impl ObjectKey {
    /// 创建新的对象标识
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// owned-by 标签的取值：`<namespace>/<name>`
pub fn owned_by_value(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// 格式化同步时间戳（RFC 3339，秒级精度，UTC）
pub fn format_sync_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 当前时间的同步时间戳
pub fn sync_timestamp() -> String {
    format_sync_timestamp(Utc::now())
}
