//! 远程命名空间初始化
//!
//! 在任何远程操作之前确保运行时集群上存在同步目标命名空间。

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kyma_common::{
    sync_timestamp, Kyma, LAST_SYNC_ANNOTATION, MANAGED_BY_LABEL, OPERATOR_NAME,
    SYNC_FIELD_MANAGER,
};
use std::collections::BTreeMap;
use tracing::debug;

use super::client::ApplyOptions;
use super::context::KymaSynchronizationContext;
use crate::error::Result;

impl KymaSynchronizationContext {
    /// 确保远程命名空间存在，命名空间名称按以下顺序确定：
    /// 1. `spec.sync.namespace`（如果设置）
    /// 2. 控制平面 Kyma 的命名空间
    ///
    /// 使用服务端应用并强制接管字段，重复执行不会与自身冲突。
    pub async fn ensure_remote_namespace_exists(&self, kyma: &Kyma) -> Result<()> {
        let name = kyma.sync_namespace()?;
        let namespace = remote_namespace(&name);
        let options = ApplyOptions::force(SYNC_FIELD_MANAGER);

        self.guarded(
            "确保远程命名空间存在",
            &name,
            self.runtime.apply_namespace(&namespace, &options),
        )
        .await?;

        debug!("远程命名空间 {} 已就绪", name);
        Ok(())
    }
}

/// 构建只包含托管标签和同步时间注解的命名空间
fn remote_namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                OPERATOR_NAME.to_string(),
            )])),
            annotations: Some(BTreeMap::from([(
                LAST_SYNC_ANNOTATION.to_string(),
                sync_timestamp(),
            )])),
            ..Default::default()
        },
        ..Default::default()
    }
}
