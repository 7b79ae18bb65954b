//! Kyma 同步上下文
//!
//! 每次协调创建一个上下文，持有控制平面与运行时集群的客户端，协调结束后丢弃。
//! 上下文不跨协调保存任何状态，也不持有被同步的对象。

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use kube::Resource;
use kyma_common::Kyma;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::client::{ClientError, ClusterClient};
use super::lookup::RemoteClientResolver;
use crate::error::{Result, SyncError};
use crate::events::EventPublisher;

/// Kyma 同步上下文
pub struct KymaSynchronizationContext {
    /// 控制平面客户端
    pub(crate) control_plane: Arc<dyn ClusterClient>,
    /// 运行时集群客户端
    pub(crate) runtime: Arc<dyn ClusterClient>,
    /// 事件发布器
    pub(crate) recorder: Arc<dyn EventPublisher>,
    /// 取消令牌
    cancel: CancellationToken,
}

impl KymaSynchronizationContext {
    /// 使用已解析的客户端创建上下文
    pub fn new(
        control_plane: Arc<dyn ClusterClient>,
        runtime: Arc<dyn ClusterClient>,
        recorder: Arc<dyn EventPublisher>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            control_plane,
            runtime,
            recorder,
            cancel,
        }
    }

    /// 解析远程客户端并确保远程命名空间存在
    pub async fn initialize(
        control_plane: Arc<dyn ClusterClient>,
        resolver: &dyn RemoteClientResolver,
        recorder: Arc<dyn EventPublisher>,
        cancel: CancellationToken,
        kyma: &Kyma,
    ) -> Result<Self> {
        let key = kyma.object_key()?;
        let runtime = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(SyncError::Cancelled { operation: "解析远程客户端" });
            }
            runtime = resolver.resolve(kyma) => runtime?,
        };
        debug!("已解析 Kyma {} 的远程客户端", key);

        let context = Self::new(control_plane, runtime, recorder, cancel);
        context.ensure_remote_namespace_exists(kyma).await?;

        Ok(context)
    }

    /// 控制平面客户端
    pub fn control_plane_client(&self) -> &Arc<dyn ClusterClient> {
        &self.control_plane
    }

    /// 运行时集群客户端
    pub fn runtime_client(&self) -> &Arc<dyn ClusterClient> {
        &self.runtime
    }

    /// 获取远程镜像 Kyma
    pub async fn get_remotely_synced_kyma(&self, kyma: &Kyma) -> Result<Kyma> {
        let key = kyma.remote_object_key()?;
        self.guarded("获取远程 Kyma", &key, self.runtime.get_kyma(&key))
            .await
    }

    /// 执行远程调用，取消令牌触发时立即返回 `Cancelled`
    pub(crate) async fn cancellable<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled { operation }),
            output = call => Ok(output),
        }
    }

    /// 执行远程调用并为错误附加操作名称和对象标识
    pub(crate) async fn guarded<T, F>(
        &self,
        operation: &'static str,
        target: impl Display,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ClientError>>,
    {
        self.cancellable(operation, call)
            .await?
            .map_err(|source| SyncError::Remote {
                operation,
                target: target.to_string(),
                source,
            })
    }

    /// 在控制平面对象上发布 Normal 事件
    pub(crate) async fn normal_event(&self, kyma: &Kyma, reason: &str, action: &str, note: &str) {
        self.recorder
            .publish(
                &object_reference(kyma),
                EventType::Normal,
                reason,
                action,
                Some(note.to_string()),
            )
            .await;
    }

    /// 在控制平面对象上发布 Warning 事件，错误信息作为事件原因
    pub(crate) async fn warning_event(
        &self,
        kyma: &Kyma,
        error: &SyncError,
        action: &str,
        note: &str,
    ) {
        self.recorder
            .publish(
                &object_reference(kyma),
                EventType::Warning,
                &error.to_string(),
                action,
                Some(note.to_string()),
            )
            .await;
    }
}

fn object_reference(kyma: &Kyma) -> ObjectReference {
    kyma.object_ref(&())
}
