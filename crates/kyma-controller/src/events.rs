//! 事件记录模块
//!
//! 对 `kube::runtime::events::Recorder` 的封装。事件只用于审计，
//! 发布失败只记录告警日志，不会影响同步流程。

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// 事件发布器
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// 在指定对象上发布事件
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// 基于 kube Recorder 的事件发布器
pub struct KubeEventPublisher {
    client: Client,
    reporter: Reporter,
}

impl KubeEventPublisher {
    /// 创建新的事件发布器，`controller_name` 会作为事件的上报组件
    pub fn new(client: Client, controller_name: &str) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller_name.to_string(),
                instance: None,
            },
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            resource_ref.clone(),
        );
        let (short_reason, note) = fit_reason(reason, note);
        let event = Event {
            type_,
            reason: short_reason,
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(event).await {
            warn!(reason, action, error = %e, "发布 Kubernetes 事件失败");
        }
    }
}

/// 事件原因的最大字节数，超出时 API 服务器会拒绝事件
pub const MAX_REASON_BYTES: usize = 128;

/// 按 UTF-8 字符边界截断事件原因
pub fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_REASON_BYTES {
        return reason;
    }
    let mut end = MAX_REASON_BYTES;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// 截断过长的事件原因，完整原因移入事件说明
fn fit_reason(reason: &str, note: Option<String>) -> (String, Option<String>) {
    let short_reason = truncate_reason(reason);
    if short_reason.len() == reason.len() {
        return (reason.to_string(), note);
    }
    let note = match note {
        Some(note) => format!("{reason}: {note}"),
        None => reason.to_string(),
    };
    (short_reason.to_string(), Some(note))
}

/// 空实现，忽略所有事件
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// 事件原因
pub mod reasons {
    /// CRD 已安装到运行时集群
    pub const CRD_INSTALLATION: &str = "CRDInstallation";
    /// Kyma 已安装到运行时集群
    pub const REMOTE_INSTALLATION: &str = "RemoteInstallation";
}

/// 事件动作
pub mod actions {
    /// 获取远程对象
    pub const FETCH: &str = "Fetch";
    /// 安装 CRD
    pub const INSTALL_CRD: &str = "InstallCRD";
    /// 创建远程对象
    pub const CREATE: &str = "Create";
    /// 更新远程对象
    pub const UPDATE: &str = "Update";
}
