//! Kyma 自定义资源模型
//!
//! 该模块定义了 Kyma 自定义资源。控制平面上的 Kyma 是期望状态的权威来源，
//! 运行时集群上同名的镜像对象由同步上下文维护。

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::models::meta::{sync_timestamp, ObjectKey, LAST_SYNC_ANNOTATION};

/// Kyma 规范
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.kyma-project.io",
    version = "v1beta1",
    kind = "Kyma",
    plural = "kymas",
    namespaced
)]
#[kube(status = "KymaStatus")]
#[kube(derive = "Default")]
#[kube(derive = "PartialEq")]
#[kube(printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#)]
#[serde(rename_all = "camelCase")]
pub struct KymaSpec {
    /// 默认发布通道
    #[serde(default)]
    pub channel: String,

    /// 模块列表，保持插入顺序
    #[serde(default)]
    pub modules: Vec<Module>,

    /// 同步配置
    #[serde(default)]
    pub sync: KymaSync,
}

/// 模块条目，名称是合并时的唯一键
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// 模块名称
    pub name: String,

    /// 模块使用的发布通道，为空时使用 Kyma 的默认通道
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// 负责该模块的控制器名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_name: Option<String>,
}

impl Module {
    /// 创建只有名称的模块条目
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 设置发布通道
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// 同步配置
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KymaSync {
    /// 是否启用同步
    #[serde(default)]
    pub enabled: bool,

    /// 远程客户端解析策略
    #[serde(default)]
    pub strategy: SyncStrategy,

    /// 远程命名空间覆盖，为空时使用控制平面对象的命名空间
    #[serde(default)]
    pub namespace: String,

    /// 创建镜像时不复制模块列表
    #[serde(default)]
    pub no_module_copy: bool,
}

/// 远程客户端解析策略
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStrategy {
    /// 从控制平面 Secret 中读取 kubeconfig
    #[default]
    Secret,
    /// 使用注入的本地客户端
    LocalClient,
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStrategy::Secret => write!(f, "secret"),
            SyncStrategy::LocalClient => write!(f, "local-client"),
        }
    }
}

/// Kyma 状态
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KymaStatus {
    /// 整体状态
    #[serde(default)]
    pub state: State,

    /// 上次操作
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,
}

/// 整体状态
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum State {
    /// 处理中
    #[default]
    Processing,
    /// 就绪
    Ready,
    /// 删除中
    Deleting,
    /// 出错
    Error,
}

/// 上次操作记录
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastOperation {
    /// 操作描述
    pub operation: String,
    /// 更新时间
    pub last_update_time: String,
}

impl Kyma {
    /// 控制平面上的对象标识
    pub fn object_key(&self) -> Result<ObjectKey> {
        let name = self.metadata.name.clone().ok_or(Error::MissingName)?;
        let namespace = self
            .namespace()
            .ok_or_else(|| Error::MissingNamespace(name.clone()))?;
        Ok(ObjectKey::new(namespace, name))
    }

    /// 远程集群上使用的命名空间：同步覆盖优先，否则沿用控制平面命名空间
    pub fn sync_namespace(&self) -> Result<String> {
        if !self.spec.sync.namespace.is_empty() {
            return Ok(self.spec.sync.namespace.clone());
        }
        Ok(self.object_key()?.namespace)
    }

    /// 远程镜像对象的标识，名称与控制平面对象一致
    pub fn remote_object_key(&self) -> Result<ObjectKey> {
        let name = self.metadata.name.clone().ok_or(Error::MissingName)?;
        Ok(ObjectKey::new(self.sync_namespace()?, name))
    }

    /// 是否已被标记为删除
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// 写入上次同步时间注解
    pub fn set_last_sync(&mut self) -> &mut Self {
        self.annotations_mut()
            .insert(LAST_SYNC_ANNOTATION.to_string(), sync_timestamp());
        self
    }

    /// 是否包含指定终结器
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }

    /// 添加终结器，已存在时返回 false
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers_mut().push(finalizer.to_string());
        true
    }

    /// 移除终结器，不存在时返回 false
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let finalizers = self.finalizers_mut();
        let before = finalizers.len();
        finalizers.retain(|f| f != finalizer);
        before != finalizers.len()
    }
}
