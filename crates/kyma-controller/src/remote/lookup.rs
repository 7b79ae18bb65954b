//! 远程客户端解析模块
//!
//! 根据控制平面 Kyma 的同步策略选择运行时集群客户端：
//! `local-client` 使用注入的客户端，`secret` 从控制平面 Secret 读取 kubeconfig。
//! 解析出的客户端按控制平面对象标识缓存。

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Client, Config};
use kyma_common::{Kyma, ObjectKey, SyncStrategy, KYMA_NAME_LABEL};
use std::collections::HashMap;
use std::str::Utf8Error;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::client::{ClusterClient, KubeClusterClient};
use crate::error::{Result, SyncError};

/// Secret 中保存 kubeconfig 的默认键
pub const DEFAULT_KUBECONFIG_KEY: &str = "config";

/// 远程客户端解析错误
#[derive(Error, Debug)]
pub enum LookupError {
    /// `local-client` 策略没有注入客户端
    #[error("未定义本地客户端")]
    NoLocalClient,

    /// 没有用于读取 Secret 的控制平面客户端
    #[error("未配置控制平面客户端")]
    NoControlPlane,

    /// 列出 Secret 失败
    #[error("获取 kubeconfig Secret 失败: {0}")]
    ListSecrets(#[source] kube::Error),

    /// 没有匹配的 Secret
    #[error("未找到带有标签 {selector} 的 Secret")]
    SecretNotFound {
        /// 标签选择器
        selector: String,
    },

    /// 匹配到多个 Secret
    #[error("找到 {count} 个 kubeconfig Secret，无法确定使用哪一个")]
    AmbiguousSecret {
        /// 匹配数量
        count: usize,
    },

    /// Secret 中缺少 kubeconfig 键
    #[error("Secret 中缺少键 {key}")]
    MissingKubeconfigKey {
        /// kubeconfig 键
        key: String,
    },

    /// kubeconfig 不是有效的 UTF-8
    #[error("kubeconfig 不是有效的 UTF-8: {0}")]
    InvalidUtf8(#[from] Utf8Error),

    /// kubeconfig 无法解析或加载
    #[error("加载 kubeconfig 失败: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    /// 创建客户端失败
    #[error("创建客户端失败: {0}")]
    Client(#[source] kube::Error),
}

/// 远程客户端解析器
#[async_trait]
pub trait RemoteClientResolver: Send + Sync {
    /// 为控制平面 Kyma 解析运行时集群客户端
    async fn resolve(&self, kyma: &Kyma) -> Result<Arc<dyn ClusterClient>>;

    /// 丢弃为控制平面 Kyma 保存的客户端，下次解析时重新构建
    async fn invalidate(&self, _kyma: &Kyma) {}
}

/// 远程客户端缓存
#[derive(Default)]
pub struct ClientCache {
    /// 按控制平面对象标识缓存的客户端
    clients: RwLock<HashMap<ObjectKey, Arc<dyn ClusterClient>>>,
}

impl ClientCache {
    /// 创建空缓存
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取缓存的客户端
    pub async fn get(&self, key: &ObjectKey) -> Option<Arc<dyn ClusterClient>> {
        self.clients.read().await.get(key).cloned()
    }

    /// 写入缓存
    pub async fn insert(&self, key: ObjectKey, client: Arc<dyn ClusterClient>) {
        self.clients.write().await.insert(key, client);
    }

    /// 移除缓存，Kyma 删除或 kubeconfig 轮换后调用
    pub async fn remove(&self, key: &ObjectKey) -> bool {
        self.clients.write().await.remove(key).is_some()
    }

    /// 缓存条目数
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// 缓存是否为空
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

/// 默认的远程客户端解析器
pub struct ClientLookup {
    /// 控制平面客户端，用于读取 kubeconfig Secret
    control_plane: Option<Client>,
    /// 客户端缓存
    cache: Arc<ClientCache>,
    /// 注入的本地客户端
    local_client: Option<Arc<dyn ClusterClient>>,
    /// Secret 中 kubeconfig 的键
    kubeconfig_key: String,
    /// 用于查找 kubeconfig Secret 的 Kyma 名称标签
    kyma_name_label: String,
}

impl ClientLookup {
    /// 创建新的解析器
    pub fn new(cache: Arc<ClientCache>) -> Self {
        Self {
            control_plane: None,
            cache,
            local_client: None,
            kubeconfig_key: DEFAULT_KUBECONFIG_KEY.to_string(),
            kyma_name_label: KYMA_NAME_LABEL.to_string(),
        }
    }

    /// 设置控制平面客户端
    pub fn with_control_plane(mut self, client: Client) -> Self {
        self.control_plane = Some(client);
        self
    }

    /// 设置 `local-client` 策略使用的客户端
    pub fn with_local_client(mut self, client: Arc<dyn ClusterClient>) -> Self {
        self.local_client = Some(client);
        self
    }

    /// 设置 kubeconfig 键
    pub fn with_kubeconfig_key(mut self, key: impl Into<String>) -> Self {
        self.kubeconfig_key = key.into();
        self
    }

    /// 设置 Secret 上的 Kyma 名称标签
    pub fn with_kyma_name_label(mut self, label: impl Into<String>) -> Self {
        self.kyma_name_label = label.into();
        self
    }

    /// 从控制平面 Secret 构建运行时集群客户端
    async fn client_from_secret(&self, key: &ObjectKey) -> std::result::Result<Client, LookupError> {
        let control_plane = self
            .control_plane
            .clone()
            .ok_or(LookupError::NoControlPlane)?;

        let secrets: Api<Secret> = Api::namespaced(control_plane, &key.namespace);
        let selector = format!("{}={}", self.kyma_name_label, key.name);
        let items = secrets
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(LookupError::ListSecrets)?
            .items;

        let secret = single_secret(items, &selector)?;
        let yaml = kubeconfig_yaml(&secret, &self.kubeconfig_key)?;

        let kubeconfig = Kubeconfig::from_yaml(yaml)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;

        Client::try_from(config).map_err(LookupError::Client)
    }
}

/// 要求选择器恰好匹配一个 Secret
fn single_secret(mut items: Vec<Secret>, selector: &str) -> std::result::Result<Secret, LookupError> {
    match items.len() {
        0 => Err(LookupError::SecretNotFound {
            selector: selector.to_string(),
        }),
        1 => Ok(items.remove(0)),
        count => Err(LookupError::AmbiguousSecret { count }),
    }
}

/// 读取 Secret 中的 kubeconfig 文本
fn kubeconfig_yaml<'a>(secret: &'a Secret, key: &str) -> std::result::Result<&'a str, LookupError> {
    let raw = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| LookupError::MissingKubeconfigKey {
            key: key.to_string(),
        })?;
    Ok(std::str::from_utf8(&raw.0)?)
}

#[async_trait]
impl RemoteClientResolver for ClientLookup {
    async fn resolve(&self, kyma: &Kyma) -> Result<Arc<dyn ClusterClient>> {
        let key = kyma.object_key()?;
        let unreachable_err = |source: LookupError| SyncError::RemoteUnreachable {
            target: key.to_string(),
            source,
        };

        match kyma.spec.sync.strategy {
            SyncStrategy::LocalClient => self
                .local_client
                .clone()
                .ok_or_else(|| unreachable_err(LookupError::NoLocalClient)),
            SyncStrategy::Secret => {
                if let Some(client) = self.cache.get(&key).await {
                    debug!("从缓存获取 {} 的远程客户端", key);
                    return Ok(client);
                }

                let client = self.client_from_secret(&key).await.map_err(unreachable_err)?;
                let client: Arc<dyn ClusterClient> = Arc::new(KubeClusterClient::new(client));
                self.cache.insert(key.clone(), client.clone()).await;
                info!("已为 {} 创建远程客户端，当前缓存条目数: {}", key, self.cache.len().await);

                Ok(client)
            }
        }
    }

    async fn invalidate(&self, kyma: &Kyma) {
        let Ok(key) = kyma.object_key() else {
            return;
        };
        if self.cache.remove(&key).await {
            info!("已移除 {} 的远程客户端缓存", key);
        }
    }
}
