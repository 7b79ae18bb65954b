//! 集群客户端模块
//!
//! 同步上下文只通过 `ClusterClient` 访问集群，控制平面与运行时集群各持有一个实例。
//! `KubeClusterClient` 是基于 kube-rs 的实现，并负责把 API 错误归类。

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use kyma_common::{ErrorKind, Kyma, ObjectKey};
use thiserror::Error;

/// 集群客户端错误
#[derive(Error, Debug)]
pub enum ClientError {
    /// 对象不存在
    #[error("对象不存在: {0}")]
    NotFound(String),

    /// 集群中没有匹配的资源类型（CRD 未安装）
    #[error("没有匹配的资源类型: {0}")]
    NoKindMatch(String),

    /// 写入冲突
    #[error("写入冲突: {0}")]
    Conflict(String),

    /// 无法连接集群
    #[error("无法连接集群: {0}")]
    Unreachable(String),

    /// 无效的对象
    #[error("无效的对象: {0}")]
    InvalidObject(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 其他 Kubernetes API 错误
    #[error("Kubernetes API 错误: {0}")]
    Kube(#[source] kube::Error),
}

impl ClientError {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::NotFound(_) => ErrorKind::NotFound,
            ClientError::NoKindMatch(_) => ErrorKind::SchemaMissing,
            ClientError::Conflict(_) => ErrorKind::Conflict,
            ClientError::Unreachable(_) => ErrorKind::RemoteUnreachable,
            ClientError::InvalidObject(_)
            | ClientError::Serialization(_)
            | ClientError::Kube(_) => ErrorKind::Other,
        }
    }

    /// 是否为对象不存在
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// 是否为资源类型不存在
    pub fn is_no_kind_match(&self) -> bool {
        matches!(self, ClientError::NoKindMatch(_))
    }
}

impl From<kube::Error> for ClientError {
    fn from(err: kube::Error) -> Self {
        match err {
            // API 服务器能识别资源类型时，404 会返回 reason 为 NotFound 的 Status；
            // 资源组或版本未注册时返回的是无法解析的 "404 page not found"
            kube::Error::Api(response) if response.code == 404 => {
                if response.reason == "NotFound" {
                    ClientError::NotFound(response.message)
                } else {
                    ClientError::NoKindMatch(response.message)
                }
            }
            kube::Error::Api(response) if response.code == 409 => {
                ClientError::Conflict(response.message)
            }
            kube::Error::HyperError(e) => ClientError::Unreachable(e.to_string()),
            kube::Error::Service(e) => ClientError::Unreachable(e.to_string()),
            other => ClientError::Kube(other),
        }
    }
}

/// 服务端应用选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// 字段管理者
    pub field_manager: String,
    /// 是否强制接管其他管理者的字段
    pub force: bool,
}

impl ApplyOptions {
    /// 以指定管理者强制应用
    pub fn force(field_manager: &str) -> Self {
        Self {
            field_manager: field_manager.to_string(),
            force: true,
        }
    }

    fn patch_params(&self) -> PatchParams {
        let params = PatchParams::apply(&self.field_manager);
        if self.force {
            params.force()
        } else {
            params
        }
    }
}

/// 集群客户端
///
/// 写操作返回 API 服务器上的最新对象，调用方负责把结果写回自己持有的副本。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// 获取 Kyma
    async fn get_kyma(&self, key: &ObjectKey) -> Result<Kyma, ClientError>;

    /// 创建 Kyma
    async fn create_kyma(&self, kyma: &Kyma) -> Result<Kyma, ClientError>;

    /// 更新 Kyma
    async fn update_kyma(&self, kyma: &Kyma) -> Result<Kyma, ClientError>;

    /// 更新 Kyma 的 status 子资源
    async fn update_kyma_status(&self, kyma: &Kyma) -> Result<Kyma, ClientError>;

    /// 删除 Kyma
    async fn delete_kyma(&self, key: &ObjectKey) -> Result<(), ClientError>;

    /// 以服务端应用方式写入命名空间
    async fn apply_namespace(
        &self,
        namespace: &Namespace,
        options: &ApplyOptions,
    ) -> Result<Namespace, ClientError>;

    /// 获取 CRD
    async fn get_crd(&self, name: &str) -> Result<CustomResourceDefinition, ClientError>;

    /// 以服务端应用方式创建或更新 CRD
    async fn apply_crd(
        &self,
        crd: &CustomResourceDefinition,
        options: &ApplyOptions,
    ) -> Result<CustomResourceDefinition, ClientError>;
}

/// 基于 kube-rs 的集群客户端
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// 创建新的集群客户端
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn kyma_api(&self, kyma: &Kyma) -> Result<(Api<Kyma>, String), ClientError> {
        let name = kyma.metadata.name.clone().ok_or_else(|| {
            ClientError::InvalidObject("Kyma 缺少名称".to_string())
        })?;
        let namespace = kyma.namespace().ok_or_else(|| {
            ClientError::InvalidObject(format!("Kyma {name} 缺少命名空间"))
        })?;
        Ok((Api::namespaced(self.client.clone(), &namespace), name))
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_kyma(&self, key: &ObjectKey) -> Result<Kyma, ClientError> {
        let api: Api<Kyma> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get(&key.name).await?)
    }

    async fn create_kyma(&self, kyma: &Kyma) -> Result<Kyma, ClientError> {
        let (api, _) = self.kyma_api(kyma)?;
        Ok(api.create(&PostParams::default(), kyma).await?)
    }

    async fn update_kyma(&self, kyma: &Kyma) -> Result<Kyma, ClientError> {
        let (api, name) = self.kyma_api(kyma)?;
        Ok(api.replace(&name, &PostParams::default(), kyma).await?)
    }

    async fn update_kyma_status(&self, kyma: &Kyma) -> Result<Kyma, ClientError> {
        let (api, name) = self.kyma_api(kyma)?;
        let data = serde_json::to_vec(kyma)?;
        Ok(api.replace_status(&name, &PostParams::default(), data).await?)
    }

    async fn delete_kyma(&self, key: &ObjectKey) -> Result<(), ClientError> {
        let api: Api<Kyma> = Api::namespaced(self.client.clone(), &key.namespace);
        api.delete(&key.name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn apply_namespace(
        &self,
        namespace: &Namespace,
        options: &ApplyOptions,
    ) -> Result<Namespace, ClientError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let name = namespace.name_any();
        Ok(api
            .patch(&name, &options.patch_params(), &Patch::Apply(namespace))
            .await?)
    }

    async fn get_crd(&self, name: &str) -> Result<CustomResourceDefinition, ClientError> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn apply_crd(
        &self,
        crd: &CustomResourceDefinition,
        options: &ApplyOptions,
    ) -> Result<CustomResourceDefinition, ClientError> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let name = crd.name_any();
        Ok(api
            .patch(&name, &options.patch_params(), &Patch::Apply(crd))
            .await?)
    }
}
