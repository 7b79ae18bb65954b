//! CRD 初始化
//!
//! 控制平面上的 CRD 是 schema 的权威来源。运行时集群缺少 CRD，
//! 或者没有提供控制平面当前使用的版本时，用控制平面的 CRD 覆盖安装。

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use kyma_common::{Kyma, SYNC_FIELD_MANAGER};
use tracing::{debug, info};

use super::client::ApplyOptions;
use super::context::KymaSynchronizationContext;
use crate::error::{Result, SyncError};

/// CRD 名称：`<plural>.<group>`，与 kustomize 默认的 CRD 命名一致
pub fn crd_name(plural: &str) -> String {
    format!("{}.{}", plural, Kyma::group(&()))
}

/// CRD 当前使用的版本：存储版本优先，否则使用编译时的 Kyma 版本
pub fn current_version(crd: &CustomResourceDefinition) -> String {
    crd.spec
        .versions
        .iter()
        .find(|v| v.storage)
        .map(|v| v.name.clone())
        .unwrap_or_else(|| Kyma::version(&()).to_string())
}

/// CRD 是否提供指定版本
pub fn serves_version(crd: &CustomResourceDefinition, version: &str) -> bool {
    crd.spec
        .versions
        .iter()
        .any(|v| v.name == version && v.served)
}

/// 去掉集群相关的元数据和状态，只保留可以应用到其他集群的部分
fn portable_crd(crd: &CustomResourceDefinition) -> CustomResourceDefinition {
    CustomResourceDefinition {
        metadata: ObjectMeta {
            name: crd.metadata.name.clone(),
            labels: crd.metadata.labels.clone(),
            annotations: crd.metadata.annotations.clone(),
            ..Default::default()
        },
        spec: crd.spec.clone(),
        status: None,
    }
}

impl KymaSynchronizationContext {
    /// 确保运行时集群上的 CRD 与控制平面兼容
    pub async fn create_or_update_crd(&self, plural: &str) -> Result<()> {
        let name = crd_name(plural);

        let crd = self
            .guarded("获取控制平面 CRD", &name, self.control_plane.get_crd(&name))
            .await?;
        let version = current_version(&crd);

        match self
            .cancellable("获取远程 CRD", self.runtime.get_crd(&name))
            .await?
        {
            Ok(remote) if serves_version(&remote, &version) => {
                debug!("远程 CRD {} 已提供版本 {}", name, version);
                Ok(())
            }
            Ok(_) => {
                info!("远程 CRD {} 未提供版本 {}，使用控制平面 CRD 覆盖", name, version);
                self.install_crd(&name, &crd).await
            }
            Err(e) if e.is_not_found() => {
                info!("远程 CRD {} 不存在，开始安装", name);
                self.install_crd(&name, &crd).await
            }
            Err(source) => Err(SyncError::Remote {
                operation: "获取远程 CRD",
                target: name,
                source,
            }),
        }
    }

    async fn install_crd(&self, name: &str, crd: &CustomResourceDefinition) -> Result<()> {
        let options = ApplyOptions::force(SYNC_FIELD_MANAGER);
        self.guarded(
            "安装远程 CRD",
            name,
            self.runtime.apply_crd(&portable_crd(crd), &options),
        )
        .await?;
        Ok(())
    }
}
