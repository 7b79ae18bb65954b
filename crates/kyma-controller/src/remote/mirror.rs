//! 远程镜像 Kyma 的获取与创建
//!
//! 获取流程是一个显式状态机：
//!
//! - `Fetching`：找到对象进入 `Done`；`NoKindMatch` 进入 `BootstrappingSchema`；
//!   `NotFound` 进入 `Creating`；其他错误进入 `Failed`
//! - `BootstrappingSchema`：安装 CRD 后进入 `Creating`，失败进入 `Failed`
//! - `Creating`：创建成功进入 `Done`，失败进入 `Failed`
//!
//! CRD 安装之后直接进入 Creating，不会回到 Fetching，因此每次调用最多安装一次 CRD。

use kube::Resource;
use kyma_common::{Kyma, ObjectKey};
use tracing::{debug, info};

use super::context::KymaSynchronizationContext;
use super::synchronizer::insert_watcher_labels;
use crate::error::{Result, SyncError};
use crate::events::{actions, reasons};

/// 镜像获取状态
#[derive(Debug)]
enum MirrorState {
    /// 按标识获取远程对象
    Fetching,
    /// 远程集群缺少 CRD，正在安装
    BootstrappingSchema,
    /// 远程对象不存在，正在创建
    Creating,
    /// 已获得远程对象
    Done(Kyma),
    /// 失败
    Failed(SyncError),
}

/// 根据控制平面 Kyma 构建新的远程镜像
///
/// 镜像从创建起就带有观察者标签，控制平面的监听据此排除镜像。
fn new_mirror(kyma: &Kyma, key: &ObjectKey) -> Result<Kyma> {
    let mut remote = Kyma::new(&key.name, kyma.spec.clone());
    remote.metadata.namespace = Some(key.namespace.clone());
    insert_watcher_labels(kyma, &mut remote)?;

    if kyma.spec.sync.no_module_copy {
        remote.spec.modules = Vec::new();
    }

    Ok(remote)
}

impl KymaSynchronizationContext {
    /// 获取远程镜像 Kyma，不存在时创建
    pub async fn create_or_fetch_remote_kyma(&self, kyma: &Kyma) -> Result<Kyma> {
        let key = kyma.remote_object_key()?;
        let mut state = MirrorState::Fetching;

        loop {
            state = match state {
                MirrorState::Fetching => self.fetch_mirror(kyma, &key).await?,
                MirrorState::BootstrappingSchema => self.bootstrap_schema(kyma).await?,
                MirrorState::Creating => self.create_mirror(kyma, &key).await?,
                MirrorState::Done(remote) => return Ok(remote),
                MirrorState::Failed(err) => return Err(err),
            };
        }
    }

    async fn fetch_mirror(&self, kyma: &Kyma, key: &ObjectKey) -> Result<MirrorState> {
        let state = match self
            .cancellable("获取远程 Kyma", self.runtime.get_kyma(key))
            .await?
        {
            Ok(remote) => {
                debug!("已获取远程 Kyma {}", key);
                MirrorState::Done(remote)
            }
            Err(e) if e.is_no_kind_match() => {
                self.normal_event(
                    kyma,
                    &e.to_string(),
                    actions::INSTALL_CRD,
                    "运行时集群缺少 CRD，即将安装",
                )
                .await;
                MirrorState::BootstrappingSchema
            }
            Err(e) if e.is_not_found() => MirrorState::Creating,
            Err(source) => {
                let err = SyncError::Remote {
                    operation: "获取远程 Kyma",
                    target: key.to_string(),
                    source,
                };
                self.warning_event(kyma, &err, actions::FETCH, "无法获取远程 Kyma")
                    .await;
                MirrorState::Failed(err)
            }
        };
        Ok(state)
    }

    async fn bootstrap_schema(&self, kyma: &Kyma) -> Result<MirrorState> {
        let state = match self.create_or_update_crd(&Kyma::plural(&())).await {
            Ok(()) => {
                self.normal_event(
                    kyma,
                    reasons::CRD_INSTALLATION,
                    actions::INSTALL_CRD,
                    "CRD 已安装到运行时集群",
                )
                .await;
                // CRD 安装完成后，之前的 NoKindMatch 等同于对象不存在
                MirrorState::Creating
            }
            Err(err @ SyncError::Cancelled { .. }) => return Err(err),
            Err(err) => {
                self.warning_event(kyma, &err, actions::INSTALL_CRD, "无法安装运行时集群 CRD")
                    .await;
                MirrorState::Failed(err)
            }
        };
        Ok(state)
    }

    async fn create_mirror(&self, kyma: &Kyma, key: &ObjectKey) -> Result<MirrorState> {
        let remote = new_mirror(kyma, key)?;

        let state = match self
            .guarded("创建远程 Kyma", key, self.runtime.create_kyma(&remote))
            .await
        {
            Ok(created) => {
                info!("已在运行时集群创建 Kyma {}", key);
                self.normal_event(
                    kyma,
                    reasons::REMOTE_INSTALLATION,
                    actions::CREATE,
                    "Kyma 已安装到运行时集群",
                )
                .await;
                MirrorState::Done(created)
            }
            Err(err @ SyncError::Cancelled { .. }) => return Err(err),
            Err(err) => {
                self.warning_event(kyma, &err, actions::CREATE, "无法在运行时集群创建 Kyma")
                    .await;
                MirrorState::Failed(err)
            }
        };
        Ok(state)
    }
}
