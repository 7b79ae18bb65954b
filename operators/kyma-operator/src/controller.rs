//! 控制器模块
//!
//! 使用 kube-rs 的 `Controller` 监听控制平面上的 Kyma，并把每个对象交给协调器处理。

use anyhow::{Context as _, Result};
use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::Client;
use kyma_common::{Kyma, WATCHED_BY_LABEL};
use kyma_controller::remote::{ClientCache, ClientLookup, ClusterClient, KubeClusterClient};
use kyma_controller::KubeEventPublisher;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::OperatorConfig;
use crate::reconcile::{error_policy, reconcile, Context};

/// 构建协调器上下文
///
/// `local-client` 策略使用控制平面客户端本身作为运行时集群客户端。
pub fn build_context(
    client: Client,
    config: OperatorConfig,
    cache: Arc<ClientCache>,
    shutdown: CancellationToken,
) -> Context {
    let control_plane: Arc<dyn ClusterClient> = Arc::new(KubeClusterClient::new(client.clone()));

    let resolver = ClientLookup::new(cache)
        .with_control_plane(client.clone())
        .with_local_client(control_plane.clone())
        .with_kubeconfig_key(config.kubeconfig_secret_key.clone())
        .with_kyma_name_label(config.kyma_name_label.clone());

    let recorder = KubeEventPublisher::new(client, &config.controller_name);

    Context {
        control_plane,
        resolver: Arc::new(resolver),
        recorder: Arc::new(recorder),
        config,
        shutdown,
    }
}

/// 控制平面监听配置，排除带有观察者标签的远程镜像
///
/// `local-client` 策略下镜像与控制平面 Kyma 位于同一集群。
pub fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().labels(&format!("!{WATCHED_BY_LABEL}"))
}

/// 运行 Kyma 控制器，直到收到终止信号
pub async fn run(
    client: Client,
    config: OperatorConfig,
    cache: Arc<ClientCache>,
    shutdown: CancellationToken,
) -> Result<()> {
    let kymas: Api<Kyma> = Api::all(client.clone());
    kymas
        .list(&ListParams::default().limit(1))
        .await
        .context("Kyma CRD 未安装到控制平面")?;

    let context = Arc::new(build_context(client, config, cache, shutdown));

    info!("启动 Kyma 控制器");
    Controller::new(kymas, watcher_config())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((kyma, _)) => debug!("协调完成: {}", kyma),
                Err(e) => warn!("协调错误: {}", e),
            }
        })
        .await;
    info!("Kyma 控制器已停止");

    Ok(())
}
