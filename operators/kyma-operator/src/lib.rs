//! Kyma Operator - 在控制平面与运行时集群之间同步 Kyma 资源
//!
//! 该模块实现了 Kyma 的 Kubernetes Operator，监听控制平面上的 Kyma，
//! 并通过同步上下文维护运行时集群上的镜像对象。

pub mod config;
pub mod controller;
pub mod reconcile;

use anyhow::Result;
use kube::Client;
use kyma_controller::remote::ClientCache;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Operator 主结构体
pub struct KymaOperator {
    /// Kubernetes 客户端
    client: Client,
    /// Operator 配置
    config: config::OperatorConfig,
    /// 远程客户端缓存，在所有协调之间共享
    cache: Arc<ClientCache>,
    /// 根取消令牌
    shutdown: CancellationToken,
}

impl KymaOperator {
    /// 使用默认的 kubeconfig 创建 Operator 实例
    pub async fn new(config: config::OperatorConfig) -> Result<Self> {
        let client = Client::try_default().await?;

        Ok(Self {
            client,
            config,
            cache: Arc::new(ClientCache::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// 启动 Operator，直到控制器退出
    pub async fn start(&self) -> Result<()> {
        controller::run(
            self.client.clone(),
            self.config.clone(),
            self.cache.clone(),
            self.shutdown.clone(),
        )
        .await?;

        // 取消仍在进行的远程调用
        self.stop();
        Ok(())
    }

    /// 停止 Operator，正在进行的远程调用会以取消错误返回
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            info!("停止 Kyma Operator");
            self.shutdown.cancel();
        }
    }
}
