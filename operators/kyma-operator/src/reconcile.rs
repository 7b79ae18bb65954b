//! 资源协调模块
//!
//! 每次协调为控制平面上的 Kyma 创建一个同步上下文：
//! 正常流程确保终结器、获取或创建远程镜像、计算虚拟 Kyma 并同步镜像；
//! 删除流程移除远程终结器、删除镜像，最后移除控制平面上的终结器；
//! 未启用同步的 Kyma 在删除时只移除控制平面上的终结器。

use kube::runtime::controller::Action;
use kube::ResourceExt;
use kyma_common::{ErrorKind, Kyma, KYMA_FINALIZER};
use kyma_controller::remote::{ClientError, ClusterClient, KymaSynchronizationContext, RemoteClientResolver};
use kyma_controller::{EventPublisher, SyncError};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;

/// 协调错误
#[derive(Error, Debug)]
pub enum Error {
    /// 同步上下文错误
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// 控制平面写入失败
    #[error("更新控制平面 Kyma {target} 失败: {source}")]
    ControlPlane {
        /// 对象标识
        target: String,
        /// 客户端错误
        #[source]
        source: ClientError,
    },

    /// 对象模型错误
    #[error(transparent)]
    Model(#[from] kyma_common::Error),
}

impl Error {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Sync(e) => e.kind(),
            Error::ControlPlane { source, .. } => source.kind(),
            Error::Model(_) => ErrorKind::Other,
        }
    }
}

/// 协调结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

/// 协调器共享的上下文
pub struct Context {
    /// 控制平面客户端
    pub control_plane: Arc<dyn ClusterClient>,
    /// 远程客户端解析器
    pub resolver: Arc<dyn RemoteClientResolver>,
    /// 事件发布器
    pub recorder: Arc<dyn EventPublisher>,
    /// Operator 配置
    pub config: OperatorConfig,
    /// 根取消令牌，每次协调使用它的子令牌
    pub shutdown: CancellationToken,
}

/// 协调控制平面上的 Kyma
pub async fn reconcile(kyma: Arc<Kyma>, ctx: Arc<Context>) -> Result<Action> {
    let key = kyma.object_key()?;
    let mut kyma = (*kyma).clone();

    if kyma.is_deleting() {
        info!("Kyma {} 正在删除", key);
        return handle_deletion(&mut kyma, &ctx).await;
    }

    if !kyma.spec.sync.enabled {
        debug!("Kyma {} 未启用同步，跳过", key);
        return Ok(Action::await_change());
    }

    info!("协调 Kyma {}", key);

    if kyma.add_finalizer(KYMA_FINALIZER) {
        kyma = update_control_plane(&ctx, &kyma).await?;
        debug!("已为 Kyma {} 添加终结器", key);
    }

    let result = synchronize(&ctx, &kyma).await;
    let virtual_kyma = evict_unreachable(&ctx, &kyma, result).await?;
    debug!(
        "Kyma {} 的虚拟模块列表: {:?}",
        key,
        virtual_kyma
            .spec
            .modules
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
    );

    Ok(Action::requeue(ctx.config.requeue_success()))
}

/// 同步远程镜像，返回合并了镜像模块的虚拟 Kyma
///
/// 虚拟 Kyma 是模块安装的输入，模块安装本身不在此完成。
pub async fn synchronize(ctx: &Context, kyma: &Kyma) -> Result<Kyma> {
    let sync = sync_context(ctx, kyma).await?;
    let mut remote = sync.create_or_fetch_remote_kyma(kyma).await?;

    let mut virtual_kyma = kyma.clone();
    sync.replace_with_virtual_kyma(&mut virtual_kyma, [&remote]);

    sync.synchronize_remote_kyma(kyma, &mut remote).await?;
    Ok(virtual_kyma)
}

/// 协调失败时的重试策略
pub fn error_policy(kyma: Arc<Kyma>, error: &Error, ctx: Arc<Context>) -> Action {
    match error.kind() {
        ErrorKind::Cancelled => {
            warn!("协调 Kyma {} 已取消: {}", kyma.name_any(), error);
            Action::await_change()
        }
        _ => {
            error!("协调 Kyma {} 失败: {}", kyma.name_any(), error);
            Action::requeue(ctx.config.requeue_error())
        }
    }
}

async fn handle_deletion(kyma: &mut Kyma, ctx: &Context) -> Result<Action> {
    if !kyma.has_finalizer(KYMA_FINALIZER) {
        return Ok(Action::await_change());
    }

    if kyma.spec.sync.enabled {
        let result = cleanup_remote(ctx, kyma).await;
        evict_unreachable(ctx, kyma, result).await?;
        ctx.resolver.invalidate(kyma).await;
    } else {
        debug!("Kyma {} 未启用同步，跳过远程清理", kyma.name_any());
    }

    kyma.remove_finalizer(KYMA_FINALIZER);
    update_control_plane(ctx, kyma).await?;
    info!("已移除 Kyma {} 的终结器", kyma.name_any());

    Ok(Action::await_change())
}

async fn cleanup_remote(ctx: &Context, kyma: &Kyma) -> Result<()> {
    let sync = sync_context(ctx, kyma).await?;
    tolerate_absent(sync.remove_finalizer_from_remote_kyma(kyma).await)?;
    tolerate_absent(sync.delete_remotely_synced_kyma(kyma).await)?;
    info!("Kyma {} 的远程镜像已清理", kyma.name_any());
    Ok(())
}

/// 运行时集群不可达时丢弃缓存的客户端，下次协调重新构建
async fn evict_unreachable<T>(ctx: &Context, kyma: &Kyma, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.kind() == ErrorKind::RemoteUnreachable {
            warn!("Kyma {} 的运行时集群不可达，丢弃远程客户端", kyma.name_any());
            ctx.resolver.invalidate(kyma).await;
        }
    }
    result
}

async fn sync_context(ctx: &Context, kyma: &Kyma) -> Result<KymaSynchronizationContext> {
    let context = KymaSynchronizationContext::initialize(
        ctx.control_plane.clone(),
        ctx.resolver.as_ref(),
        ctx.recorder.clone(),
        ctx.shutdown.child_token(),
        kyma,
    )
    .await?;
    Ok(context)
}

async fn update_control_plane(ctx: &Context, kyma: &Kyma) -> Result<Kyma> {
    ctx.control_plane
        .update_kyma(kyma)
        .await
        .map_err(|source| Error::ControlPlane {
            target: kyma.name_any(),
            source,
        })
}

/// 镜像或其 CRD 已不存在时视为已清理
fn tolerate_absent(result: kyma_controller::Result<()>) -> Result<()> {
    match result {
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::SchemaMissing) => {
            debug!("远程镜像已不存在: {}", e);
            Ok(())
        }
        other => Ok(other?),
    }
}
