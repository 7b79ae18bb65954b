//! 远程镜像状态同步
//!
//! 把控制平面的状态、观察者标签和同步时间推送到远程镜像，
//! 并负责删除流程中的终结器移除和镜像删除。

use kyma_common::{
    owned_by_value, Kyma, KYMA_FINALIZER, OPERATOR_NAME, OWNED_BY_LABEL, WATCHED_BY_LABEL,
};
use kube::ResourceExt;
use tracing::debug;

use super::context::KymaSynchronizationContext;
use crate::error::{Result, SyncError};
use crate::events::actions;

/// 写入运行时观察组件所需的标签
pub fn insert_watcher_labels(control_plane_kyma: &Kyma, remote_kyma: &mut Kyma) -> Result<()> {
    let key = control_plane_kyma.object_key()?;
    let labels = remote_kyma.labels_mut();
    labels.insert(
        OWNED_BY_LABEL.to_string(),
        owned_by_value(&key.namespace, &key.name),
    );
    labels.insert(WATCHED_BY_LABEL.to_string(), OPERATOR_NAME.to_string());
    Ok(())
}

impl KymaSynchronizationContext {
    /// 推送状态到远程镜像。镜像正在删除时不写入任何字段。
    pub async fn push_status(&self, control_plane_kyma: &Kyma, remote_kyma: &mut Kyma) -> Result<()> {
        if remote_kyma.is_deleting() {
            debug!("远程 Kyma {} 正在删除，跳过状态同步", remote_kyma.name_any());
            return Ok(());
        }

        remote_kyma.status = control_plane_kyma.status.clone();
        let key = remote_kyma.object_key()?;

        let result = self
            .guarded(
                "更新远程 Kyma 状态",
                &key,
                self.runtime.update_kyma_status(remote_kyma),
            )
            .await;
        match result {
            Ok(updated) => {
                *remote_kyma = updated;
                Ok(())
            }
            Err(err) => {
                self.report(control_plane_kyma, &err, "无法更新运行时集群 Kyma 状态")
                    .await;
                Err(err)
            }
        }
    }

    /// 写入观察者标签和同步时间注解，并更新远程镜像
    pub async fn push_spec_and_labels(
        &self,
        control_plane_kyma: &Kyma,
        remote_kyma: &mut Kyma,
    ) -> Result<()> {
        insert_watcher_labels(control_plane_kyma, remote_kyma)?;
        remote_kyma.set_last_sync();
        let key = remote_kyma.object_key()?;

        let result = self
            .guarded("更新远程 Kyma", &key, self.runtime.update_kyma(remote_kyma))
            .await;
        match result {
            Ok(updated) => {
                *remote_kyma = updated;
                Ok(())
            }
            Err(err) => {
                self.report(
                    control_plane_kyma,
                    &err,
                    "无法更新运行时集群 Kyma 的同步时间注解",
                )
                .await;
                Err(err)
            }
        }
    }

    /// 同步远程镜像：先推送状态，镜像未在删除时再写入标签和注解
    pub async fn synchronize_remote_kyma(
        &self,
        control_plane_kyma: &Kyma,
        remote_kyma: &mut Kyma,
    ) -> Result<()> {
        self.push_status(control_plane_kyma, remote_kyma).await?;

        if remote_kyma.is_deleting() {
            return Ok(());
        }

        self.push_spec_and_labels(control_plane_kyma, remote_kyma)
            .await
    }

    /// 重新获取远程镜像并移除 Kyma 终结器
    pub async fn remove_finalizer_from_remote_kyma(&self, kyma: &Kyma) -> Result<()> {
        let mut remote_kyma = self.get_remotely_synced_kyma(kyma).await?;

        if !remote_kyma.remove_finalizer(KYMA_FINALIZER) {
            debug!("远程 Kyma {} 上没有终结器", remote_kyma.name_any());
            return Ok(());
        }

        let key = remote_kyma.object_key()?;
        self.guarded(
            "移除远程 Kyma 终结器",
            &key,
            self.runtime.update_kyma(&remote_kyma),
        )
        .await?;
        Ok(())
    }

    /// 重新获取远程镜像并删除
    pub async fn delete_remotely_synced_kyma(&self, kyma: &Kyma) -> Result<()> {
        let remote_kyma = self.get_remotely_synced_kyma(kyma).await?;
        let key = remote_kyma.object_key()?;

        self.guarded("删除远程 Kyma", &key, self.runtime.delete_kyma(&key))
            .await
    }

    async fn report(&self, control_plane_kyma: &Kyma, err: &SyncError, note: &str) {
        if matches!(err, SyncError::Cancelled { .. }) {
            return;
        }
        self.warning_event(control_plane_kyma, err, actions::UPDATE, note)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::client::{ClientError, MockClusterClient};
    use crate::remote::testing::{
        context_with, context_with_recorder, control_plane_kyma, FakeCluster,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kyma_common::{
        ErrorKind, KymaStatus, ObjectKey, State, LAST_SYNC_ANNOTATION,
    };
    use std::sync::Arc;

    fn ready(mut kyma: Kyma) -> Kyma {
        kyma.status = Some(KymaStatus {
            state: State::Ready,
            last_operation: None,
        });
        kyma
    }

    fn deleting(mut kyma: Kyma) -> Kyma {
        kyma.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        kyma
    }

    #[test]
    fn test_insert_watcher_labels() {
        let kcp = control_plane_kyma("kyma-1", "kcp", "skr", &[]);
        let mut remote = control_plane_kyma("kyma-1", "skr", "", &[]);

        insert_watcher_labels(&kcp, &mut remote).unwrap();

        assert_eq!(remote.labels()[OWNED_BY_LABEL], "kcp/kyma-1");
        assert_eq!(remote.labels()[WATCHED_BY_LABEL], OPERATOR_NAME);
    }

    #[tokio::test]
    async fn test_push_status_on_deleting_mirror_writes_nothing() {
        let runtime = MockClusterClient::new();
        let context = context_with(Arc::new(MockClusterClient::new()), Arc::new(runtime));
        let kcp = ready(control_plane_kyma("kyma-1", "kcp", "skr", &[]));
        let mut remote = deleting(control_plane_kyma("kyma-1", "skr", "", &[]));

        context.push_status(&kcp, &mut remote).await.unwrap();

        assert!(remote.status.is_none());
    }

    #[tokio::test]
    async fn test_synchronize_deleting_mirror_writes_nothing() {
        let runtime = MockClusterClient::new();
        let context = context_with(Arc::new(MockClusterClient::new()), Arc::new(runtime));
        let kcp = ready(control_plane_kyma("kyma-1", "kcp", "skr", &[]));
        let mut remote = deleting(control_plane_kyma("kyma-1", "skr", "", &[]));

        context.synchronize_remote_kyma(&kcp, &mut remote).await.unwrap();

        assert!(remote.labels().get(OWNED_BY_LABEL).is_none());
    }

    #[tokio::test]
    async fn test_synchronize_pushes_status_then_labels() {
        let runtime = Arc::new(FakeCluster::with_kyma_crd(&["v1beta1"]));
        let existing = control_plane_kyma("kyma-1", "skr", "", &[]);
        runtime.put_kyma(existing.clone());
        let context = context_with(Arc::new(FakeCluster::default()), runtime.clone());

        let kcp = ready(control_plane_kyma("kyma-1", "kcp", "skr", &[]));
        let mut remote = existing;
        context.synchronize_remote_kyma(&kcp, &mut remote).await.unwrap();

        assert_eq!(runtime.calls(), vec!["update_kyma_status", "update_kyma"]);
        let stored = runtime.kyma(&ObjectKey::new("skr", "kyma-1")).unwrap();
        assert_eq!(stored.status.as_ref().unwrap().state, State::Ready);
        assert_eq!(stored.labels()[OWNED_BY_LABEL], "kcp/kyma-1");
        assert!(stored.annotations().contains_key(LAST_SYNC_ANNOTATION));
    }

    #[tokio::test]
    async fn test_push_status_error_is_reported() {
        let mut runtime = MockClusterClient::new();
        runtime
            .expect_update_kyma_status()
            .times(1)
            .returning(|_| Err(ClientError::Conflict("resourceVersion 过期".to_string())));
        let (context, recorder) =
            context_with_recorder(Arc::new(MockClusterClient::new()), Arc::new(runtime));
        let kcp = ready(control_plane_kyma("kyma-1", "kcp", "skr", &[]));
        let mut remote = control_plane_kyma("kyma-1", "skr", "", &[]);

        let err = context.push_status(&kcp, &mut remote).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(recorder.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_push_spec_and_labels_error_is_reported() {
        let mut runtime = MockClusterClient::new();
        runtime
            .expect_update_kyma()
            .times(1)
            .returning(|_| Err(ClientError::Unreachable("EOF".to_string())));
        let (context, recorder) =
            context_with_recorder(Arc::new(MockClusterClient::new()), Arc::new(runtime));
        let kcp = control_plane_kyma("kyma-1", "kcp", "skr", &[]);
        let mut remote = control_plane_kyma("kyma-1", "skr", "", &[]);

        let err = context
            .push_spec_and_labels(&kcp, &mut remote)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RemoteUnreachable);
        assert!(recorder.warnings()[0].contains("EOF"));
    }

    #[tokio::test]
    async fn test_remove_finalizer_refetches_before_update() {
        let runtime = Arc::new(FakeCluster::with_kyma_crd(&["v1beta1"]));
        let mut existing = control_plane_kyma("kyma-1", "skr", "", &[]);
        existing.add_finalizer(KYMA_FINALIZER);
        runtime.put_kyma(existing);
        let context = context_with(Arc::new(FakeCluster::default()), runtime.clone());

        let kcp = control_plane_kyma("kyma-1", "kcp", "skr", &[]);
        context.remove_finalizer_from_remote_kyma(&kcp).await.unwrap();

        assert_eq!(runtime.calls(), vec!["get_kyma", "update_kyma"]);
        let stored = runtime.kyma(&ObjectKey::new("skr", "kyma-1")).unwrap();
        assert!(!stored.has_finalizer(KYMA_FINALIZER));
    }

    #[tokio::test]
    async fn test_remove_finalizer_without_finalizer_skips_update() {
        let runtime = Arc::new(FakeCluster::with_kyma_crd(&["v1beta1"]));
        runtime.put_kyma(control_plane_kyma("kyma-1", "skr", "", &[]));
        let context = context_with(Arc::new(FakeCluster::default()), runtime.clone());

        let kcp = control_plane_kyma("kyma-1", "kcp", "skr", &[]);
        context.remove_finalizer_from_remote_kyma(&kcp).await.unwrap();

        assert_eq!(runtime.calls(), vec!["get_kyma"]);
    }

    #[tokio::test]
    async fn test_delete_remotely_synced_kyma() {
        let runtime = Arc::new(FakeCluster::with_kyma_crd(&["v1beta1"]));
        runtime.put_kyma(control_plane_kyma("kyma-1", "skr", "", &[]));
        let context = context_with(Arc::new(FakeCluster::default()), runtime.clone());

        let kcp = control_plane_kyma("kyma-1", "kcp", "skr", &[]);
        context.delete_remotely_synced_kyma(&kcp).await.unwrap();

        assert_eq!(runtime.calls(), vec!["get_kyma", "delete_kyma"]);
        assert!(runtime.kyma(&ObjectKey::new("skr", "kyma-1")).is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_mirror_is_not_found() {
        let runtime = Arc::new(FakeCluster::with_kyma_crd(&["v1beta1"]));
        let context = context_with(Arc::new(FakeCluster::default()), runtime.clone());

        let kcp = control_plane_kyma("kyma-1", "kcp", "skr", &[]);
        let err = context.delete_remotely_synced_kyma(&kcp).await.unwrap_err();

        assert!(err.is_not_found());
    }
}
