//! 测试辅助：内存集群、固定解析器和记录事件的发布器

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, ObjectReference};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::runtime::events::EventType;
use kube::{CustomResourceExt, ResourceExt};
use kyma_common::{Kyma, KymaSpec, KymaSync, Module, ObjectKey};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use super::client::{ApplyOptions, ClientError, ClusterClient};
use super::context::KymaSynchronizationContext;
use super::crd::crd_name;
use super::lookup::{LookupError, RemoteClientResolver};
use crate::error::{Result, SyncError};
use crate::events::EventPublisher;

#[derive(Default)]
struct ClusterState {
    kymas: BTreeMap<ObjectKey, Kyma>,
    namespaces: BTreeMap<String, Namespace>,
    crds: BTreeMap<String, CustomResourceDefinition>,
    calls: Vec<String>,
}

/// 内存中的集群。未安装 kymas CRD 时，Kyma 的读取和创建返回 `NoKindMatch`。
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn with_kyma_crd(versions: &[&str]) -> Self {
        let cluster = Self::default();
        let crd = kyma_crd(versions);
        cluster.lock().crds.insert(crd.name_any(), crd);
        cluster
    }

    pub fn put_kyma(&self, kyma: Kyma) {
        let key = kyma.object_key().unwrap();
        self.lock().kymas.insert(key, kyma);
    }

    pub fn kyma(&self, key: &ObjectKey) -> Option<Kyma> {
        self.lock().kymas.get(key).cloned()
    }

    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.lock().namespaces.get(name).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: &str) -> std::sync::MutexGuard<'_, ClusterState> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        state
    }
}

impl ClusterState {
    fn kyma_kind_installed(&self) -> bool {
        self.crds.contains_key(&crd_name("kymas"))
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_kyma(&self, key: &ObjectKey) -> std::result::Result<Kyma, ClientError> {
        let state = self.record("get_kyma");
        if !state.kyma_kind_installed() {
            return Err(ClientError::NoKindMatch("404 page not found".to_string()));
        }
        state
            .kymas
            .get(key)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(key.to_string()))
    }

    async fn create_kyma(&self, kyma: &Kyma) -> std::result::Result<Kyma, ClientError> {
        let mut state = self.record("create_kyma");
        if !state.kyma_kind_installed() {
            return Err(ClientError::NoKindMatch("404 page not found".to_string()));
        }
        let key = kyma
            .object_key()
            .map_err(|e| ClientError::InvalidObject(e.to_string()))?;
        if state.kymas.contains_key(&key) {
            return Err(ClientError::Conflict(format!("{key} already exists")));
        }
        state.kymas.insert(key, kyma.clone());
        Ok(kyma.clone())
    }

    async fn update_kyma(&self, kyma: &Kyma) -> std::result::Result<Kyma, ClientError> {
        let mut state = self.record("update_kyma");
        let key = kyma
            .object_key()
            .map_err(|e| ClientError::InvalidObject(e.to_string()))?;
        let stored = state
            .kymas
            .get_mut(&key)
            .ok_or_else(|| ClientError::NotFound(key.to_string()))?;
        let status = stored.status.take();
        *stored = kyma.clone();
        stored.status = status;
        Ok(stored.clone())
    }

    async fn update_kyma_status(&self, kyma: &Kyma) -> std::result::Result<Kyma, ClientError> {
        let mut state = self.record("update_kyma_status");
        let key = kyma
            .object_key()
            .map_err(|e| ClientError::InvalidObject(e.to_string()))?;
        let stored = state
            .kymas
            .get_mut(&key)
            .ok_or_else(|| ClientError::NotFound(key.to_string()))?;
        stored.status = kyma.status.clone();
        Ok(stored.clone())
    }

    async fn delete_kyma(&self, key: &ObjectKey) -> std::result::Result<(), ClientError> {
        let mut state = self.record("delete_kyma");
        state
            .kymas
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(key.to_string()))
    }

    async fn apply_namespace(
        &self,
        namespace: &Namespace,
        _options: &ApplyOptions,
    ) -> std::result::Result<Namespace, ClientError> {
        let mut state = self.record("apply_namespace");
        let name = namespace.name_any();
        let stored = state.namespaces.entry(name).or_insert_with(|| namespace.clone());
        stored
            .labels_mut()
            .extend(namespace.labels().clone());
        stored
            .annotations_mut()
            .extend(namespace.annotations().clone());
        Ok(stored.clone())
    }

    async fn get_crd(&self, name: &str) -> std::result::Result<CustomResourceDefinition, ClientError> {
        let state = self.record("get_crd");
        state
            .crds
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(name.to_string()))
    }

    async fn apply_crd(
        &self,
        crd: &CustomResourceDefinition,
        _options: &ApplyOptions,
    ) -> std::result::Result<CustomResourceDefinition, ClientError> {
        let mut state = self.record("apply_crd");
        state.crds.insert(crd.name_any(), crd.clone());
        Ok(crd.clone())
    }
}

/// 总是返回同一个集群的解析器
pub struct FakeResolver {
    cluster: Option<Arc<FakeCluster>>,
}

impl FakeResolver {
    pub fn new(cluster: Arc<FakeCluster>) -> Self {
        Self {
            cluster: Some(cluster),
        }
    }

    pub fn unreachable() -> Self {
        Self { cluster: None }
    }
}

#[async_trait]
impl RemoteClientResolver for FakeResolver {
    async fn resolve(&self, kyma: &Kyma) -> Result<Arc<dyn ClusterClient>> {
        match &self.cluster {
            Some(cluster) => {
                let client: Arc<dyn ClusterClient> = cluster.clone();
                Ok(client)
            }
            None => Err(SyncError::RemoteUnreachable {
                target: kyma.object_key()?.to_string(),
                source: LookupError::NoLocalClient,
            }),
        }
    }
}

/// 记录所有事件的发布器
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(EventType, String)>>,
}

impl RecordingPublisher {
    /// 所有事件的原因，按发布顺序
    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, reason)| reason.clone())
            .collect()
    }

    /// Warning 事件的原因
    pub fn warnings(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(type_, _)| matches!(type_, EventType::Warning))
            .map(|(_, reason)| reason.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
        self.events.lock().unwrap().push((type_, reason.to_string()));
    }
}

/// 构建 Kyma；`sync_namespace` 为空时镜像使用 `namespace`
pub fn control_plane_kyma(name: &str, namespace: &str, sync_namespace: &str, modules: &[&str]) -> Kyma {
    let spec = KymaSpec {
        channel: "regular".to_string(),
        modules: modules.iter().map(|m| Module::new(*m)).collect(),
        sync: KymaSync {
            enabled: true,
            namespace: sync_namespace.to_string(),
            ..Default::default()
        },
    };
    let mut kyma = Kyma::new(name, spec);
    kyma.metadata.namespace = Some(namespace.to_string());
    kyma
}

/// 构建提供指定版本的 kymas CRD，最后一个版本为存储版本
pub fn kyma_crd(versions: &[&str]) -> CustomResourceDefinition {
    let mut crd = Kyma::crd();
    let template = crd.spec.versions[0].clone();
    crd.spec.versions = versions
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mut version = template.clone();
            version.name = name.to_string();
            version.served = true;
            version.storage = i + 1 == versions.len();
            version
        })
        .collect();
    crd
}

pub fn module_names(kyma: &Kyma) -> Vec<String> {
    kyma.spec.modules.iter().map(|m| m.name.clone()).collect()
}

pub fn context_with(
    control_plane: Arc<dyn ClusterClient>,
    runtime: Arc<dyn ClusterClient>,
) -> KymaSynchronizationContext {
    context_with_recorder(control_plane, runtime).0
}

pub fn context_with_recorder(
    control_plane: Arc<dyn ClusterClient>,
    runtime: Arc<dyn ClusterClient>,
) -> (KymaSynchronizationContext, Arc<RecordingPublisher>) {
    let recorder = Arc::new(RecordingPublisher::default());
    let context = KymaSynchronizationContext::new(
        control_plane,
        runtime,
        recorder.clone(),
        CancellationToken::new(),
    );
    (context, recorder)
}
