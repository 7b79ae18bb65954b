//! Kyma 同步控制器
//!
//! 该模块实现控制平面与运行时集群之间的 Kyma 同步，
//! 使用 kube-rs 框架与两个集群的 Kubernetes API 交互。

pub mod error;
pub mod events;
pub mod remote;

pub use error::{Result, SyncError};
pub use events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};
pub use remote::{
    replace_with_virtual_kyma, ClientCache, ClientLookup, ClusterClient, KubeClusterClient,
    KymaSynchronizationContext, RemoteClientResolver,
};
