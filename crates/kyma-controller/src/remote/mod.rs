//! 远程同步模块
//!
//! 该模块负责把控制平面上的 Kyma 镜像到运行时集群，并把两者的模块列表合并为虚拟 Kyma。
//! 包含集群客户端、远程客户端解析、CRD 与命名空间初始化以及镜像同步逻辑。

mod client;
mod context;
mod crd;
mod lookup;
mod mirror;
mod namespace;
mod synchronizer;
mod virtual_kyma;

#[cfg(test)]
mod testing;

pub use client::{ApplyOptions, ClientError, ClusterClient, KubeClusterClient};
pub use context::KymaSynchronizationContext;
pub use crd::{crd_name, current_version, serves_version};
pub use lookup::{
    ClientCache, ClientLookup, LookupError, RemoteClientResolver, DEFAULT_KUBECONFIG_KEY,
};
pub use synchronizer::insert_watcher_labels;
pub use virtual_kyma::replace_with_virtual_kyma;
