//! 虚拟 Kyma
//!
//! 把控制平面 Kyma 与多个远程镜像的模块列表合并成一个视图。
//! 控制平面声明的模块优先，远程镜像可以补充控制平面尚不知道的模块。

use kyma_common::{Kyma, Module};
use std::collections::BTreeMap;

use super::context::KymaSynchronizationContext;

/// 合并模块列表，结果按模块名称排序，每个名称只保留一个条目
///
/// 远程镜像按给定顺序写入，同名时后者覆盖前者；最后写入控制平面的模块。
pub fn replace_with_virtual_kyma<'a>(kyma: &mut Kyma, remotes: impl IntoIterator<Item = &'a Kyma>) {
    let mut modules: BTreeMap<String, Module> = BTreeMap::new();

    for remote in remotes {
        for module in &remote.spec.modules {
            modules.insert(module.name.clone(), module.clone());
        }
    }
    for module in &kyma.spec.modules {
        modules.insert(module.name.clone(), module.clone());
    }

    kyma.spec.modules = modules.into_values().collect();
}

impl KymaSynchronizationContext {
    /// 用控制平面 Kyma 与远程镜像合并出的虚拟 Kyma 替换模块列表
    pub fn replace_with_virtual_kyma<'a>(
        &self,
        kyma: &mut Kyma,
        remotes: impl IntoIterator<Item = &'a Kyma>,
    ) {
        replace_with_virtual_kyma(kyma, remotes);
    }
}
