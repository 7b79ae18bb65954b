//! 配置管理模块
//!
//! 该模块负责加载 Operator 的配置。配置依次来自内置默认值、可选的 YAML/JSON 文件
//! 和 `KYMA_OPERATOR_` 前缀的环境变量，后者覆盖前者。

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use kyma_common::{KYMA_NAME_LABEL, OPERATOR_NAME};
use kyma_controller::remote::DEFAULT_KUBECONFIG_KEY;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "KYMA_OPERATOR";

/// Operator 配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// 日志级别
    pub log_level: String,
    /// 协调成功后重新入队的间隔（秒）
    pub requeue_success_secs: u64,
    /// 协调失败后重新入队的间隔（秒）
    pub requeue_error_secs: u64,
    /// Secret 中保存 kubeconfig 的键
    pub kubeconfig_secret_key: String,
    /// 用于查找 kubeconfig Secret 的 Kyma 名称标签
    pub kyma_name_label: String,
    /// 控制器名称，同时作为事件上报组件
    pub controller_name: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            requeue_success_secs: 30,
            requeue_error_secs: 10,
            kubeconfig_secret_key: DEFAULT_KUBECONFIG_KEY.to_string(),
            kyma_name_label: KYMA_NAME_LABEL.to_string(),
            controller_name: OPERATOR_NAME.to_string(),
        }
    }
}

impl OperatorConfig {
    /// 从可选的配置文件和进程环境变量加载配置
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    /// 从可选的配置文件和指定的环境变量源加载配置
    pub fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let defaults = Config::try_from(&Self::default()).context("构建默认配置失败")?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            let file = path.to_str().ok_or_else(|| anyhow!("配置路径无效: {:?}", path))?;
            builder = builder.add_source(File::with_name(file).format(file_format(path)?));
        }

        let config = builder
            .add_source(env.try_parsing(true))
            .build()
            .context("构建配置失败")?;

        config
            .try_deserialize::<OperatorConfig>()
            .context("配置格式错误")
    }

    /// 协调成功后的重新入队间隔
    pub fn requeue_success(&self) -> Duration {
        Duration::from_secs(self.requeue_success_secs)
    }

    /// 协调失败后的重新入队间隔
    pub fn requeue_error(&self) -> Duration {
        Duration::from_secs(self.requeue_error_secs)
    }
}

fn file_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => Ok(FileFormat::Yaml),
        Some("json") => Ok(FileFormat::Json),
        _ => Err(anyhow!("不支持的配置文件格式，仅支持 YAML 或 JSON")),
    }
}
