//! Kyma Operator 入口

use anyhow::Result;
use clap::Parser;
use kube::CustomResourceExt;
use kyma_common::Kyma;
use kyma_operator::config::OperatorConfig;
use kyma_operator::KymaOperator;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 在控制平面与运行时集群之间同步 Kyma 资源
#[derive(Parser, Debug)]
#[command(name = "kyma-operator", version, about, long_about = None)]
struct Cli {
    /// 配置文件路径（YAML 或 JSON）
    #[arg(short, long, env = "KYMA_OPERATOR_CONFIG")]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件
    #[arg(long)]
    log_level: Option<String>,

    /// 输出 Kyma CRD 并退出
    #[arg(long)]
    crd: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        println!("{}", serde_yaml::to_string(&Kyma::crd())?);
        return Ok(());
    }

    let mut config = OperatorConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("Kyma Operator 启动，控制器名称: {}", config.controller_name);

    let operator = KymaOperator::new(config).await?;
    operator.start().await
}
