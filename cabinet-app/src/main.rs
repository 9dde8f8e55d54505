use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cabinet_config::{AppConfig, ConfigError};
use cabinet_engine::{BatchProcessor, CancellationToken};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod report;

/// 从 DXF 图纸或 ZIP 压缩包中提取柜体数据。
#[derive(Debug, Parser)]
#[command(name = "cabinet-import", version)]
struct Cli {
    /// `.zip` 压缩包或 `.dxf` 图纸路径
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// 配置文件路径，缺省时按 `CABINET_CONFIG` 与 `./config/default.toml` 查找
    #[arg(long)]
    config: Option<PathBuf>,
    /// 以 JSON 输出完整的处理结果
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config, config_error) = load_configuration(cli.config.as_deref());
    init_logging(&config.logging.level);
    if let Some(err) = &config_error {
        report_config_error(err);
    }
    info!(inputs = cli.inputs.len(), "开始导入柜体图纸");

    let inputs = match report::read_inputs(&cli.inputs) {
        Ok(inputs) => inputs,
        Err(err) => {
            error!(error = %err, "读取输入失败");
            eprintln!("{err:#}");
            return ExitCode::FAILURE;
        }
    };

    let processor = BatchProcessor::from_config(&config);
    let result = report::process_inputs(&processor, &inputs, &CancellationToken::new());

    if cli.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                error!(error = %err, "序列化结果失败");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{}", report::render_summary(&result));
    }

    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// 配置读取失败时退回默认值，错误留到日志就绪后再报告。
fn load_configuration(override_path: Option<&Path>) -> (AppConfig, Option<ConfigError>) {
    let loaded = match override_path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    }
}

fn report_config_error(err: &ConfigError) {
    match err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
            warn!(path = %path.display(), error = %err, "配置不可用，改用内建默认值");
        }
        ConfigError::Context { .. } => warn!(error = %err, "配置不可用，改用内建默认值"),
    }
}

/// 日志写到 stderr，stdout 只留给报告与 JSON。
fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    // 订阅者已存在时保留原有设置
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
