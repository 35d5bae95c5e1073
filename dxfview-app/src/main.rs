use std::path::PathBuf;

use dxfview_config::{AppConfig, ConfigError};
use dxfview_io::{DocumentLoader, DxfFacade};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const USAGE: &str = "用法：dxfview [--config <path>] [--compact] <file.dxf>";

#[derive(Debug, PartialEq, Eq)]
struct CliArgs {
    input: PathBuf,
    config: Option<PathBuf>,
    compact: bool,
}

fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    };

    let config = load_configuration(args.config.clone());
    init_logging(&config);
    info!(path = %args.input.display(), "开始解析 DXF 文件");

    let loader = DxfFacade::new();
    let document = match loader.load(&args.input) {
        Ok(document) => document,
        Err(err) => {
            error!(error = %err, "无法加载 DXF 文件");
            std::process::exit(1);
        }
    };

    let pretty = config.output.pretty && !args.compact;
    let rendered = if pretty {
        serde_json::to_string_pretty(&document)
    } else {
        serde_json::to_string(&document)
    };
    match rendered {
        Ok(json) => println!("{json}"),
        Err(err) => {
            error!(error = %err, "序列化文档失败");
            std::process::exit(1);
        }
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut args = args.into_iter();
    let mut input: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut compact = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--compact" => compact = true,
            "--config" => {
                let Some(path) = args.next() else {
                    return Err("`--config` 需要提供配置文件路径".to_string());
                };
                config = Some(PathBuf::from(path));
            }
            other if other.starts_with("--") => return Err(format!("未知参数：{other}")),
            other => {
                if input.is_some() {
                    return Err(format!("只能指定一个输入文件：{other}"));
                }
                input = Some(PathBuf::from(other));
            }
        }
    }

    let Some(input) = input else {
        return Err("缺少 DXF 文件路径".to_string());
    };
    Ok(CliArgs {
        input,
        config,
        compact,
    })
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

/// 日志写入 stderr，stdout 只输出 JSON。
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
