use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use takeoff_config::{AppConfig, ConfigError, OutputFormat};
use takeoff_engine::ExtractOptions;
use takeoff_frontend::{ReportFormat, TakeoffRequest, render, run_request};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

/// 从 DXF 平面图提取墙长、面积与构件数量。
#[derive(Debug, Parser)]
#[command(name = "takeoff-app", version, about)]
struct Cli {
    /// 输入的 DXF 文件
    input: PathBuf,
    /// 每个图纸单位对应的米数，例如毫米图纸为 0.001
    #[arg(long = "scale")]
    scale_factor: Option<f64>,
    /// 墙高（米），为 0 时不输出墙面扣减行
    #[arg(long = "wall-height")]
    wall_height_m: Option<f64>,
    /// 块引用最大展开深度
    #[arg(long = "max-depth")]
    max_block_depth: Option<usize>,
    /// 圆弧离散的最大角度步长（度）
    #[arg(long = "arc-step")]
    arc_step_deg: Option<f64>,
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
    /// 显式指定配置文件
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Table,
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Table => ReportFormat::Table,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

fn config_format(format: OutputFormat) -> ReportFormat {
    match format {
        OutputFormat::Table => ReportFormat::Table,
        OutputFormat::Json => ReportFormat::Json,
    }
}

fn main() {
    let cli = Cli::parse();
    let config = match load_configuration(cli.config.clone()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("错误: {err}");
            std::process::exit(1);
        }
    };
    init_logging(&config);

    let (request, format) = build_request(&cli, &config);
    info!(
        path = %request.path.display(),
        scale_factor = request.scale_factor,
        wall_height_m = request.wall_height_m,
        max_block_depth = request.options.max_block_depth,
        "开始提取工程量"
    );

    let report = match run_request(&request) {
        Ok(report) => report,
        Err(err) => {
            error!(error = %err, "工程量提取失败");
            eprintln!("错误: {err}");
            std::process::exit(1);
        }
    };

    match render(&report, format) {
        Ok(output) => print!("{output}"),
        Err(err) => {
            error!(error = %err, "渲染报表失败");
            eprintln!("错误: {err}");
            std::process::exit(1);
        }
    }
}

/// 命令行参数覆盖配置文件中的同名取值。
fn build_request(cli: &Cli, config: &AppConfig) -> (TakeoffRequest, ReportFormat) {
    let defaults = &config.takeoff;
    let request = TakeoffRequest {
        path: cli.input.clone(),
        scale_factor: cli.scale_factor.unwrap_or(defaults.scale_factor),
        wall_height_m: cli.wall_height_m.unwrap_or(defaults.wall_height_m),
        options: ExtractOptions {
            max_block_depth: cli.max_block_depth.unwrap_or(defaults.max_block_depth),
            arc_step_deg: cli.arc_step_deg.unwrap_or(defaults.arc_step_deg),
        },
    };
    let format = cli
        .format
        .map(ReportFormat::from)
        .unwrap_or_else(|| config_format(config.output.format));
    (request, format)
}

/// 显式指定的配置文件必须可用；自动发现失败时回退到内建默认值。
/// 此时日志尚未初始化，提示直接写到 stderr。
fn load_configuration(override_path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    match override_path {
        Some(path) => AppConfig::from_file(path),
        None => match AppConfig::discover() {
            Ok(cfg) => Ok(cfg),
            Err(err) => {
                eprintln!("警告: {err}，使用内建默认值");
                Ok(AppConfig::default())
            }
        },
    }
}

/// 日志写到 stderr，stdout 只留给报表。
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_new(config.logging.level.clone())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
