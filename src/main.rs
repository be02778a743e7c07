//! # AI 抠图工作室：命令行入口
//!
//! 以无界面方式驱动一次编辑会话：导入 → (自动检测) → 选区 → 抠图或文字识别 → 导出。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use cutout_studio::config::StudioConfig;
use cutout_studio::error::AppError;
use cutout_studio::gateway::{GeminiClient, QualityLevel};
use cutout_studio::geometry::CropRegion;
use cutout_studio::session::{EditorError, EditorSession, IngestFile, OperationResult, OutputFormat};

#[derive(Clone, Copy, ValueEnum)]
enum QualityArg {
    Standard,
    High,
}

impl From<QualityArg> for QualityLevel {
    fn from(value: QualityArg) -> Self {
        match value {
            QualityArg::Standard => QualityLevel::Standard,
            QualityArg::High => QualityLevel::High,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Png,
    Jpeg,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Jpeg => OutputFormat::Jpeg,
        }
    }
}

#[derive(Parser)]
#[command(name = "cutout-studio")]
#[command(about = "Remove image backgrounds and extract text with a remote vision model")]
#[command(version)]
struct Cli {
    /// Image file to process
    input: PathBuf,

    /// Crop region as percentages of the image: x,y,width,height
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropRegion>,

    /// Background removal quality
    #[arg(long, value_enum, default_value = "standard")]
    quality: QualityArg,

    /// Download format
    #[arg(long, value_enum, default_value = "png")]
    format: FormatArg,

    /// Extract text from the crop instead of removing the background
    #[arg(long)]
    ocr: bool,

    /// Where to write the result (defaults to background-removed.<ext>)
    #[arg(long)]
    output: Option<PathBuf>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip automatic subject detection
    #[arg(long)]
    no_detect: bool,
}

fn parse_crop(value: &str) -> Result<CropRegion, String> {
    let fields = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in crop: {e}"))?;

    match fields.as_slice() {
        [x, y, width, height] => Ok(CropRegion::percent(*x, *y, *width, *height)),
        _ => Err(format!("expected x,y,width,height, got {} values", fields.len())),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("❌ 执行失败: {err}");
            eprintln!("{}", err.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = match &cli.config {
        Some(path) => StudioConfig::load_from_path(path),
        None => StudioConfig::default(),
    };
    if cli.no_detect {
        config.auto_detect = false;
    }
    config.validate()?;

    let client = GeminiClient::new(&config)?;
    let session = EditorSession::new(client, config);

    session.ingest(IngestFile::from_path(&cli.input)?).await?;
    session.detection_settled().await;

    if let Some(crop) = cli.crop {
        session.set_crop(crop)?;
    }
    session.set_quality(cli.quality.into());

    if cli.ocr {
        session.detect_text().await?;
        if let Some(text) = session.snapshot().text.as_ref().and_then(OperationResult::ready) {
            println!("{text}");
        }
        return Ok(());
    }

    session.remove_background().await?;
    session.set_output_format(cli.format.into());

    let mut snapshots = session.subscribe();
    let snapshot = snapshots
        .wait_for(|snapshot| !snapshot.converting)
        .await
        .map(|snapshot| (*snapshot).clone())
        .map_err(|_| EditorError::FormatConversion("会话已结束".to_string()))?;

    let artifact = snapshot
        .artifact
        .ok_or_else(|| EditorError::FormatConversion("没有可下载的结果".to_string()))?;
    let output = cli.output.unwrap_or_else(|| PathBuf::from(&artifact.file_name));
    std::fs::write(&output, &artifact.bytes)?;
    log::info!("💾 已写入 {:?} ({}KB)", output, artifact.bytes.len() / 1024);
    println!("{}", output.display());
    Ok(())
}
