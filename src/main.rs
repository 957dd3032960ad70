use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use motorent_media::error::AppError;
use motorent_media::media::commands::{self, CommandError, UploadRequest};
use motorent_media::media::{CropRegion, MediaService, PipelineConfig, UploadTarget};
use motorent_media::settings;
use motorent_media::storage::{self, StoreKind};
use motorent_media::store::KeyValueStore;

/// Adjust, compress and upload listing images for the motorbike rental admin panel.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Settings file (defaults to `<data dir>/settings.json`).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base URL of the upload / delete endpoints, overrides the settings file.
    #[arg(long, global = true, value_name = "URL")]
    endpoint: Option<String>,

    /// Backend for the pending-upload list: `json` or `sqlite`.
    #[arg(long, global = true, default_value = "json")]
    store: String,

    /// Data directory (defaults to the platform data dir).
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pad, crop, compress and upload a local image.
    Upload {
        file: PathBuf,

        /// `bike` (4:3) or `hero` (16:9).
        #[arg(long, default_value = "bike")]
        target: String,

        /// Horizontal pan in [-1, 1].
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        x: f64,

        /// Vertical pan in [-1, 1].
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        y: f64,

        /// Zoom factor, clamped to [1, 2.5].
        #[arg(long, default_value_t = 1.0)]
        zoom: f64,

        /// Storage path of the image this upload replaces.
        #[arg(long, value_name = "OLD_PATH")]
        replace: Option<String>,
    },

    /// Delete pending uploads that no saved record references.
    Cleanup {
        /// Paths still referenced by saved records.
        #[arg(long = "existing", value_name = "PATH")]
        existing: Vec<String>,
    },

    /// List uploads that have not been confirmed yet.
    Pending,

    /// Show or switch the compression profile.
    Profile {
        #[command(subcommand)]
        action: Option<ProfileAction>,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    Get,
    /// `quality`, `balanced` or `speed`.
    Set { profile: String },
}

type Service = MediaService<motorent_media::media::HttpImageEndpoint, Arc<dyn KeyValueStore>>;

fn build_service(cli: &Cli) -> Result<(Service, PathBuf), AppError> {
    let data_dir = storage::resolve_data_dir(cli.data_dir.as_deref())?;
    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(|| storage::settings_path(&data_dir));
    let settings = settings::load_settings_from_path(&settings_path);

    let mut config = PipelineConfig::default();
    settings.apply_to(&mut config)?;
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint_base = endpoint.clone();
    }

    let store = storage::open_store(StoreKind::from_str(&cli.store)?, &data_dir)?;
    log::info!("📁 数据目录: {}", data_dir.display());

    let service = MediaService::connect(config, store)?;
    Ok((service, settings_path))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CommandError> {
    let rendered = serde_json::to_string_pretty(value).map_err(|e| CommandError {
        code: "E_OUTPUT",
        stage: "output",
        message: format!("序列化输出失败: {}", e),
    })?;
    println!("{rendered}");
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CommandError> {
    let (service, settings_path) = build_service(&cli)?;

    match cli.command {
        Command::Upload {
            file,
            target,
            x,
            y,
            zoom,
            replace,
        } => {
            let request = UploadRequest {
                path: file,
                target: UploadTarget::from_str(&target)?,
                region: Some(CropRegion { x, y, zoom }),
                replace,
            };
            print_json(&commands::upload_file(&service, request).await?)
        }
        Command::Cleanup { existing } => print_json(&commands::cleanup_orphans(&service, existing).await?),
        Command::Pending => print_json(&commands::list_pending(&service)?),
        Command::Profile { action } => match action {
            None | Some(ProfileAction::Get) => print_json(&commands::get_compression_profile(&service)?),
            Some(ProfileAction::Set { profile }) => {
                let applied = commands::set_compression_profile(&service, &profile)?;
                // 显式数值会覆盖档位，切换档位时一并清掉
                let mut stored = settings::load_settings_from_path(&settings_path);
                stored.compression_profile = Some(applied.clone());
                stored.max_dimension = None;
                stored.quality = None;
                settings::save_settings_to_path(&settings_path, &stored)?;
                print_json(&applied)
            }
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("❌ {} [{}] {}", err.code, err.stage, err.message);
            match serde_json::to_string_pretty(&err) {
                Ok(rendered) => eprintln!("{rendered}"),
                Err(_) => eprintln!("{}", err.message),
            }
            ExitCode::FAILURE
        }
    }
}
