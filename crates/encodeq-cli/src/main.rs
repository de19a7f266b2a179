mod args;
mod report;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use encodeq_core::config::AppConfig;
use encodeq_core::models::{CdDiscInfo, CdTrackInfo, CoreError, CoreErrorKind, CoreResult, OutputModuleId};
use encodeq_core::modules::{ModuleRegistry, RecordingErrorHandler};
use encodeq_core::orchestration::TaskManager;
use encodeq_core::submission::{
    CdReadJob, EncoderJob, JobSubmitter, is_overwriting_original_files,
};
use tracing_subscriber::EnvFilter;

use crate::args::{Args, Commands, EncodeArgs, RipArgs};
use crate::report::RunReport;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    match run(args).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("encodeq: {error}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(args: Args) -> CoreResult<ExitCode> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.apply_env()?;

    let report = match args.command {
        Commands::Modules => {
            list_modules(&config);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Encode(encode) => run_encode(&mut config, encode, args.json).await?,
        Commands::Rip(rip) => run_rip(&mut config, rip, args.json).await?,
    };

    if args.json {
        let rendered = serde_json::to_string_pretty(&report).map_err(|error| {
            CoreError::new(CoreErrorKind::Internal, format!("failed to render report: {error}"))
        })?;
        println!("{rendered}");
    } else {
        print!("{}", report.render_text());
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn list_modules(config: &AppConfig) {
    for module in OutputModuleId::all() {
        let program = config
            .encoders
            .get(module)
            .map(|spec| spec.program.display().to_string())
            .unwrap_or_default();
        let marker = if *module == config.output_module { "*" } else { " " };
        println!(
            "{marker} {:<11} .{:<5} {:<8} {:<28} {program}",
            module.key(),
            module.extension(),
            if module.is_lossy() { "lossy" } else { "lossless" },
            module.display_name(),
        );
    }
}

async fn run_encode(config: &mut AppConfig, encode: EncodeArgs, json: bool) -> CoreResult<RunReport> {
    encode.output.apply(config);
    let registry = config.module_registry()?;
    let settings = config.job_settings();
    let mut jobs: Vec<EncoderJob> = encode.files.into_iter().map(EncoderJob::new).collect();

    let inputs: Vec<_> = jobs.iter().map(|job| job.input_path.clone()).collect();
    if registry.is_transcoding_lossy(&inputs, settings.output_module) {
        tracing::warn!(
            module = settings.output_module.key(),
            "transcoding from a lossy format to a lossy format reduces quality"
        );
    }
    for input in is_overwriting_original_files(&jobs, &settings) {
        tracing::warn!(input = %input.display(), "output would overwrite the original file");
    }

    let manager = TaskManager::new(config.worker_count())?;
    let handler = Arc::new(RecordingErrorHandler::new(config.on_error));
    JobSubmitter::new(&manager, &registry, &settings)
        .with_error_handler(handler)
        .submit_input_files(&mut jobs)?;

    Ok(report::watch(&manager, json).await)
}

async fn run_rip(config: &mut AppConfig, rip: RipArgs, json: bool) -> CoreResult<RunReport> {
    rip.output.apply(config);
    if let Some(device) = &rip.device {
        config.cd_device = Some(device.clone());
    }
    let registry: ModuleRegistry = config.module_registry()?;
    let extractor = Arc::new(config.track_extractor()?);
    let settings = config.job_settings();

    let disc = CdDiscInfo {
        disc_artist: rip.artist.clone().unwrap_or_default(),
        disc_title: rip.album.clone().unwrap_or_default(),
        year: rip.year.unwrap_or(0),
        genre: rip.genre.clone().unwrap_or_default(),
        various_artists: rip.various_artists,
    };
    let mut jobs: Vec<CdReadJob> = rip
        .tracks
        .iter()
        .enumerate()
        .map(|(index, title)| {
            let mut track = CdTrackInfo::new(index as u32, title.clone());
            track.active = !rip.skip.contains(&track.track_number());
            CdReadJob::new(disc.clone(), track)
        })
        .collect();

    let manager = TaskManager::new(config.worker_count())?;
    let handler = Arc::new(RecordingErrorHandler::new(config.on_error));
    JobSubmitter::new(&manager, &registry, &settings)
        .with_error_handler(handler)
        .submit_cd_tracks(extractor, &mut jobs)?;

    Ok(report::watch(&manager, json).await)
}
