use anyhow::Result;
use clap::Parser;
use scene_voicegen::core::config::{Config, DEFAULT_CONFIG_PATH};
use scene_voicegen::core::io::{NativeStorage, Storage};
use scene_voicegen::services::tts::gradio::GradioConnector;
use scene_voicegen::services::workflow::generate;
use scene_voicegen::utils::audio::{AudioPersister, FfmpegTranscoder};
use std::path::PathBuf;
use std::sync::Arc;

/// Voice every dialogue scene of a scene document through a hosted TTS Space
#[derive(Parser, Debug)]
#[command(name = "scene-voicegen", version)]
struct Cli {
    /// Scene document (JSON) to voice
    document: PathBuf,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if !cli.document.exists() {
        eprintln!("Error: {} not found", cli.document.display());
        std::process::exit(1);
    }

    let config = Config::load(&cli.config)?;

    println!("Speaker: {}", config.speaker);
    println!("Language: {}", config.language);
    println!("Speed: {}", config.speed);
    println!("API: {}", config.api_name);
    println!("Output: {}", config.output_dir.display());
    println!();

    let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new());
    let persister = AudioPersister::new(
        Box::new(FfmpegTranscoder::new(config.ffmpeg.as_str())),
        storage.clone(),
    );
    let connector = GradioConnector::from_config(&config);

    generate(&config, &cli.document, &connector, persister, storage).await?;

    Ok(())
}
