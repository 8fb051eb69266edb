use crate::core::config::{Config, VoiceSettings};
use crate::core::error::{PersistError, SynthesisError};
use crate::core::io::Storage;
use crate::services::chapter::classify;
use crate::services::scene::{load_scenes, SceneRecord};
use crate::services::tts::{SessionConnector, SynthesisClient};
use crate::utils::audio::AudioPersister;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PREVIEW_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub success: usize,
    pub failure: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &SceneOutcome) {
        if outcome.is_success() {
            self.success += 1;
        } else {
            self.failure += 1;
        }
    }
}

#[derive(Debug)]
pub enum SceneOutcome {
    /// The clip was already on disk; nothing was requested.
    Skipped { path: PathBuf },
    Generated { path: PathBuf, message: String },
    SynthesisFailed(SynthesisError),
    PersistFailed { path: PathBuf, error: PersistError },
}

impl SceneOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SceneOutcome::Skipped { .. } | SceneOutcome::Generated { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The document had no voiced scenes; no session was opened.
    NoScenes,
    Completed(RunSummary),
}

/// `<output_dir>/<chapter>/<scene_id>.<extension>`
pub fn output_path(output_dir: &Path, scene_id: &str, extension: &str) -> PathBuf {
    output_dir
        .join(classify(scene_id))
        .join(format!("{}.{}", scene_id, extension))
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

pub struct WorkflowManager {
    config: Config,
    voice: VoiceSettings,
    tts: Box<dyn SynthesisClient>,
    persister: AudioPersister,
    storage: Arc<dyn Storage>,
}

impl WorkflowManager {
    pub fn new(
        config: Config,
        tts: Box<dyn SynthesisClient>,
        persister: AudioPersister,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let voice = config.voice();
        Self {
            config,
            voice,
            tts,
            persister,
            storage,
        }
    }

    pub fn output_path(&self, scene_id: &str) -> PathBuf {
        output_path(
            &self.config.output_dir,
            scene_id,
            &self.config.format.to_ascii_lowercase(),
        )
    }

    /// Voices every scene in order. A failed scene is counted and the loop moves on.
    pub async fn run(&self, scenes: &[SceneRecord]) -> Result<RunSummary> {
        let total = scenes.len();
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("#>-"),
        );

        let mut summary = RunSummary::default();
        for (i, scene) in scenes.iter().enumerate() {
            pb.suspend(|| {
                println!("[{}/{}] {}", i + 1, total, scene.id);
                println!("  Text: {}", preview(&scene.text, PREVIEW_CHARS));
            });

            let outcome = self.process_scene(scene).await;
            pb.suspend(|| report(&outcome));
            summary.record(&outcome);
            pb.inc(1);
        }
        pb.finish_and_clear();

        Ok(summary)
    }

    pub async fn process_scene(&self, scene: &SceneRecord) -> SceneOutcome {
        let path = self.output_path(&scene.id);

        match self.storage.exists(&path).await {
            Ok(true) => return SceneOutcome::Skipped { path },
            Ok(false) => {}
            Err(e) => {
                return SceneOutcome::PersistFailed {
                    path,
                    error: PersistError::Storage(e),
                }
            }
        }

        let synthesized = match self.tts.synthesize(&scene.text, &self.voice).await {
            Ok(synthesized) => synthesized,
            Err(e) => {
                warn!("Synthesis failed for {}: {}", scene.id, e);
                return SceneOutcome::SynthesisFailed(e);
            }
        };

        match self
            .persister
            .persist(
                &synthesized.audio,
                &path,
                &self.config.format,
                &self.config.bitrate,
            )
            .await
        {
            Ok(()) => SceneOutcome::Generated {
                path,
                message: synthesized.message,
            },
            Err(error) => {
                warn!("Failed to save {}: {}", path.display(), error);
                SceneOutcome::PersistFailed { path, error }
            }
        }
    }
}

fn report(outcome: &SceneOutcome) {
    match outcome {
        SceneOutcome::Skipped { path } => {
            println!("  Already exists, skipped ({})", path.display())
        }
        SceneOutcome::Generated { path, message } => {
            println!("  API message: {}", message);
            println!("  Saved: {}", path.display());
        }
        SceneOutcome::SynthesisFailed(e) => println!("  Synthesis failed: {}", e),
        SceneOutcome::PersistFailed { error, .. } => println!("  Saving failed: {}", error),
    }
}

/// Runs one document end to end.
///
/// The session is only opened once the document is known to contain voiced
/// scenes; failing to load the document or to connect aborts the run.
pub async fn generate(
    config: &Config,
    document: &Path,
    connector: &dyn SessionConnector,
    persister: AudioPersister,
    storage: Arc<dyn Storage>,
) -> Result<RunOutcome> {
    let scenes = load_scenes(document)
        .await
        .with_context(|| format!("Failed to load scenes from {}", document.display()))?;
    if scenes.is_empty() {
        println!("No scenes with dialogue found in {}", document.display());
        return Ok(RunOutcome::NoScenes);
    }

    println!("Found {} scenes:", scenes.len());
    for scene in &scenes {
        println!("  {}: {}", scene.id, preview(&scene.text, PREVIEW_CHARS));
    }
    println!();

    println!("Connecting to {} ...", config.space);
    let tts = connector
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", config.space))?;
    println!("Connected\n");

    let manager = WorkflowManager::new(config.clone(), tts, persister, storage);
    let summary = manager.run(&scenes).await?;

    println!(
        "\nDone! Success: {}, failed: {}",
        summary.success, summary.failure
    );
    Ok(RunOutcome::Completed(summary))
}
