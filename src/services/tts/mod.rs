use crate::core::config::VoiceSettings;
use crate::core::error::SynthesisError;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Audio handed back by the synthesis service, before transcoding.
#[derive(Debug, Clone)]
pub struct TransientAudio {
    pub data: Vec<u8>,
    /// Where the service stored the file; only its extension is ever used.
    pub remote_path: String,
}

impl TransientAudio {
    /// Container name for ffmpeg's `-f`, when the remote extension is one it can't misdetect.
    pub fn container_hint(&self) -> Option<&'static str> {
        let ext = Path::new(&self.remote_path)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "wav" => Some("wav"),
            "mp3" => Some("mp3"),
            "flac" => Some("flac"),
            "ogg" => Some("ogg"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Synthesized {
    /// Status text from the service, shown to the user and otherwise ignored.
    pub message: String,
    pub audio: TransientAudio,
}

#[async_trait]
pub trait SynthesisClient: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
    ) -> Result<Synthesized, SynthesisError>;
}

/// Opens the remote session a run synthesizes through.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SynthesisClient>>;
}

pub mod gradio;
