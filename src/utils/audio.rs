use crate::core::error::PersistError;
use crate::core::io::Storage;
use crate::services::tts::TransientAudio;
use async_trait::async_trait;
use log::debug;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Output format -> (ffmpeg muxer, audio codec).
const OUTPUT_FORMATS: &[(&str, &str, &str)] = &[
    ("mp3", "mp3", "libmp3lame"),
    ("ogg", "ogg", "libvorbis"),
    ("opus", "opus", "libopus"),
    ("aac", "adts", "aac"),
    ("flac", "flac", "flac"),
    ("wav", "wav", "pcm_s16le"),
];

pub fn encoder_for(format: &str) -> Option<(&'static str, &'static str)> {
    OUTPUT_FORMATS
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(format))
        .map(|&(_, muxer, codec)| (muxer, codec))
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        audio: &TransientAudio,
        format: &str,
        bitrate: &str,
    ) -> Result<Vec<u8>, PersistError>;
}

/// Pipes audio through an `ffmpeg` child process, stdin to stdout.
pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        audio: &TransientAudio,
        format: &str,
        bitrate: &str,
    ) -> Result<Vec<u8>, PersistError> {
        let (muxer, codec) =
            encoder_for(format).ok_or_else(|| PersistError::UnsupportedFormat(format.to_string()))?;
        if audio.data.is_empty() {
            return Err(PersistError::EmptySource);
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        if let Some(container) = audio.container_hint() {
            cmd.args(["-f", container]);
        }
        cmd.args(["-i", "pipe:0", "-vn", "-c:a", codec, "-b:a", bitrate, "-f", muxer, "-y", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("{} -> {} ({}, {})", audio.remote_path, format, codec, bitrate);
        let mut child = cmd.spawn().map_err(|source| PersistError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            PersistError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "transcoder stdin unavailable",
            ))
        })?;
        let data = &audio.data;
        // Feed stdin while draining stdout so large clips can't fill the pipes.
        let feed = async move {
            let result = stdin.write_all(data).await;
            drop(stdin);
            result
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            return Err(PersistError::Transcode {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        fed?;
        if output.stdout.is_empty() {
            return Err(PersistError::EmptyOutput);
        }
        Ok(output.stdout)
    }
}

/// Transcodes synthesized audio and stores it at its final path.
pub struct AudioPersister {
    transcoder: Box<dyn Transcoder>,
    storage: Arc<dyn Storage>,
}

impl AudioPersister {
    pub fn new(transcoder: Box<dyn Transcoder>, storage: Arc<dyn Storage>) -> Self {
        Self {
            transcoder,
            storage,
        }
    }

    /// Nothing is written to `destination` unless transcoding succeeded.
    pub async fn persist(
        &self,
        audio: &TransientAudio,
        destination: &Path,
        format: &str,
        bitrate: &str,
    ) -> Result<(), PersistError> {
        let encoded = self.transcoder.transcode(audio, format, bitrate).await?;
        self.storage.write(destination, &encoded).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;

    fn wav(data: &[u8]) -> TransientAudio {
        TransientAudio {
            data: data.to_vec(),
            remote_path: "/tmp/gradio/audio.wav".to_string(),
        }
    }

    struct UppercaseTranscoder;

    #[async_trait]
    impl Transcoder for UppercaseTranscoder {
        async fn transcode(
            &self,
            audio: &TransientAudio,
            format: &str,
            _bitrate: &str,
        ) -> Result<Vec<u8>, PersistError> {
            encoder_for(format).ok_or_else(|| PersistError::UnsupportedFormat(format.to_string()))?;
            Ok(audio.data.to_ascii_uppercase())
        }
    }

    struct BrokenTranscoder;

    #[async_trait]
    impl Transcoder for BrokenTranscoder {
        async fn transcode(
            &self,
            _audio: &TransientAudio,
            _format: &str,
            _bitrate: &str,
        ) -> Result<Vec<u8>, PersistError> {
            Err(PersistError::Transcode {
                status: "exit status: 1".to_string(),
                stderr: "Invalid data found when processing input".to_string(),
            })
        }
    }

    #[test]
    fn test_encoder_for() {
        assert_eq!(encoder_for("mp3"), Some(("mp3", "libmp3lame")));
        assert_eq!(encoder_for("MP3"), Some(("mp3", "libmp3lame")));
        assert_eq!(encoder_for("aac"), Some(("adts", "aac")));
        assert_eq!(encoder_for("wma"), None);
        assert_eq!(encoder_for(""), None);
    }

    #[tokio::test]
    async fn test_persist_writes_transcoded_audio() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let destination = temp_dir.path().join("ch01").join("ch01_s1_welcome.mp3");
        let persister = AudioPersister::new(Box::new(UppercaseTranscoder), Arc::new(NativeStorage::new()));

        persister.persist(&wav(b"riff"), &destination, "mp3", "192k").await?;

        assert_eq!(std::fs::read(&destination)?, b"RIFF");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_transcode_leaves_no_file() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let destination = temp_dir.path().join("ch01").join("ch01_s1_welcome.mp3");
        let persister = AudioPersister::new(Box::new(BrokenTranscoder), Arc::new(NativeStorage::new()));

        let result = persister.persist(&wav(b"riff"), &destination, "mp3", "192k").await;

        assert!(matches!(result, Err(PersistError::Transcode { .. })));
        assert!(!destination.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_ffmpeg_rejects_unsupported_format_before_spawning() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/ffmpeg");
        let result = transcoder.transcode(&wav(b"riff"), "wma", "192k").await;
        assert!(matches!(result, Err(PersistError::UnsupportedFormat(f)) if f == "wma"));
    }

    #[tokio::test]
    async fn test_ffmpeg_rejects_empty_source() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/ffmpeg");
        let result = transcoder.transcode(&wav(b""), "mp3", "192k").await;
        assert!(matches!(result, Err(PersistError::EmptySource)));
    }

    #[tokio::test]
    async fn test_ffmpeg_missing_binary_is_spawn_error() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/ffmpeg");
        let result = transcoder.transcode(&wav(b"riff"), "mp3", "192k").await;
        assert!(matches!(result, Err(PersistError::Spawn { .. })));
    }
}
