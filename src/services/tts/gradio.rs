use crate::core::config::{Config, VoiceSettings};
use crate::core::error::SynthesisError;
use crate::services::tts::{SessionConnector, SynthesisClient, Synthesized, TransientAudio};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use url::Url;

/// Resolves a Space id such as `owner/name` to its `*.hf.space` host.
/// Full `http(s)://` URLs are used as given.
pub fn resolve_base_url(space: &str) -> Result<Url> {
    let space = space.trim();
    if space.starts_with("http://") || space.starts_with("https://") {
        return Url::parse(space.trim_end_matches('/'))
            .with_context(|| format!("Invalid Gradio URL: {}", space));
    }

    let (owner, name) = space
        .split_once('/')
        .ok_or_else(|| anyhow!("Space id must look like owner/name, got {:?}", space))?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        bail!("Space id must look like owner/name, got {:?}", space);
    }

    let subdomain: String = space
        .to_lowercase()
        .chars()
        .map(|c| if matches!(c, '/' | '_' | '.') { '-' } else { c })
        .collect();
    Url::parse(&format!("https://{}.hf.space", subdomain))
        .with_context(|| format!("Invalid Space id: {}", space))
}

fn authorize(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) if !token.is_empty() => req.header("Authorization", format!("Bearer {}", token)),
        _ => req,
    }
}

/// Positional inputs of the VITS `tts_fn(text, speaker, language, speed, is_symbol)` endpoint.
fn prediction_payload(text: &str, voice: &VoiceSettings) -> Value {
    json!({
        "data": [text, voice.speaker, voice.language, voice.speed, false]
    })
}

#[derive(Debug, Clone, PartialEq, Default)]
struct SseEvent {
    event: String,
    data: String,
}

/// Incremental server-sent-event reader; chunks may split lines anywhere.
#[derive(Default)]
struct SseParser {
    buffer: Vec<u8>,
    event: String,
    data: Vec<String>,
}

impl SseParser {
    fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.process_line(line.trim_end_matches(|c: char| c == '\n' || c == '\r')) {
                events.push(event);
            }
        }
        events
    }

    fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.process_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = value.to_string(),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.event.is_empty() && self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: std::mem::take(&mut self.event),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// `Some(output)` once the call completed, `None` for progress and heartbeats.
fn interpret(event: &SseEvent) -> Result<Option<Value>, SynthesisError> {
    match event.event.as_str() {
        "complete" => serde_json::from_str(&event.data)
            .map(Some)
            .map_err(|e| SynthesisError::MalformedResponse(format!("complete event: {}", e))),
        "error" => Err(SynthesisError::Remote(error_message(&event.data))),
        _ => Ok(None),
    }
}

fn error_message(data: &str) -> String {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::String(message)) => message,
        Ok(Value::Null) => "the app reported an error without details".to_string(),
        Ok(Value::Object(obj)) => obj
            .get("message")
            .or_else(|| obj.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
        Ok(other) => other.to_string(),
        Err(_) if data.trim().is_empty() => "the app reported an error without details".to_string(),
        Err(_) => data.to_string(),
    }
}

/// Splits the endpoint output `[message, audio]`.
fn parse_prediction(output: Value) -> Result<(String, Value), SynthesisError> {
    let items = match output {
        Value::Array(items) => items,
        other => {
            return Err(SynthesisError::MalformedResponse(format!(
                "expected an output list, got {}",
                other
            )))
        }
    };
    let count = items.len();
    let mut items = items.into_iter();
    let (Some(message), Some(audio)) = (items.next(), items.next()) else {
        return Err(SynthesisError::MalformedResponse(format!(
            "expected [message, audio], got {} outputs",
            count
        )));
    };

    let message = match message {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    };
    // The app answers bad input with an explanation and no audio.
    if audio.is_null() {
        return Err(SynthesisError::Remote(if message.is_empty() {
            "no audio returned".to_string()
        } else {
            message
        }));
    }
    Ok((message, audio))
}

/// Download URL and remote path for a returned file value.
fn file_location(file: &Value, api_root: &str) -> Result<(String, String), SynthesisError> {
    let file_url = |path: &str| format!("{}/file={}", api_root, path);
    match file {
        Value::String(path) => Ok((file_url(path), path.clone())),
        Value::Object(obj) => {
            let path = obj.get("path").and_then(Value::as_str);
            match (obj.get("url").and_then(Value::as_str), path) {
                (Some(url), path) => Ok((url.to_string(), path.unwrap_or(url).to_string())),
                (None, Some(path)) => Ok((file_url(path), path.to_string())),
                (None, None) => Err(SynthesisError::MalformedResponse(format!(
                    "file output has neither url nor path: {}",
                    file
                ))),
            }
        }
        other => Err(SynthesisError::MalformedResponse(format!(
            "unexpected audio output: {}",
            other
        ))),
    }
}

/// A connected Gradio app. Built once per run and shared read-only by every call.
pub struct GradioClient {
    http: Client,
    /// Base URL plus the app's API prefix, e.g. `https://x.hf.space/gradio_api`.
    api_root: String,
    token: Option<String>,
}

impl GradioClient {
    pub async fn connect(space: &str, token: Option<String>) -> Result<Self> {
        let base_url = resolve_base_url(space)?;
        let base = base_url.as_str().trim_end_matches('/').to_string();
        let http = Client::new();

        debug!("Resolved {} to {}", space, base);
        let config_url = format!("{}/config", base);
        let resp = authorize(http.get(&config_url), token.as_deref())
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", config_url))?;
        if !resp.status().is_success() {
            bail!("{} returned HTTP {}", config_url, resp.status());
        }
        let app_config: Value = resp
            .json()
            .await
            .context("Failed to parse Gradio app config")?;

        // Gradio 5 serves its API under a prefix; older servers at the root.
        let api_prefix = app_config["api_prefix"]
            .as_str()
            .unwrap_or("")
            .trim_end_matches('/');
        debug!(
            "Gradio version {}, api prefix {:?}",
            app_config["version"].as_str().unwrap_or("?"),
            api_prefix
        );

        Ok(Self {
            http,
            api_root: format!("{}{}", base, api_prefix),
            token,
        })
    }

    async fn send(&self, req: RequestBuilder, url: &str) -> Result<Response, SynthesisError> {
        let resp = authorize(req, self.token.as_deref())
            .send()
            .await
            .map_err(|source| SynthesisError::Transport {
                url: url.to_string(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SynthesisError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn submit(&self, call_url: &str, payload: &Value) -> Result<String, SynthesisError> {
        let resp = self.send(self.http.post(call_url).json(payload), call_url).await?;
        let body: Value = resp.json().await.map_err(|source| SynthesisError::Transport {
            url: call_url.to_string(),
            source,
        })?;
        body["event_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SynthesisError::MalformedResponse(format!("no event_id in {}", body)))
    }

    async fn await_output(&self, stream_url: &str) -> Result<Value, SynthesisError> {
        let mut stream = self
            .send(self.http.get(stream_url), stream_url)
            .await?
            .bytes_stream();
        let mut parser = SseParser::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| SynthesisError::Transport {
                url: stream_url.to_string(),
                source,
            })?;
            for event in parser.feed(&chunk) {
                if let Some(output) = interpret(&event)? {
                    return Ok(output);
                }
            }
        }
        if let Some(event) = parser.finish() {
            if let Some(output) = interpret(&event)? {
                return Ok(output);
            }
        }
        Err(SynthesisError::MalformedResponse(
            "event stream ended without a result".to_string(),
        ))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, SynthesisError> {
        let resp = self.send(self.http.get(url), url).await?;
        let bytes = resp.bytes().await.map_err(|source| SynthesisError::Transport {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SynthesisClient for GradioClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
    ) -> Result<Synthesized, SynthesisError> {
        let call_url = format!(
            "{}/call/{}",
            self.api_root,
            voice.api_name.trim_start_matches('/')
        );

        debug!("Submitting {} chars to {}", text.chars().count(), call_url);
        let event_id = self.submit(&call_url, &prediction_payload(text, voice)).await?;
        debug!("Event id: {}", event_id);

        let output = self.await_output(&format!("{}/{}", call_url, event_id)).await?;
        let (message, file) = parse_prediction(output)?;
        let (download_url, remote_path) = file_location(&file, &self.api_root)?;

        debug!("Downloading {}", download_url);
        let data = self.download(&download_url).await?;
        debug!("Downloaded {} bytes", data.len());

        Ok(Synthesized {
            message,
            audio: TransientAudio { data, remote_path },
        })
    }
}

pub struct GradioConnector {
    space: String,
    token: Option<String>,
}

impl GradioConnector {
    pub fn new(space: impl Into<String>, token: Option<String>) -> Self {
        Self {
            space: space.into(),
            token,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.space.clone(), config.hf_token.clone())
    }
}

#[async_trait]
impl SessionConnector for GradioConnector {
    async fn connect(&self) -> Result<Box<dyn SynthesisClient>> {
        let client = GradioClient::connect(&self.space, self.token.clone()).await?;
        Ok(Box::new(client))
    }
}
