//! Speech transcription and lexical pronunciation scoring.

use crate::error::TutorError;
use anyhow::{Context, anyhow, bail};
use async_openai::{Client, config::OpenAIConfig, types::CreateTranscriptionRequestArgs};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Attachment extensions accepted for pronunciation practice.
pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "wav", "ogg", "m4a"];

const DEFAULT_AUDIO_EXTENSION: &str = "ogg";

/// Upload limit of the transcription endpoint.
pub const MAX_AUDIO_BYTES: u64 = 25 * 1024 * 1024;

/// Lexical comparison between an expected sentence and what was heard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationScore {
    /// Share of matching words in `[0, 1]`.
    pub score: f64,
    pub expected_text: String,
    pub transcribed_text: String,
    pub feedback: String,
}

/// Scores a transcription by counting transcribed words that appear in the
/// expected text, divided by the longer of the two word counts.
///
/// Comparison is case-insensitive and whitespace-tokenised; punctuation is kept.
pub fn score_pronunciation(expected: &str, transcribed: &str) -> PronunciationScore {
    let expected_lower = expected.to_lowercase();
    let transcribed_lower = transcribed.to_lowercase();
    let expected_words: Vec<&str> = expected_lower.split_whitespace().collect();
    let transcribed_words: Vec<&str> = transcribed_lower.split_whitespace().collect();

    let matches = transcribed_words
        .iter()
        .filter(|word| expected_words.contains(word))
        .count();
    let longest = expected_words.len().max(transcribed_words.len());
    let score = if longest == 0 {
        0.0
    } else {
        matches as f64 / longest as f64
    };

    PronunciationScore {
        score,
        expected_text: expected.to_string(),
        transcribed_text: transcribed.to_string(),
        feedback: feedback_for(score).to_string(),
    }
}

fn feedback_for(score: f64) -> &'static str {
    if score > 0.9 {
        "Excellent pronunciation! You said the text almost perfectly."
    } else if score > 0.7 {
        "Good pronunciation. There are a few small differences from the expected text."
    } else if score > 0.5 {
        "Fair pronunciation. Some words need more practice."
    } else {
        "Your pronunciation needs more practice. Review the text and try again."
    }
}

/// Extension of the file an attachment URL points at, ignoring query strings.
pub fn audio_extension(url: &str) -> Option<String> {
    let path = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

pub fn is_supported_audio(url: &str) -> bool {
    audio_extension(url).is_some_and(|ext| SUPPORTED_AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Transcribes a local audio file.
    async fn transcribe_audio(&self, path: &Path) -> Result<String, TutorError>;

    /// Transcribes a local audio file and scores it against `expected_text`.
    async fn analyze_pronunciation(
        &self,
        path: &Path,
        expected_text: &str,
    ) -> Result<PronunciationScore, TutorError> {
        let transcription = self.transcribe_audio(path).await?;
        Ok(score_pronunciation(expected_text, &transcription))
    }

    /// Downloads a remote recording, transcribes it and removes the local copy.
    async fn process_voice_recording(&self, url: &str, user_id: Uuid) -> Result<String, TutorError>;
}

/// Transcription through an OpenAI-compatible audio endpoint.
pub struct WhisperSpeechService {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    model: String,
    temp_dir: PathBuf,
    max_bytes: u64,
}

impl WhisperSpeechService {
    pub fn new(config: OpenAIConfig, model: impl Into<String>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::with_config(config),
            http: reqwest::Client::new(),
            model: model.into(),
            temp_dir: temp_dir.into(),
            max_bytes: MAX_AUDIO_BYTES,
        }
    }

    /// Overrides the attachment size cap.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Flat `<temp_dir>/audio_<user>_<uuid>.<ext>`; no per-user directories are left behind.
    fn recording_path(&self, url: &str, user_id: Uuid) -> PathBuf {
        let ext = audio_extension(url).unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string());
        self.temp_dir
            .join(format!("audio_{}_{}.{}", user_id, Uuid::new_v4(), ext))
    }

    async fn download(&self, url: &str, user_id: Uuid) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .with_context(|| format!("failed to create {}", self.temp_dir.display()))?;

        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .context("attachment request failed")?
            .error_for_status()
            .context("attachment download was refused")?;
        if let Some(declared) = response.content_length() {
            within_limit(declared, self.max_bytes)?;
        }

        let path = self.recording_path(url, user_id);
        let written = match self.stream_to_file(&mut response, &path).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
        };
        debug!(path = %path.display(), size = written, "Attachment downloaded");
        Ok(path)
    }

    /// Writes the body chunk by chunk, failing once it exceeds `max_bytes`.
    async fn stream_to_file(
        &self,
        response: &mut reqwest::Response,
        path: &Path,
    ) -> anyhow::Result<u64> {
        let mut file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .context("attachment body could not be read")?
        {
            written += chunk.len() as u64;
            within_limit(written, self.max_bytes)?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        file.flush().await?;
        Ok(written)
    }
}

fn within_limit(size: u64, max_bytes: u64) -> anyhow::Result<()> {
    if size > max_bytes {
        bail!("attachment is {} bytes, the limit is {}", size, max_bytes);
    }
    Ok(())
}

#[async_trait]
impl SpeechService for WhisperSpeechService {
    #[instrument(skip(self), fields(model = %self.model))]
    async fn transcribe_audio(&self, path: &Path) -> Result<String, TutorError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(TutorError::ProviderFailure(anyhow!(
                "audio file {} not found",
                path.display()
            )));
        }
        let request = CreateTranscriptionRequestArgs::default()
            .file(path)
            .model(&self.model)
            .build()
            .map_err(|e| TutorError::ProviderFailure(e.into()))?;
        let response = self
            .client
            .audio()
            .transcribe(request)
            .await
            .map_err(|e| TutorError::ProviderFailure(anyhow::Error::new(e).context("transcription failed")))?;
        Ok(response.text.trim().to_string())
    }

    #[instrument(skip(self, url))]
    async fn process_voice_recording(&self, url: &str, user_id: Uuid) -> Result<String, TutorError> {
        let path = self
            .download(url, user_id)
            .await
            .map_err(TutorError::ProviderFailure)?;

        let transcription = self.transcribe_audio(&path).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove downloaded recording");
        }
        transcription
    }
}
