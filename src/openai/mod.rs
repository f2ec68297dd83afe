use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde_json::json;
use std::time::Duration;

use crate::config::{OpenAiConfig, ShowConfig};
use crate::error::PipelineError;

const BASE_URL: &str = "https://api.openai.com/v1";

/// Language-model side of the pipeline: one title, then one script.
pub trait ScriptProvider {
    fn generate_title(&self) -> Result<String, PipelineError>;
    fn generate_script(&self, title: &str) -> Result<String, PipelineError>;
}

/// Text-to-speech side: script text in, narration audio bytes out.
pub trait SpeechSynthesizer {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>, PipelineError>;
}

/// Image generation for the legacy still-image strategy.
pub trait ImageGenerator {
    fn generate(&self, prompt: &str) -> Result<Vec<u8>, PipelineError>;
}

/// Blocking OpenAI API client implementing all three provider seams.
///
/// The pipeline owns skip-if-exists idempotence; every call here performs a
/// paid network request.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    chat_model: String,
    tts_model: String,
    voice: String,
    image_model: String,
    title_prompt: String,
    script_prompt: String,
}

impl OpenAiClient {
    pub fn new(openai: &OpenAiConfig, show: &ShowConfig) -> Result<Self> {
        let api_key = openai.resolved_api_key().context(
            "OpenAI API key not found. Set it in the config file or the OPENAI_API_KEY environment variable",
        )?;

        let client = Client::builder()
            .user_agent(concat!("shortsmith/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            api_key,
            chat_model: openai.chat_model.clone(),
            tts_model: openai.tts_model.clone(),
            voice: openai.voice.clone(),
            image_model: openai.image_model.clone(),
            title_prompt: show.title_prompt.clone(),
            script_prompt: show.script_prompt.clone(),
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    fn chat(&self, prompt: &str) -> Result<String, PipelineError> {
        let body = json!({
            "model": self.chat_model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(format!("{BASE_URL}/chat/completions"))
            .header(AUTHORIZATION, self.bearer())
            .json(&body)
            .send()
            .map_err(|e| PipelineError::ScriptFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(PipelineError::ScriptFailed(format!(
                "API returned {status}: {}",
                detail.trim()
            )));
        }

        let value: serde_json::Value = response
            .json()
            .map_err(|e| PipelineError::ScriptFailed(e.to_string()))?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                PipelineError::ScriptFailed("malformed chat completion response".to_string())
            })
    }
}

impl ScriptProvider for OpenAiClient {
    fn generate_title(&self) -> Result<String, PipelineError> {
        self.chat(&self.title_prompt)
    }

    fn generate_script(&self, title: &str) -> Result<String, PipelineError> {
        let prompt = self.script_prompt.replace("{title}", title);
        self.chat(&prompt)
    }
}

impl SpeechSynthesizer for OpenAiClient {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>, PipelineError> {
        let body = json!({
            "model": self.tts_model,
            "voice": self.voice,
            "input": text,
        });

        let response = self
            .client
            .post(format!("{BASE_URL}/audio/speech"))
            .header(AUTHORIZATION, self.bearer())
            .json(&body)
            .send()
            .map_err(|e| PipelineError::SynthesisFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(PipelineError::SynthesisFailed(format!(
                "API returned {status}: {}",
                detail.trim()
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| PipelineError::SynthesisFailed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(PipelineError::SynthesisFailed(
                "API returned empty audio".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }
}

impl ImageGenerator for OpenAiClient {
    fn generate(&self, prompt: &str) -> Result<Vec<u8>, PipelineError> {
        let body = json!({
            "model": self.image_model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
        });

        let response = self
            .client
            .post(format!("{BASE_URL}/images/generations"))
            .header(AUTHORIZATION, self.bearer())
            .json(&body)
            .send()
            .map_err(|e| PipelineError::ImageFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(PipelineError::ImageFailed(format!(
                "API returned {status}: {}",
                detail.trim()
            )));
        }

        let value: serde_json::Value = response
            .json()
            .map_err(|e| PipelineError::ImageFailed(e.to_string()))?;
        let url = value["data"][0]["url"].as_str().ok_or_else(|| {
            PipelineError::ImageFailed("malformed image generation response".to_string())
        })?;

        // The API returns a short-lived URL rather than inline bytes
        let image = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::ImageFailed(e.to_string()))?
            .bytes()
            .map_err(|e| PipelineError::ImageFailed(e.to_string()))?;
        Ok(image.to_vec())
    }
}
