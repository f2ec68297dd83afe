use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the shortsmith config directory, creating it if needed.
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("shortsmith");

    fs::create_dir_all(&dir)
        .with_context(|| format!("creating config directory at {}", dir.display()))?;

    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Which video assembly strategy the pipeline uses.
///
/// `clip-library` covers the narration with randomly drawn stock clips;
/// `still-image` loops a single generated image, which is how early episodes
/// were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssemblyMode {
    #[default]
    ClipLibrary,
    StillImage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one folder per produced episode
    pub output_dir: PathBuf,
    /// Directory of reusable stock footage clips
    pub clips_dir: PathBuf,
    /// Video assembly strategy (clip-library or still-image)
    pub assembly: AssemblyMode,
    /// Hard cap on final video length in seconds, applied regardless of
    /// narration length (platform shorts limit). Omit for no cap.
    pub max_duration_secs: Option<f64>,
    pub openai: OpenAiConfig,
    pub show: ShowConfig,
    pub upload: UploadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            clips_dir: PathBuf::from("clips"),
            assembly: AssemblyMode::default(),
            max_duration_secs: Some(60.0),
            openai: OpenAiConfig::default(),
            show: ShowConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Self::load_from_path(default_config_path()?),
        }
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Self::default();
            config.save_to_path(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut config: Self = toml::from_str(&contents).context("parsing config")?;
        if let Some(cap) = config.max_duration_secs {
            if !cap.is_finite() || cap <= 0.0 {
                config.max_duration_secs = Some(60.0);
            }
        }
        Ok(config)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("serializing config")?;
        fs::write(path, contents)
            .with_context(|| format!("writing config to {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API key; falls back to the OPENAI_API_KEY environment variable
    pub api_key: Option<String>,
    /// Chat model used for titles and scripts
    pub chat_model: String,
    /// Speech model used for narration
    pub tts_model: String,
    /// Narration voice name
    pub voice: String,
    /// Image model used by the still-image strategy
    pub image_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            chat_model: "gpt-4".to_string(),
            tts_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            image_model: "dall-e-3".to_string(),
        }
    }
}

impl OpenAiConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

/// Prompts defining the show the pipeline produces episodes for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    /// Show name, used as the upload title prefix
    pub name: String,
    /// Prompt asking the language model for one episode title
    pub title_prompt: String,
    /// Prompt asking for the episode script; `{title}` is substituted
    pub script_prompt: String,
    /// Fixed image prompt for the still-image strategy
    pub image_prompt: String,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            name: "Jay & Tiger".to_string(),
            title_prompt: "Give me a short, creative episode title for a children's story \
                           about a boy named Jay and his baby tiger friend in a forest."
                .to_string(),
            script_prompt: "Write a short, 30-60 second story script for kids featuring two \
                            consistent characters:\n\
                            - Jay: A curious boy with slightly messy brown hair and bright \
                            inquisitive blue eyes, wearing a green shirt and brown pants.\n\
                            - Tiger: A playful baby tiger with soft orange and black-striped \
                            fur.\n\
                            The setting is a lush forest with tall trees, colorful flowers, \
                            and a gentle river.\n\
                            Title: {title}.\n\
                            The story should have a simple moral. Avoid changing their \
                            appearance, age, or personality."
                .to_string(),
            image_prompt: "Pixar-style image of a curious boy named Jay with slightly messy \
                           brown hair and bright inquisitive blue eyes, wearing a green shirt \
                           and brown pants, standing beside a playful baby tiger with soft \
                           orange and black-striped fur. They are in a lush green forest with \
                           tall trees, colorful flowers, and a gentle river."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// OAuth bearer token; falls back to the YOUTUBE_ACCESS_TOKEN environment
    /// variable. Token acquisition happens outside this tool.
    pub access_token: Option<String>,
    /// Channel title the token must belong to; empty disables the check
    pub expected_channel: String,
    /// Description used when an episode has no script artifact
    pub default_description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
    /// Local wall-clock hour episodes are scheduled to go live at
    pub publish_hour: u32,
    /// Offset of that wall clock from UTC, in minutes (default IST)
    pub utc_offset_minutes: i32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            expected_channel: String::new(),
            default_description: "A short story from Jay & Tiger!".to_string(),
            tags: vec![
                "shorts".to_string(),
                "kids".to_string(),
                "story".to_string(),
            ],
            category_id: "1".to_string(),
            privacy_status: "unlisted".to_string(),
            publish_hour: 18,
            utc_offset_minutes: 330,
        }
    }
}

impl UploadConfig {
    pub fn resolved_access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| {
                env::var("YOUTUBE_ACCESS_TOKEN")
                    .ok()
                    .filter(|t| !t.is_empty())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_from_path(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.assembly, AssemblyMode::ClipLibrary);
        assert_eq!(config.max_duration_secs, Some(60.0));
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.assembly = AssemblyMode::StillImage;
        config.upload.publish_hour = 9;
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.assembly, AssemblyMode::StillImage);
        assert_eq!(loaded.upload.publish_hour, 9);
    }

    #[test]
    fn rejects_nonsense_duration_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_duration_secs = -5.0\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.max_duration_secs, Some(60.0));
    }
}
