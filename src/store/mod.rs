use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

lazy_static! {
    static ref EPISODE_KEY: Regex = Regex::new(r"^ep(\d+)-").expect("valid episode key pattern");
}

/// Returns true when a stage artifact is present and non-empty.
///
/// Presence of a non-empty file is the only stage state the pipeline keeps;
/// empty files (from an interrupted write) count as missing so the stage is
/// retried on the next run.
pub fn artifact_present(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Derive a folder-safe slug from a generated title.
///
/// Quote characters are stripped rather than replaced so titles like
/// `"Jay's River Day"` stay readable. Two titles may slug identically; the
/// numeric id prefix keeps folder keys unique regardless.
pub fn slugify(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| *c != '"' && *c != '\'')
        .collect();
    cleaned
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Directory-per-episode artifact store rooted at the output directory.
pub struct EpisodeStore {
    root: PathBuf,
}

impl EpisodeStore {
    /// Open the store, creating the root directory if absent.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| PipelineError::StoreUnavailable {
            path: root.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Next sequential episode id: max of existing ids plus one.
    pub fn next_episode_id(&self) -> Result<u32, PipelineError> {
        let mut max_id = 0u32;
        for entry in self.list_root()? {
            if let Some(id) = parse_episode_id(&entry) {
                max_id = max_id.max(id);
            }
        }
        Ok(max_id + 1)
    }

    /// Create (or reopen) the folder for a new episode.
    pub fn create_episode(&self, id: u32, title: &str) -> Result<Episode, PipelineError> {
        let key = format!("ep{:02}-{}", id, slugify(title));
        let folder = self.root.join(&key);
        fs::create_dir_all(&folder)?;
        Ok(Episode { key, folder })
    }

    /// All existing episodes, sorted by folder key.
    pub fn episodes(&self) -> Result<Vec<Episode>, PipelineError> {
        let mut episodes: Vec<Episode> = self
            .list_root()?
            .into_iter()
            .filter(|name| EPISODE_KEY.is_match(name))
            .map(|key| Episode {
                folder: self.root.join(&key),
                key,
            })
            .collect();
        episodes.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(episodes)
    }

    fn list_root(&self) -> Result<Vec<String>, PipelineError> {
        let entries = fs::read_dir(&self.root).map_err(|e| PipelineError::StoreUnavailable {
            path: self.root.clone(),
            reason: e.to_string(),
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::StoreUnavailable {
                path: self.root.clone(),
                reason: e.to_string(),
            })?;
            if entry.path().is_dir() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }
}

fn parse_episode_id(name: &str) -> Option<u32> {
    EPISODE_KEY
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// One episode folder and the well-known artifact paths inside it.
#[derive(Debug, Clone)]
pub struct Episode {
    key: String,
    folder: PathBuf,
}

impl Episode {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn id(&self) -> Option<u32> {
        parse_episode_id(&self.key)
    }

    pub fn script_path(&self) -> PathBuf {
        self.folder.join("script.txt")
    }

    pub fn prompt_path(&self) -> PathBuf {
        self.folder.join("prompt.txt")
    }

    pub fn image_path(&self) -> PathBuf {
        self.folder.join("image.jpg")
    }

    pub fn voice_path(&self) -> PathBuf {
        self.folder.join("voice.mp3")
    }

    pub fn video_path(&self) -> PathBuf {
        self.folder.join("video.mp4")
    }

    /// Intermediate concatenated clip track, removed after a successful mux.
    pub fn concat_path(&self) -> PathBuf {
        self.folder.join("concat.mp4")
    }
}
