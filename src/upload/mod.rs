use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::PipelineError;
use crate::store::{EpisodeStore, artifact_present};
use crate::ui::prelude::{Level, emit};

pub const UPLOAD_LOG_FILE: &str = "uploaded_videos.json";

/// Append-only record of published episodes, `folder key -> platform video
/// id`. The whole file is rewritten after every successful upload so an
/// aborted run keeps everything recorded so far.
pub struct UploadLog {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl UploadLog {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents).map_err(|e| {
                PipelineError::UploadFailed(format!(
                    "unreadable upload log {}: {e}",
                    path.display()
                ))
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn contains(&self, folder_key: &str) -> bool {
        self.entries.contains_key(folder_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record(&mut self, folder_key: &str, video_id: &str) -> Result<(), PipelineError> {
        self.entries
            .insert(folder_key.to_string(), video_id.to_string());
        let contents = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// Everything the hosting platform needs besides the video file itself.
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
    pub publish_at: Option<String>,
}

/// The video-hosting platform, behind a seam so the publish workflow can be
/// exercised without network access.
pub trait VideoHost {
    fn channel_title(&self) -> Result<String, PipelineError>;
    fn upload(&self, video: &Path, metadata: &UploadMetadata) -> Result<String, PipelineError>;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub uploaded: usize,
    pub already_published: usize,
    pub missing_video: usize,
}

/// Upload every finished, unpublished episode in key order.
///
/// The channel check runs first: publishing to the wrong logged-in channel is
/// unrecoverable, so a mismatch aborts before any upload as a typed error the
/// caller decides how to surface.
pub fn publish_pending(
    config: &Config,
    store: &EpisodeStore,
    log: &mut UploadLog,
    host: &dyn VideoHost,
) -> Result<PublishSummary, PipelineError> {
    let upload = &config.upload;

    let actual = host.channel_title()?;
    if !upload.expected_channel.is_empty() && actual != upload.expected_channel {
        return Err(PipelineError::AuthMismatch {
            expected: upload.expected_channel.clone(),
            actual,
        });
    }
    emit(
        Level::Success,
        "upload.channel",
        &format!("Authenticated as: {actual}"),
        None,
    );

    let mut summary = PublishSummary::default();
    for episode in store.episodes()? {
        if !artifact_present(&episode.video_path()) {
            emit(
                Level::Warn,
                "upload.skip",
                &format!("{}: video not found, skipping", episode.key()),
                None,
            );
            summary.missing_video += 1;
            continue;
        }
        if log.contains(episode.key()) {
            emit(
                Level::Info,
                "upload.skip",
                &format!("{}: already uploaded, skipping", episode.key()),
                None,
            );
            summary.already_published += 1;
            continue;
        }

        let title = display_title(&config.show.name, episode.key())
            .unwrap_or_else(|| episode.key().to_string());
        let description = fs::read_to_string(episode.script_path())
            .unwrap_or_else(|_| upload.default_description.clone());
        let publish_at =
            next_publish_time(Utc::now(), upload.publish_hour, upload.utc_offset_minutes);

        let metadata = UploadMetadata {
            title: title.clone(),
            description,
            tags: upload.tags.clone(),
            category_id: upload.category_id.clone(),
            privacy_status: upload.privacy_status.clone(),
            publish_at: Some(publish_at.to_rfc3339()),
        };

        let video_id = host.upload(&episode.video_path(), &metadata)?;
        log.record(episode.key(), &video_id)?;
        summary.uploaded += 1;
        emit(
            Level::Success,
            "upload.episode",
            &format!("Uploaded: {title} -> https://youtu.be/{video_id}"),
            None,
        );
    }
    Ok(summary)
}

/// Reconstruct a display title from a folder key:
/// `ep03-the-river-song` -> `Show: Episode 3: The River Song`.
pub fn display_title(show: &str, folder_key: &str) -> Option<String> {
    let (id_part, slug) = folder_key.split_once('-')?;
    let id: u32 = id_part.strip_prefix("ep")?.parse().ok()?;

    let title = slug
        .split('-')
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ");

    if show.is_empty() {
        Some(format!("Episode {id}: {title}"))
    } else {
        Some(format!("{show}: Episode {id}: {title}"))
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Next occurrence of the configured wall-clock hour in the configured UTC
/// offset, expressed in UTC. Rolls to tomorrow when today's slot has passed.
pub fn next_publish_time(now: DateTime<Utc>, hour: u32, offset_minutes: i32) -> DateTime<Utc> {
    let offset = FixedOffset::east_opt(offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
    let local_now = now.with_timezone(&offset);
    let wall = local_now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .expect("valid wall-clock hour");
    let mut slot = offset
        .from_local_datetime(&wall)
        .single()
        .expect("fixed offsets are unambiguous");
    if slot <= local_now {
        slot += Duration::days(1);
    }
    slot.with_timezone(&Utc)
}

const CHANNELS_URL: &str = "https://www.googleapis.com/youtube/v3/channels";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

/// YouTube Data API v3 host using a pre-acquired bearer token. The OAuth
/// consent flow happens outside this tool.
pub struct YouTubeHost {
    client: Client,
    token: String,
}

impl YouTubeHost {
    pub fn new(token: String) -> Self {
        Self {
            client: Client::new(),
            token,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl VideoHost for YouTubeHost {
    fn channel_title(&self) -> Result<String, PipelineError> {
        let response = self
            .client
            .get(format!("{CHANNELS_URL}?part=snippet&mine=true"))
            .header(AUTHORIZATION, self.bearer())
            .send()
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(PipelineError::UploadFailed(format!(
                "channel lookup returned {status}: {}",
                detail.trim()
            )));
        }

        let value: serde_json::Value = response
            .json()
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;
        value["items"][0]["snippet"]["title"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                PipelineError::UploadFailed(
                    "could not verify the authenticated channel".to_string(),
                )
            })
    }

    fn upload(&self, video: &Path, metadata: &UploadMetadata) -> Result<String, PipelineError> {
        let mut status_body = json!({ "privacyStatus": metadata.privacy_status });
        if let Some(publish_at) = &metadata.publish_at {
            status_body["publishAt"] = json!(publish_at);
        }
        let body = json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
                "tags": metadata.tags,
                "categoryId": metadata.category_id,
            },
            "status": status_body,
        });

        // Resumable protocol: metadata first, then the bytes against the
        // session URI the API hands back.
        let response = self
            .client
            .post(format!("{UPLOAD_URL}?uploadType=resumable&part=snippet,status"))
            .header(AUTHORIZATION, self.bearer())
            .header("X-Upload-Content-Type", "video/mp4")
            .json(&body)
            .send()
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(PipelineError::UploadFailed(format!(
                "upload session returned {status}: {}",
                detail.trim()
            )));
        }

        let session = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                PipelineError::UploadFailed("upload session URI missing".to_string())
            })?;

        let bytes = fs::read(video)?;
        let response = self
            .client
            .put(&session)
            .header(AUTHORIZATION, self.bearer())
            .header(CONTENT_TYPE, "video/mp4")
            .body(bytes)
            .send()
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(PipelineError::UploadFailed(format!(
                "upload returned {status}: {}",
                detail.trim()
            )));
        }

        let value: serde_json::Value = response
            .json()
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;
        value["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| PipelineError::UploadFailed("upload response missing id".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FakeHost {
        channel: String,
        uploads: RefCell<Vec<UploadMetadata>>,
    }

    impl FakeHost {
        fn new(channel: &str) -> Self {
            Self {
                channel: channel.to_string(),
                uploads: RefCell::new(Vec::new()),
            }
        }
    }

    impl VideoHost for FakeHost {
        fn channel_title(&self) -> Result<String, PipelineError> {
            Ok(self.channel.clone())
        }

        fn upload(
            &self,
            _video: &Path,
            metadata: &UploadMetadata,
        ) -> Result<String, PipelineError> {
            self.uploads.borrow_mut().push(metadata.clone());
            Ok(format!("vid{}", self.uploads.borrow().len()))
        }
    }

    fn store_with_episodes(dir: &Path) -> EpisodeStore {
        let store = EpisodeStore::open(dir).unwrap();
        for (id, title, finished) in [(1, "first", true), (2, "second", false), (3, "third", true)]
        {
            let episode = store.create_episode(id, title).unwrap();
            fs::write(episode.script_path(), format!("script {id}")).unwrap();
            if finished {
                fs::write(episode.video_path(), b"video").unwrap();
            }
        }
        store
    }

    #[test]
    fn log_round_trips_through_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(UPLOAD_LOG_FILE);

        let mut log = UploadLog::load(&path).unwrap();
        assert!(log.is_empty());
        log.record("ep01-first", "abc123").unwrap();

        let reloaded = UploadLog::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains("ep01-first"));
        assert!(!reloaded.contains("ep02-second"));
    }

    #[test]
    fn publishes_finished_unrecorded_episodes_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_episodes(dir.path());

        let mut config = Config::default();
        config.output_dir = dir.path().to_path_buf();
        config.upload.expected_channel = "My Channel".to_string();

        let mut log = UploadLog::load(dir.path().join(UPLOAD_LOG_FILE)).unwrap();
        log.record("ep03-third", "already").unwrap();

        let host = FakeHost::new("My Channel");
        let summary = publish_pending(&config, &store, &mut log, &host).unwrap();

        assert_eq!(summary.uploaded, 1);
        assert_eq!(summary.already_published, 1);
        assert_eq!(summary.missing_video, 1);
        assert!(log.contains("ep01-first"));

        let uploads = host.uploads.borrow();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].title, "Jay & Tiger: Episode 1: First");
        assert_eq!(uploads[0].description, "script 1");
        assert!(uploads[0].publish_at.is_some());
    }

    #[test]
    fn channel_mismatch_aborts_before_any_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_episodes(dir.path());

        let mut config = Config::default();
        config.output_dir = dir.path().to_path_buf();
        config.upload.expected_channel = "My Channel".to_string();

        let mut log = UploadLog::load(dir.path().join(UPLOAD_LOG_FILE)).unwrap();
        let host = FakeHost::new("Another Channel");

        let err = publish_pending(&config, &store, &mut log, &host).unwrap_err();
        assert!(matches!(err, PipelineError::AuthMismatch { .. }));
        assert!(host.uploads.borrow().is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn builds_display_titles_from_folder_keys() {
        assert_eq!(
            display_title("Jay & Tiger", "ep03-the-river-song").as_deref(),
            Some("Jay & Tiger: Episode 3: The River Song")
        );
        assert_eq!(
            display_title("", "ep12-night-walk").as_deref(),
            Some("Episode 12: Night Walk")
        );
        assert_eq!(display_title("Show", "not-an-episode"), None);
    }

    #[test]
    fn schedules_for_today_before_the_slot_and_tomorrow_after() {
        // 10:00 UTC is 15:30 IST, before the 18:00 slot
        let before = Utc.with_ymd_and_hms(2026, 8, 6, 10, 0, 0).unwrap();
        let slot = next_publish_time(before, 18, 330);
        assert_eq!(slot, Utc.with_ymd_and_hms(2026, 8, 6, 12, 30, 0).unwrap());

        // 13:00 UTC is 18:30 IST, past the slot, so tomorrow
        let after = Utc.with_ymd_and_hms(2026, 8, 6, 13, 0, 0).unwrap();
        let slot = next_publish_time(after, 18, 330);
        assert_eq!(slot, Utc.with_ymd_and_hms(2026, 8, 7, 12, 30, 0).unwrap());
    }
}
