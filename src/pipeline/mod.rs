use std::fs;

use crate::assembly::{ClipLibraryAssembly, StillImageAssembly, VideoAssemblyStrategy};
use crate::config::{AssemblyMode, Config};
use crate::error::PipelineError;
use crate::media::MediaTool;
use crate::openai::{ImageGenerator, ScriptProvider, SpeechSynthesizer};
use crate::store::{Episode, EpisodeStore, artifact_present};
use crate::ui::prelude::{Level, emit};

/// Drives the per-episode stages in order, skipping any stage whose artifact
/// already exists. Stage state lives entirely on disk, so an interrupted run
/// resumes at the first incomplete stage next time.
pub struct Pipeline<'a> {
    config: &'a Config,
    store: &'a EpisodeStore,
    scripts: &'a dyn ScriptProvider,
    speech: &'a dyn SpeechSynthesizer,
    images: &'a dyn ImageGenerator,
    media: &'a dyn MediaTool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub repaired: usize,
    pub skipped: usize,
    pub untouched: usize,
    pub failed: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a EpisodeStore,
        scripts: &'a dyn ScriptProvider,
        speech: &'a dyn SpeechSynthesizer,
        images: &'a dyn ImageGenerator,
        media: &'a dyn MediaTool,
    ) -> Self {
        Self {
            config,
            store,
            scripts,
            speech,
            images,
            media,
        }
    }

    /// Produce one new episode end to end. Returns its folder key.
    pub fn generate(&self) -> Result<String, PipelineError> {
        let id = self.store.next_episode_id()?;
        let title = self.scripts.generate_title()?;
        let episode = self.store.create_episode(id, &title)?;
        emit(
            Level::Info,
            "generate.episode",
            &format!("Starting episode {}", episode.key()),
            None,
        );

        self.ensure_script(&episode, &title)?;
        self.complete_stages(&episode)?;
        Ok(episode.key().to_string())
    }

    /// Complete missing stages across every existing episode. Episodes
    /// without a script cannot be rebuilt (the prompt that produced them is
    /// gone) and are skipped with a warning.
    pub fn repair(&self) -> Result<RepairSummary, PipelineError> {
        let mut summary = RepairSummary::default();
        for episode in self.store.episodes()? {
            emit(
                Level::Info,
                "repair.check",
                &format!("Checking {}", episode.key()),
                None,
            );

            if !artifact_present(&episode.script_path()) {
                emit(
                    Level::Warn,
                    "repair.skip",
                    &format!("{}: missing script, skipping", episode.key()),
                    None,
                );
                summary.skipped += 1;
                continue;
            }
            if self.config.assembly == AssemblyMode::StillImage
                && !artifact_present(&episode.prompt_path())
            {
                emit(
                    Level::Warn,
                    "repair.skip",
                    &format!("{}: missing image prompt, skipping", episode.key()),
                    None,
                );
                summary.skipped += 1;
                continue;
            }

            let was_complete = artifact_present(&episode.video_path());
            match self.complete_stages(&episode) {
                Ok(()) if was_complete => summary.untouched += 1,
                Ok(()) => {
                    summary.repaired += 1;
                    emit(
                        Level::Success,
                        "repair.episode",
                        &format!("Repaired {}", episode.key()),
                        None,
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    emit(
                        Level::Error,
                        "repair.episode",
                        &format!("{}: {e}", episode.key()),
                        None,
                    );
                }
            }
        }
        Ok(summary)
    }

    /// Stages after the script, shared by generate and repair.
    fn complete_stages(&self, episode: &Episode) -> Result<(), PipelineError> {
        self.ensure_narration(episode)?;
        if self.config.assembly == AssemblyMode::StillImage {
            self.ensure_image(episode)?;
        }
        self.ensure_video(episode)
    }

    fn ensure_script(&self, episode: &Episode, title: &str) -> Result<(), PipelineError> {
        let path = episode.script_path();
        if artifact_present(&path) {
            emit(
                Level::Info,
                "generate.script",
                "Script already exists, skipping",
                None,
            );
        } else {
            let script = self.scripts.generate_script(title)?;
            fs::write(&path, script)?;
            emit(Level::Success, "generate.script", "Script written", None);
        }

        if self.config.assembly == AssemblyMode::StillImage {
            let prompt_path = episode.prompt_path();
            if !artifact_present(&prompt_path) {
                fs::write(&prompt_path, &self.config.show.image_prompt)?;
            }
        }
        Ok(())
    }

    fn ensure_narration(&self, episode: &Episode) -> Result<(), PipelineError> {
        let path = episode.voice_path();
        if artifact_present(&path) {
            emit(
                Level::Info,
                "generate.narration",
                "Narration already exists, skipping",
                None,
            );
            return Ok(());
        }

        let script = fs::read_to_string(episode.script_path())?;
        let audio = self.speech.synthesize(&script)?;
        fs::write(&path, audio)?;
        emit(
            Level::Success,
            "generate.narration",
            "Narration synthesized",
            None,
        );
        Ok(())
    }

    fn ensure_image(&self, episode: &Episode) -> Result<(), PipelineError> {
        let path = episode.image_path();
        if artifact_present(&path) {
            emit(
                Level::Info,
                "generate.image",
                "Image already exists, skipping",
                None,
            );
            return Ok(());
        }

        let prompt = fs::read_to_string(episode.prompt_path())?;
        let image = self.images.generate(&prompt)?;
        fs::write(&path, image)?;
        emit(Level::Success, "generate.image", "Image generated", None);
        Ok(())
    }

    fn ensure_video(&self, episode: &Episode) -> Result<(), PipelineError> {
        let path = episode.video_path();
        if artifact_present(&path) {
            emit(
                Level::Info,
                "generate.video",
                "Video already exists, skipping",
                None,
            );
            return Ok(());
        }

        self.strategy().assemble(episode, self.media)?;
        emit(Level::Success, "generate.video", "Video assembled", None);
        Ok(())
    }

    fn strategy(&self) -> Box<dyn VideoAssemblyStrategy> {
        match self.config.assembly {
            AssemblyMode::ClipLibrary => Box::new(ClipLibraryAssembly::new(
                self.config.clips_dir.clone(),
                self.config.max_duration_secs,
            )),
            AssemblyMode::StillImage => {
                Box::new(StillImageAssembly::new(self.config.max_duration_secs))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::{Path, PathBuf};

    struct FakeScripts {
        title_calls: Cell<usize>,
        script_calls: Cell<usize>,
    }

    impl FakeScripts {
        fn new() -> Self {
            Self {
                title_calls: Cell::new(0),
                script_calls: Cell::new(0),
            }
        }
    }

    impl ScriptProvider for FakeScripts {
        fn generate_title(&self) -> Result<String, PipelineError> {
            self.title_calls.set(self.title_calls.get() + 1);
            Ok("The River Song".to_string())
        }

        fn generate_script(&self, title: &str) -> Result<String, PipelineError> {
            self.script_calls.set(self.script_calls.get() + 1);
            Ok(format!("Once upon a time: {title}"))
        }
    }

    struct FakeSpeech {
        calls: Cell<usize>,
    }

    impl FakeSpeech {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
            }
        }
    }

    impl SpeechSynthesizer for FakeSpeech {
        fn synthesize(&self, _text: &str) -> Result<Vec<u8>, PipelineError> {
            self.calls.set(self.calls.get() + 1);
            Ok(b"narration-audio".to_vec())
        }
    }

    struct FakeImages {
        calls: Cell<usize>,
    }

    impl FakeImages {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
            }
        }
    }

    impl ImageGenerator for FakeImages {
        fn generate(&self, _prompt: &str) -> Result<Vec<u8>, PipelineError> {
            self.calls.set(self.calls.get() + 1);
            Ok(b"image-bytes".to_vec())
        }
    }

    struct FakeMedia {
        voice_secs: f64,
        fail_concat: Cell<bool>,
    }

    impl FakeMedia {
        fn new(voice_secs: f64) -> Self {
            Self {
                voice_secs,
                fail_concat: Cell::new(false),
            }
        }
    }

    impl MediaTool for FakeMedia {
        fn probe_duration(&self, path: &Path) -> Result<f64, PipelineError> {
            if path.extension().and_then(|e| e.to_str()) == Some("mp3") {
                Ok(self.voice_secs)
            } else {
                Ok(10.0)
            }
        }

        fn concat_copy(&self, _inputs: &[PathBuf], output: &Path) -> Result<(), PipelineError> {
            if self.fail_concat.get() {
                return Err(PipelineError::AssemblyFailed("concat exit 1".to_string()));
            }
            fs::write(output, b"concat").unwrap();
            Ok(())
        }

        fn mux(
            &self,
            _video: &Path,
            _audio: &Path,
            output: &Path,
            _narration_secs: f64,
            _max_secs: Option<f64>,
        ) -> Result<(), PipelineError> {
            fs::write(output, b"muxed-video").unwrap();
            Ok(())
        }

        fn loop_still(
            &self,
            _image: &Path,
            _audio: &Path,
            output: &Path,
            _narration_secs: f64,
            _max_secs: Option<f64>,
        ) -> Result<(), PipelineError> {
            fs::write(output, b"looped-video").unwrap();
            Ok(())
        }
    }

    struct Fixture {
        _dirs: (tempfile::TempDir, tempfile::TempDir),
        config: Config,
        store: EpisodeStore,
        scripts: FakeScripts,
        speech: FakeSpeech,
        images: FakeImages,
        media: FakeMedia,
    }

    impl Fixture {
        fn new(mode: AssemblyMode) -> Self {
            let output = tempfile::tempdir().unwrap();
            let clips = tempfile::tempdir().unwrap();
            for i in 0..3 {
                fs::write(clips.path().join(format!("clip{i}.mp4")), b"clip").unwrap();
            }

            let mut config = Config::default();
            config.output_dir = output.path().to_path_buf();
            config.clips_dir = clips.path().to_path_buf();
            config.assembly = mode;

            let store = EpisodeStore::open(output.path()).unwrap();
            Self {
                _dirs: (output, clips),
                config,
                store,
                scripts: FakeScripts::new(),
                speech: FakeSpeech::new(),
                images: FakeImages::new(),
                media: FakeMedia::new(25.0),
            }
        }

        fn pipeline(&self) -> Pipeline<'_> {
            Pipeline::new(
                &self.config,
                &self.store,
                &self.scripts,
                &self.speech,
                &self.images,
                &self.media,
            )
        }
    }

    #[test]
    fn generate_produces_all_artifacts() {
        let fx = Fixture::new(AssemblyMode::ClipLibrary);

        let key = fx.pipeline().generate().unwrap();
        assert_eq!(key, "ep01-the-river-song");

        let episodes = fx.store.episodes().unwrap();
        let episode = &episodes[0];
        assert!(artifact_present(&episode.script_path()));
        assert!(artifact_present(&episode.voice_path()));
        assert!(artifact_present(&episode.video_path()));
        assert!(!episode.concat_path().exists());
        assert_eq!(fx.scripts.title_calls.get(), 1);
        assert_eq!(fx.scripts.script_calls.get(), 1);
        assert_eq!(fx.speech.calls.get(), 1);
        assert_eq!(fx.images.calls.get(), 0);
    }

    #[test]
    fn repair_leaves_complete_episodes_untouched() {
        let fx = Fixture::new(AssemblyMode::ClipLibrary);
        fx.pipeline().generate().unwrap();

        let episodes = fx.store.episodes().unwrap();
        let episode = &episodes[0];
        let script_before = fs::read(episode.script_path()).unwrap();
        let voice_before = fs::read(episode.voice_path()).unwrap();
        let video_before = fs::read(episode.video_path()).unwrap();

        let summary = fx.pipeline().repair().unwrap();
        assert_eq!(summary.untouched, 1);
        assert_eq!(summary.repaired, 0);

        // No second round of external calls, artifacts byte-identical
        assert_eq!(fx.scripts.script_calls.get(), 1);
        assert_eq!(fx.speech.calls.get(), 1);
        assert_eq!(fs::read(episode.script_path()).unwrap(), script_before);
        assert_eq!(fs::read(episode.voice_path()).unwrap(), voice_before);
        assert_eq!(fs::read(episode.video_path()).unwrap(), video_before);
    }

    #[test]
    fn repair_completes_partial_episode_without_regenerating_script() {
        let fx = Fixture::new(AssemblyMode::ClipLibrary);
        let episode = fx.store.create_episode(1, "half done").unwrap();
        fs::write(episode.script_path(), b"a script").unwrap();

        let summary = fx.pipeline().repair().unwrap();
        assert_eq!(summary.repaired, 1);
        assert!(artifact_present(&episode.voice_path()));
        assert!(artifact_present(&episode.video_path()));
        assert_eq!(fx.scripts.title_calls.get(), 0);
        assert_eq!(fx.scripts.script_calls.get(), 0);
        assert_eq!(fx.speech.calls.get(), 1);
    }

    #[test]
    fn repair_skips_episodes_without_a_script() {
        let fx = Fixture::new(AssemblyMode::ClipLibrary);
        fx.store.create_episode(1, "orphan").unwrap();

        let summary = fx.pipeline().repair().unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.repaired, 0);
        assert_eq!(fx.speech.calls.get(), 0);
    }

    #[test]
    fn assembly_failure_keeps_earlier_artifacts_for_the_next_run() {
        let fx = Fixture::new(AssemblyMode::ClipLibrary);
        fx.media.fail_concat.set(true);

        let err = fx.pipeline().generate().unwrap_err();
        assert!(matches!(err, PipelineError::AssemblyFailed(_)));

        let episodes = fx.store.episodes().unwrap();
        let episode = &episodes[0];
        assert!(artifact_present(&episode.script_path()));
        assert!(artifact_present(&episode.voice_path()));
        assert!(!episode.video_path().exists());

        // The next invocation resumes at the failed stage only
        fx.media.fail_concat.set(false);
        let summary = fx.pipeline().repair().unwrap();
        assert_eq!(summary.repaired, 1);
        assert_eq!(fx.speech.calls.get(), 1);
        assert!(artifact_present(&episode.video_path()));
    }

    #[test]
    fn still_image_mode_generates_prompt_and_image() {
        let fx = Fixture::new(AssemblyMode::StillImage);

        fx.pipeline().generate().unwrap();

        let episodes = fx.store.episodes().unwrap();
        let episode = &episodes[0];
        assert!(artifact_present(&episode.prompt_path()));
        assert!(artifact_present(&episode.image_path()));
        assert!(artifact_present(&episode.video_path()));
        assert_eq!(fx.images.calls.get(), 1);
        assert_eq!(
            fs::read_to_string(episode.video_path()).unwrap(),
            "looped-video"
        );
    }

    #[test]
    fn still_image_repair_requires_the_prompt_artifact() {
        let fx = Fixture::new(AssemblyMode::StillImage);
        let episode = fx.store.create_episode(1, "legacy").unwrap();
        fs::write(episode.script_path(), b"a script").unwrap();

        let summary = fx.pipeline().repair().unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(fx.images.calls.get(), 0);
    }
}
