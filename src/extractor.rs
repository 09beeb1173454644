//! Invocation of the external extraction/transcoding tool.
//!
//! Each request builds its own [`ExtractionConfig`]; nothing about the
//! extractor is process-wide except the executable and its timeout.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{
    process::Command,
    time::{Duration, timeout},
};
use tracing::{debug, warn};

use crate::{error::FetchError, media::ExtractionResult};

const BEST_AUDIO_SELECTOR: &str = "bestaudio/best";
const BEST_COMBINED_SELECTOR: &str = "bestvideo+bestaudio/best";
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
/// Characters stripped from titles before yt-dlp renders file names, so the
/// produced file matches the name the response expects. Without this yt-dlp
/// substitutes full-width lookalikes.
const UNSAFE_TITLE_PATTERN: &str = r#"[\\/*?:"<>|]"#;

/// Post-processing step that turns the downloaded stream into audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTranscode {
    pub codec: &'static str,
    pub quality: &'static str,
}

impl Default for AudioTranscode {
    fn default() -> Self {
        Self {
            codec: "mp3",
            quality: "192",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionConfig {
    pub url: String,
    pub format_selector: &'static str,
    pub output_template: PathBuf,
    pub playlist: bool,
    pub cookies_file: Option<PathBuf>,
    pub transcode: Option<AudioTranscode>,
    /// Materialise files on disk; metadata only otherwise.
    pub download: bool,
}

impl ExtractionConfig {
    pub fn new(
        url: &str,
        want_transcode: bool,
        workspace: &Path,
        cookies_file: Option<PathBuf>,
    ) -> Self {
        Self {
            url: url.to_string(),
            format_selector: if want_transcode {
                BEST_AUDIO_SELECTOR
            } else {
                BEST_COMBINED_SELECTOR
            },
            output_template: workspace.join(OUTPUT_TEMPLATE),
            playlist: true,
            cookies_file,
            transcode: want_transcode.then(AudioTranscode::default),
            download: want_transcode,
        }
    }

    /// Renders the configuration as yt-dlp command line arguments.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "-f".to_string(),
            self.format_selector.to_string(),
            "-o".to_string(),
            self.output_template.to_string_lossy().into_owned(),
        ];

        if self.download {
            args.push("--no-simulate".to_string());
        }

        args.push(if self.playlist {
            "--yes-playlist".to_string()
        } else {
            "--no-playlist".to_string()
        });

        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }

        if let Some(transcode) = &self.transcode {
            args.push("--replace-in-metadata".to_string());
            args.push("title".to_string());
            args.push(UNSAFE_TITLE_PATTERN.to_string());
            args.push(String::new());
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(transcode.codec.to_string());
            args.push("--audio-quality".to_string());
            args.push(transcode.quality.to_string());
        }

        args.push("--".to_string());
        args.push(self.url.clone());
        args
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, config: &ExtractionConfig) -> Result<ExtractionResult, FetchError>;
}

#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    program: String,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn extract(&self, config: &ExtractionConfig) -> Result<ExtractionResult, FetchError> {
        let args = config.to_args();
        debug!("Running {} {:?}", self.program, args);

        let command_future = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output();
        let output = timeout(self.timeout, command_future)
            .await
            .map_err(|_| FetchError::Extraction {
                detail: format!("{} timed out after {:?}", self.program, self.timeout),
            })?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    FetchError::unexpected(format!("{} is not installed", self.program))
                } else {
                    FetchError::unexpected(format!("could not run {}: {error}", self.program))
                }
            })?;

        if output.status.success() {
            return ExtractionResult::from_json(&output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(
            "{} exited with {} for {:?}",
            self.program, output.status, config.url
        );

        // yt-dlp skips unavailable playlist items and still dumps the rest.
        if let Ok(ExtractionResult::Playlist(playlist)) =
            ExtractionResult::from_json(&output.stdout)
            && !playlist.items.is_empty()
        {
            warn!(
                "Continuing with {} playlist item(s) after partial failure: {}",
                playlist.items.len(),
                last_error_line(&stderr)
            );
            return Ok(ExtractionResult::Playlist(playlist));
        }

        Err(classify_failure(&stderr, config.cookies_file.is_some()))
    }
}

/// Maps a failed extractor run onto the client-facing taxonomy. Content that
/// needs a signed-in session is reported as access denied; every other
/// failure is a generic extraction error.
pub fn classify_failure(stderr: &str, had_cookies: bool) -> FetchError {
    let detail = last_error_line(stderr);
    let lower = stderr.to_lowercase();

    let needs_sign_in = lower.contains("sign in to confirm")
        || lower.contains("please sign in")
        || lower.contains("login required")
        || lower.contains("use --cookies")
        || lower.contains("cookies are no longer valid")
        || lower.contains("private video")
        || lower.contains("members-only")
        || lower.contains("join this channel")
        || lower.contains("age-restricted")
        || lower.contains("inappropriate for some users");

    if !needs_sign_in {
        return FetchError::Extraction { detail };
    }

    let message = if had_cookies {
        "This content requires sign-in and the server's stored cookies were rejected."
    } else {
        "This content requires sign-in (cookies) that the server does not have."
    };

    FetchError::AccessDenied {
        message: message.to_string(),
        detail,
    }
}

fn last_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("extractor failed without output")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|arg| arg == flag)
    }

    #[test]
    fn metadata_config_selects_best_combined_without_download() {
        let config = ExtractionConfig::new(
            "https://www.youtube.com/watch?v=X",
            false,
            Path::new("/scratch/fetch-1"),
            None,
        );

        assert_eq!(config.format_selector, "bestvideo+bestaudio/best");
        assert!(config.playlist);
        assert!(config.transcode.is_none());

        let args = config.to_args();
        let format = position(&args, "-f").unwrap();
        assert_eq!(args[format + 1], "bestvideo+bestaudio/best");
        assert!(position(&args, "--no-simulate").is_none());
        assert!(position(&args, "-x").is_none());
        assert!(position(&args, "--cookies").is_none());
        assert!(position(&args, "--yes-playlist").is_some());
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=X");
    }

    #[test]
    fn transcode_config_downloads_best_audio_as_mp3() {
        let config = ExtractionConfig::new(
            "https://www.youtube.com/watch?v=X",
            true,
            Path::new("/scratch/fetch-2"),
            Some(PathBuf::from("/srv/app/cookies.txt")),
        );

        let args = config.to_args();
        let format = position(&args, "-f").unwrap();
        assert_eq!(args[format + 1], "bestaudio/best");
        let output = position(&args, "-o").unwrap();
        assert_eq!(args[output + 1], "/scratch/fetch-2/%(title)s.%(ext)s");
        assert!(position(&args, "--no-simulate").is_some());
        assert!(position(&args, "-x").is_some());
        let codec = position(&args, "--audio-format").unwrap();
        assert_eq!(args[codec + 1], "mp3");
        let quality = position(&args, "--audio-quality").unwrap();
        assert_eq!(args[quality + 1], "192");
        let cookies = position(&args, "--cookies").unwrap();
        assert_eq!(args[cookies + 1], "/srv/app/cookies.txt");
    }

    #[test]
    fn transcode_strips_unsafe_title_characters_before_naming_files() {
        let config = ExtractionConfig::new("https://youtu.be/X", true, Path::new("/w"), None);
        let args = config.to_args();
        let replace = position(&args, "--replace-in-metadata").unwrap();
        assert_eq!(args[replace + 1], "title");
        assert_eq!(args[replace + 2], r#"[\\/*?:"<>|]"#);
        assert_eq!(args[replace + 3], "");
        assert!(replace < position(&args, "--").unwrap());

        let metadata = ExtractionConfig::new("https://youtu.be/X", false, Path::new("/w"), None);
        assert!(position(&metadata.to_args(), "--replace-in-metadata").is_none());
    }

    #[test]
    fn url_is_separated_from_options() {
        let config = ExtractionConfig::new("-rf", false, Path::new("/tmp/w"), None);
        let args = config.to_args();
        assert_eq!(&args[args.len() - 2..], &["--".to_string(), "-rf".to_string()]);
    }

    #[test]
    fn sign_in_wall_without_cookies_is_access_denied() {
        let stderr = "ERROR: [youtube] abc: Sign in to confirm your age. This video may be inappropriate for some users. Use --cookies-from-browser or --cookies for the authentication.";
        let error = classify_failure(stderr, false);
        let FetchError::AccessDenied { message, detail } = error else {
            panic!("expected access denied");
        };
        assert!(message.contains("does not have"));
        assert!(detail.starts_with("ERROR: [youtube] abc"));
    }

    #[test]
    fn sign_in_wall_with_cookies_mentions_rejection() {
        let error = classify_failure("ERROR: Private video. Sign in if you've been granted access", true);
        let FetchError::AccessDenied { message, .. } = error else {
            panic!("expected access denied");
        };
        assert!(message.contains("rejected"));
    }

    #[test]
    fn other_failures_are_extraction_errors_with_last_line_detail() {
        let stderr = "WARNING: something\nERROR: Unable to download webpage: HTTP Error 404\n\n";
        let FetchError::Extraction { detail } = classify_failure(stderr, false) else {
            panic!("expected extraction error");
        };
        assert_eq!(detail, "ERROR: Unable to download webpage: HTTP Error 404");
    }

    #[tokio::test]
    async fn missing_binary_is_an_unexpected_failure() {
        let extractor = YtDlpExtractor::new(
            "fetchmate-definitely-not-installed-binary",
            Duration::from_secs(5),
        );
        let config = ExtractionConfig::new("https://example.com", false, Path::new("/tmp"), None);
        let error = extractor.extract(&config).await.unwrap_err();
        assert!(matches!(error, FetchError::Unexpected { .. }));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// Writes an executable stand-in for yt-dlp with the given body.
        fn script(body: &str) -> (TempDir, PathBuf) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("yt-dlp");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            (dir, path)
        }

        fn extractor(path: &Path, timeout: Duration) -> YtDlpExtractor {
            YtDlpExtractor::new(path.to_string_lossy(), timeout)
        }

        fn config() -> ExtractionConfig {
            ExtractionConfig::new("https://www.youtube.com/watch?v=X", false, Path::new("/tmp"), None)
        }

        #[tokio::test]
        async fn successful_run_parses_stdout() {
            let (_dir, path) = script(r#"printf '%s' '{"title":"Song","uploader":"Band","formats":[]}'"#);
            let result = extractor(&path, Duration::from_secs(10))
                .extract(&config())
                .await
                .unwrap();
            let ExtractionResult::Single(item) = result else {
                panic!("expected a single item");
            };
            assert_eq!(item.title.as_deref(), Some("Song"));
        }

        #[tokio::test]
        async fn hung_extractor_times_out_as_extraction_failure() {
            let (_dir, path) = script("exec sleep 5");
            let error = extractor(&path, Duration::from_millis(200))
                .extract(&config())
                .await
                .unwrap_err();
            assert!(matches!(error, FetchError::Extraction { .. }));
        }

        #[tokio::test]
        async fn partial_playlist_failure_keeps_the_available_items() {
            let (_dir, path) = script(
                r#"printf '%s' '{"_type":"playlist","title":"Mix","entries":[{"title":"One"},null]}'
echo "ERROR: [youtube] abc: Video unavailable" >&2
exit 1"#,
            );
            let result = extractor(&path, Duration::from_secs(10))
                .extract(&config())
                .await
                .unwrap();
            let ExtractionResult::Playlist(playlist) = result else {
                panic!("expected a playlist");
            };
            assert_eq!(playlist.items.len(), 1);
            assert_eq!(playlist.items[0].title.as_deref(), Some("One"));
        }

        #[tokio::test]
        async fn failed_single_item_is_classified_even_with_a_dump() {
            let (_dir, path) = script(
                r#"printf '%s' '{"title":"Song","formats":[]}'
echo "ERROR: [youtube] abc: Private video. Sign in if you've been granted access" >&2
exit 1"#,
            );
            let error = extractor(&path, Duration::from_secs(10))
                .extract(&config())
                .await
                .unwrap_err();
            assert!(matches!(error, FetchError::AccessDenied { .. }));
        }

        #[tokio::test]
        async fn playlist_with_nothing_available_is_classified() {
            let (_dir, path) = script(
                r#"printf '%s' '{"_type":"playlist","entries":[null,null]}'
echo "ERROR: [youtube] abc: Video unavailable" >&2
exit 1"#,
            );
            let error = extractor(&path, Duration::from_secs(10))
                .extract(&config())
                .await
                .unwrap_err();
            assert!(matches!(error, FetchError::Extraction { .. }));
        }
    }
}
