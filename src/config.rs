use std::{path::PathBuf, str::FromStr};

use tokio::time::Duration;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_YT_DLP_TIMEOUT_SECONDS: u64 = 600;
const DEFAULT_COOKIES_FILE: &str = "cookies.txt";
const DEFAULT_SCRATCH_DIR: &str = "temp_downloads";

/// How playlist tracks report their formats when no transcode is requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaylistFormats {
    /// Hand back each track's extractor formats untouched.
    #[default]
    Raw,
    /// Classify, deduplicate and trim each track like a single item.
    Ranked,
}

impl FromStr for PlaylistFormats {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "ranked" => Ok(Self::Ranked),
            other => Err(format!("unknown playlist format mode {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
    pub jwt_secret: Option<String>,
    /// Optional cookie jar handed to the extractor when it exists on disk.
    pub cookies_file: PathBuf,
    pub scratch_root: PathBuf,
    pub yt_dlp_program: String,
    pub yt_dlp_timeout: Duration,
    pub playlist_formats: PlaylistFormats,
}

impl AppConfig {
    /// Defaults rooted at `install_root`, no secret, no CORS origins.
    pub fn with_root(install_root: impl Into<PathBuf>) -> Self {
        let root = install_root.into();
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            allowed_origins: Vec::new(),
            jwt_secret: None,
            cookies_file: root.join(DEFAULT_COOKIES_FILE),
            scratch_root: root.join(DEFAULT_SCRATCH_DIR),
            yt_dlp_program: "yt-dlp".to_string(),
            yt_dlp_timeout: Duration::from_secs(DEFAULT_YT_DLP_TIMEOUT_SECONDS),
            playlist_formats: PlaylistFormats::Raw,
        }
    }

    pub fn from_env(install_root: impl Into<PathBuf>) -> Result<Self, String> {
        let mut config = Self::with_root(install_root);

        config.bind_addr = resolve_bind_addr();
        config.allowed_origins = read_list_env("ALLOWED_ORIGINS");
        config.jwt_secret = read_string_env("JWT_SECRET");

        if let Some(path) = read_string_env("COOKIES_FILE") {
            config.cookies_file = PathBuf::from(path);
        }
        if let Some(path) = read_string_env("SCRATCH_DIR") {
            config.scratch_root = PathBuf::from(path);
        }
        if let Some(program) = read_string_env("YT_DLP_BIN") {
            config.yt_dlp_program = program;
        }
        if let Some(seconds) = read_u64_env("YT_DLP_TIMEOUT_SECONDS").filter(|value| *value > 0) {
            config.yt_dlp_timeout = Duration::from_secs(seconds);
        }
        if let Some(mode) = read_string_env("PLAYLIST_FORMATS") {
            config.playlist_formats = mode.parse()?;
        }

        Ok(config)
    }
}

fn read_string_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_u64_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn read_list_env(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = read_string_env("APP_ADDR") {
        return configured;
    }

    if let Some(port) = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
    {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}
