use url::Url;

const MUSIC_HOST: &str = "music.youtube.com";
const CANONICAL_HOST: &str = "www.youtube.com";

/// A request URL after alias rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    /// URL handed to the extractor.
    pub url: String,
    /// Whether the caller's original URL pointed at the music front-end.
    /// Drives the audio-only response shape even though `url` was rewritten.
    pub is_alternate_source: bool,
}

/// Rewrites the music front-end host to the canonical video host, keeping
/// path and query intact. Pure string work, no network access.
pub fn normalize_source_url(raw: &str) -> SourceUrl {
    let trimmed = raw.trim();

    let Ok(mut parsed) = Url::parse(trimmed) else {
        return rewrite_schemeless(trimmed);
    };

    let is_alternate_source = parsed
        .host_str()
        .is_some_and(|host| host.eq_ignore_ascii_case(MUSIC_HOST));

    if is_alternate_source && parsed.set_host(Some(CANONICAL_HOST)).is_ok() {
        return SourceUrl {
            url: parsed.to_string(),
            is_alternate_source,
        };
    }

    SourceUrl {
        url: trimmed.to_string(),
        is_alternate_source,
    }
}

/// Handles input such as `music.youtube.com/watch?v=X` that has no scheme.
fn rewrite_schemeless(trimmed: &str) -> SourceUrl {
    let host_len = trimmed
        .find(['/', '?', '#'])
        .unwrap_or(trimmed.len());
    let (host, rest) = trimmed.split_at(host_len);

    if host.eq_ignore_ascii_case(MUSIC_HOST) {
        return SourceUrl {
            url: format!("{CANONICAL_HOST}{rest}"),
            is_alternate_source: true,
        };
    }

    SourceUrl {
        url: trimmed.to_string(),
        is_alternate_source: false,
    }
}
