use regex::Regex;
use std::sync::LazyLock;

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap());

// Vite: "  ➜  Local:   http://localhost:3002/"
static LOCAL_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Local:\s+(https?://\S+)").unwrap());

// Uvicorn: "Uvicorn running on http://0.0.0.0:9000 (Press CTRL+C to quit)"
static RUNNING_ON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)running on:?\s+(https?://\S+)").unwrap());

static LISTENING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)listening on:?\s+(https?://\S+)").unwrap());

/// Pull the URL a process advertises for itself out of one output line.
pub fn parse_advertised_url(line: &str) -> Option<String> {
    let clean = strip_ansi(line);
    [&*LOCAL_URL_RE, &*RUNNING_ON_RE, &*LISTENING_RE]
        .into_iter()
        .find_map(|re| re.captures(&clean).map(|caps| caps[1].to_string()))
        .map(|url| url.trim_end_matches(['/', ',', '.', ')']).to_string())
}

/// Remove terminal colour codes dev servers add even when piped.
pub fn strip_ansi(line: &str) -> String {
    ANSI_RE.replace_all(line, "").into_owned()
}
