use std::io::ErrorKind;
use std::ops::Range;

use regex::Regex;

use crate::models::{
    ArtifactFormat, ArtifactOutcome, ArtifactReport, ConfigArtifact, ServiceEndpoint, SyncReport,
};

/// Rewrite every artifact so it points at `endpoint`. Best effort: each
/// artifact is handled independently and failures only show up in the report.
pub fn sync(endpoint: &ServiceEndpoint, artifacts: &[ConfigArtifact]) -> SyncReport {
    let base_url = endpoint.base_url();
    let entries = artifacts
        .iter()
        .map(|artifact| {
            let outcome = sync_one(&base_url, artifact);
            match &outcome {
                ArtifactOutcome::Failed { reason } => tracing::warn!(
                    path = %artifact.path.display(),
                    format = artifact.format.tag(),
                    %reason,
                    "config artifact not updated"
                ),
                other => tracing::info!(
                    path = %artifact.path.display(),
                    format = artifact.format.tag(),
                    outcome = %other,
                    "config artifact synced"
                ),
            }
            ArtifactReport {
                path: artifact.path.clone(),
                outcome,
            }
        })
        .collect();
    SyncReport { entries }
}

fn sync_one(base_url: &str, artifact: &ConfigArtifact) -> ArtifactOutcome {
    let content = match std::fs::read_to_string(&artifact.path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return ArtifactOutcome::SkippedMissing,
        Err(e) => {
            return ArtifactOutcome::Failed {
                reason: format!("read failed: {e}"),
            }
        }
    };

    let rewritten = match &artifact.format {
        ArtifactFormat::EnvFile { key } => rewrite_env_file(&content, key, base_url),
        ArtifactFormat::BuildConfig { scope, key } => {
            match rewrite_build_config(&content, scope, key, base_url) {
                Some(rewritten) => rewritten,
                None => {
                    return ArtifactOutcome::Failed {
                        reason: format!("no local `{key}` literal inside `{scope}`"),
                    }
                }
            }
        }
    };

    if rewritten == content {
        return ArtifactOutcome::SkippedUnchanged;
    }
    match std::fs::write(&artifact.path, rewritten) {
        Ok(()) => ArtifactOutcome::Updated,
        Err(e) => ArtifactOutcome::Failed {
            reason: format!("write failed: {e}"),
        },
    }
}

/// Set `key=value` in env-file text. The first line defining `key` is
/// replaced in place; otherwise a line is appended. Other bytes are untouched.
pub fn rewrite_env_file(content: &str, key: &str, value: &str) -> String {
    let line = format!("{key}={value}");
    if let Some(range) = find_env_line(content, key) {
        let mut out = String::with_capacity(content.len() + value.len());
        out.push_str(&content[..range.start]);
        out.push_str(&line);
        out.push_str(&content[range.end..]);
        return out;
    }

    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&line);
    out.push('\n');
    out
}

/// Byte range of the value-bearing part of the line defining `key`,
/// excluding any line terminator.
fn find_env_line(content: &str, key: &str) -> Option<Range<usize>> {
    let mut offset = 0;
    for raw in content.split_inclusive('\n') {
        let line = raw.trim_end_matches(['\n', '\r']);
        if line
            .strip_prefix(key)
            .is_some_and(|rest| rest.starts_with('='))
        {
            return Some(offset..offset + line.len());
        }
        offset += raw.len();
    }
    None
}

/// Parse env-file text into `(key, value)` pairs, skipping blanks and
/// `#` comments. Returns the 1-based number of the first malformed line.
pub fn parse_env_entries(content: &str) -> std::result::Result<Vec<(String, String)>, usize> {
    let mut entries = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                entries.push((key.trim().to_string(), value.to_string()));
            }
            _ => return Err(index + 1),
        }
    }
    Ok(entries)
}

/// Replace local URL literals bound to `key` inside the `scope: { ... }`
/// section. A section already pointing at `value` comes back unchanged,
/// even when `value` is not a local URL. Returns `None` when the section
/// is absent or holds no literal that can be pointed at `value`.
pub fn rewrite_build_config(content: &str, scope: &str, key: &str, value: &str) -> Option<String> {
    let section = find_scope(content, scope)?;
    let body = &content[section.clone()];

    let replacements: Vec<Range<usize>> = target_urls(body, key, LOCAL_HOSTS)
        .into_iter()
        .map(|url| (section.start + url.start)..(section.start + url.end))
        .collect();
    if replacements.is_empty() {
        let already_set = target_urls(body, key, ANY_HOST)
            .into_iter()
            .any(|url| body[url].trim_end_matches('/') == value.trim_end_matches('/'));
        return already_set.then(|| content.to_string());
    }

    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;
    for range in replacements {
        out.push_str(&content[cursor..range.start]);
        out.push_str(value);
        cursor = range.end;
    }
    out.push_str(&content[cursor..]);
    Some(out)
}

/// Whether the `scope` section binds `key` to any http(s) URL literal.
pub(crate) fn has_build_target(content: &str, scope: &str, key: &str) -> bool {
    find_scope(content, scope)
        .is_some_and(|section| !target_urls(&content[section], key, ANY_HOST).is_empty())
}

const LOCAL_HOSTS: &str = r"(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1\])";
const ANY_HOST: &str = r"[^/\s\x22'`]+";

/// Byte ranges of the URL literals bound to `key` whose host matches `hosts`.
fn target_urls(body: &str, key: &str, hosts: &str) -> Vec<Range<usize>> {
    let key = regex::escape(key);
    let Ok(re) = Regex::new(&format!(
        r#"["']?\b{key}\b["']?\s*:\s*["'`](?P<url>https?://{hosts}(?::\d+)?[^"'`\s]*)["'`]"#
    )) else {
        return Vec::new();
    };
    re.captures_iter(body)
        .filter_map(|caps| caps.name("url").map(|url| url.range()))
        .collect()
}

/// Byte range of the brace-delimited body following `scope:`.
fn find_scope(content: &str, scope: &str) -> Option<Range<usize>> {
    let scope = regex::escape(scope);
    let opener = Regex::new(&format!(r#"["']?\b{scope}\b["']?\s*:\s*\{{"#)).ok()?;
    let start = opener.find(content)?.end();
    let end = matching_brace(&content.as_bytes()[start..])?;
    Some(start..start + end)
}

/// Offset of the `}` closing a block whose `{` was just consumed. Skips
/// string literals and comments so braces inside them don't count.
fn matching_brace(bytes: &[u8]) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            quote @ (b'"' | b'\'' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}
