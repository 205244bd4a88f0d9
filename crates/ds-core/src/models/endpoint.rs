use std::fmt;

use url::Url;

/// Where the backend lives for this run. Computed once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub base_path: String,
}

impl ServiceEndpoint {
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "http".into(),
            host: host.into(),
            port,
            base_path: String::new(),
        }
    }

    /// Parse an absolute `http`/`https` URL. Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw.trim()).ok()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;
        let base_path = url.path().trim_end_matches('/').to_string();
        Some(Self {
            scheme: url.scheme().to_string(),
            host,
            port,
            base_path,
        })
    }

    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme, self.host, self.port, self.base_path
        )
    }

    /// Append a path segment to the base URL.
    pub fn url_for(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_url()
        } else {
            format!("{}/{path}", self.base_url())
        }
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_omits_empty_path() {
        let endpoint = ServiceEndpoint::http("localhost", 8000);
        assert_eq!(endpoint.base_url(), "http://localhost:8000");
        assert_eq!(endpoint.url_for("/health"), "http://localhost:8000/health");
        assert_eq!(endpoint.url_for(""), "http://localhost:8000");
    }

    #[test]
    fn parse_keeps_scheme_host_port_and_path() {
        let endpoint = ServiceEndpoint::parse("https://api.local:8443/v1/").unwrap();
        assert_eq!(endpoint.scheme, "https");
        assert_eq!(endpoint.host, "api.local");
        assert_eq!(endpoint.port, 8443);
        assert_eq!(endpoint.base_path, "/v1");
        assert_eq!(endpoint.url_for("health"), "https://api.local:8443/v1/health");
    }

    #[test]
    fn parse_fills_default_port() {
        let endpoint = ServiceEndpoint::parse("http://localhost").unwrap();
        assert_eq!(endpoint.port, 80);
        assert_eq!(endpoint.base_url(), "http://localhost:80");
    }

    #[test]
    fn parse_rejects_malformed_values() {
        assert!(ServiceEndpoint::parse("localhost:8000").is_none());
        assert!(ServiceEndpoint::parse("ftp://localhost:21").is_none());
        assert!(ServiceEndpoint::parse("").is_none());
        assert!(ServiceEndpoint::parse("not a url").is_none());
    }
}
