use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use url::Url;

use crate::config::Config;
use crate::core::json::decode_document;
use crate::error::FetchError;
use crate::logging::Logger;

/// Retrieves one JSON document. Non-success statuses and transport problems
/// are [`FetchError`]s; bodies that are not JSON are
/// [`ParseError`](crate::error::ParseError)s.
pub trait Fetcher: Send + Sync {
    fn fetch_json(&self, url: &str) -> Result<Value>;
}

/// Stores a (partial) document and returns what the backend persisted.
pub trait Persister: Send + Sync {
    fn persist(&self, url: &str, method: HttpMethod, body: &Value) -> Result<Value>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(anyhow!("unsupported HTTP method: {other}")),
        }
    }
}

/// `ureq`-backed collaborator. `http(s)` URLs go over the network;
/// `file://` URLs and bare paths are read from disk so local OSCAL content
/// resolves the same way.
#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    logger: Logger,
}

impl HttpClient {
    pub fn new(config: &Config, logger: Logger) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build();
        Self { agent, logger }
    }

    fn fetch_remote(&self, url: &str) -> Result<Value> {
        let response = self
            .agent
            .get(url)
            .set("Accept", "application/json")
            .call();
        read_response(url, response)
    }

    fn fetch_local(&self, url: &str, path: PathBuf) -> Result<Value> {
        let text = fs::read_to_string(&path).map_err(|err| {
            FetchError::transport(url, format!("unable to read {}: {err}", path.display()))
        })?;
        decode_document(url, &text)
    }
}

impl Fetcher for HttpClient {
    fn fetch_json(&self, url: &str) -> Result<Value> {
        self.logger.trace("fetching document", Some(json!({ "url": url })));
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch_remote(url);
        }
        if url.starts_with("file:") {
            let path = Url::parse(url)
                .ok()
                .and_then(|parsed| parsed.to_file_path().ok())
                .ok_or_else(|| FetchError::transport(url, "not a valid file URL"))?;
            return self.fetch_local(url, path);
        }
        if is_scheme_url(url) {
            return Err(FetchError::transport(url, "unsupported URL scheme").into());
        }
        self.fetch_local(url, PathBuf::from(url))
    }
}

impl Persister for HttpClient {
    fn persist(&self, url: &str, method: HttpMethod, body: &Value) -> Result<Value> {
        self.logger.debug(
            "persisting document",
            Some(json!({ "url": url, "method": method.as_str() })),
        );
        let payload = serde_json::to_string(body)?;
        let response = self
            .agent
            .request(method.as_str(), url)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .send_string(&payload);
        read_response(url, response)
    }
}

fn is_scheme_url(url: &str) -> bool {
    // Single-letter schemes are Windows drive letters.
    Url::parse(url)
        .map(|parsed| parsed.scheme().len() > 1)
        .unwrap_or(false)
}

fn read_response(url: &str, response: Result<ureq::Response, ureq::Error>) -> Result<Value> {
    match response {
        Ok(response) => {
            let text = response
                .into_string()
                .map_err(|err| FetchError::transport(url, format!("unable to read body: {err}")))?;
            decode_document(url, &text)
        }
        Err(ureq::Error::Status(code, _)) => Err(FetchError::status(url, code).into()),
        Err(ureq::Error::Transport(transport)) => {
            Err(FetchError::transport(url, transport.to_string()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::logging::Level;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn spawn_server(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}", addr)
    }

    fn client() -> HttpClient {
        HttpClient::new(&Config::default(), Logger::new(Level::Fatal))
    }

    #[test]
    fn fetches_json_over_http() {
        let base = spawn_server(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 26\r\n\r\n{\"catalog\":{\"uuid\":\"c-1\"}}",
        );
        let doc = client().fetch_json(&format!("{base}/catalog.json")).unwrap();
        assert_eq!(doc["catalog"]["uuid"], json!("c-1"));
    }

    #[test]
    fn non_success_status_is_fetch_error() {
        let base = spawn_server("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        let err = client().fetch_json(&format!("{base}/missing.json")).unwrap_err();
        let fetch = err.downcast_ref::<FetchError>().unwrap();
        assert_eq!(fetch.status, Some(404));
    }

    #[test]
    fn malformed_body_is_parse_error() {
        let base = spawn_server(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 9\r\n\r\nnot json!",
        );
        let err = client().fetch_json(&format!("{base}/bad.json")).unwrap_err();
        assert!(err.is::<ParseError>());
    }

    #[test]
    fn reads_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        fs::write(&path, "{\"profile\":{\"uuid\":\"p-1\"}}").unwrap();
        let doc = client().fetch_json(&path.to_string_lossy()).unwrap();
        assert_eq!(doc["profile"]["uuid"], json!("p-1"));

        let file_url = Url::from_file_path(&path).unwrap();
        let doc = client().fetch_json(file_url.as_str()).unwrap();
        assert_eq!(doc["profile"]["uuid"], json!("p-1"));

        let err = client()
            .fetch_json(&dir.path().join("absent.json").to_string_lossy())
            .unwrap_err();
        assert!(err.is::<FetchError>());
    }

    #[test]
    fn parses_methods() {
        assert_eq!("put".parse::<HttpMethod>().unwrap(), HttpMethod::Put);
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }
}
