#![allow(dead_code)]

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Result;
use oscal_kernel_rs::{FetchError, Fetcher};
use serde_json::Value;
use tiny_http::{Header, Response, Server, StatusCode};

/// A request the test backend received.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Serves fixed JSON documents by path. Writes (`PUT`, `PATCH`, `POST`) are
/// recorded and echoed back.
pub struct Backend {
    pub base: String,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
    server: Arc<Server>,
}

impl Backend {
    pub fn start(documents: Vec<(&str, Value)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = Arc::new(Server::from_listener(listener, None).unwrap());
        let routes: HashMap<String, String> = documents
            .into_iter()
            .map(|(path, doc)| (path.to_string(), doc.to_string()))
            .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let server_for_thread = Arc::clone(&server);
        let log = Arc::clone(&requests);
        thread::spawn(move || {
            for mut request in server_for_thread.incoming_requests() {
                let method = request.method().as_str().to_uppercase();
                let path = request.url().to_string();
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                log.lock().unwrap().push(Recorded {
                    method: method.clone(),
                    path: path.clone(),
                    body: body.clone(),
                });
                let (status, payload) = match method.as_str() {
                    "GET" => match routes.get(&path) {
                        Some(doc) => (200, doc.clone()),
                        None => (404, "{\"error\":\"Not found\"}".to_string()),
                    },
                    _ => (200, body),
                };
                let response = Response::from_string(payload)
                    .with_status_code(StatusCode(status))
                    .with_header(Header::from_bytes("content-type", "application/json").unwrap());
                let _ = request.respond(response);
            }
        });

        Self {
            base: format!("http://127.0.0.1:{port}"),
            requests,
            server,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn gets(&self) -> Vec<String> {
        self.recorded()
            .into_iter()
            .filter(|r| r.method == "GET")
            .map(|r| r.path)
            .collect()
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

/// In-memory fetcher keyed by URL that records every fetch.
#[derive(Default)]
pub struct MemoryFetcher {
    docs: HashMap<String, Value>,
    pub calls: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn with(mut self, url: &str, doc: Value) -> Self {
        self.docs.insert(url.to_string(), doc);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch_json(&self, url: &str) -> Result<Value> {
        self.calls.lock().unwrap().push(url.to_string());
        self.docs
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::status(url, 404).into())
    }
}
