use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::config::Config;
use crate::core::json::{decode_document, editor_source};
use crate::core::path::{get_at_path, set_at_path, EditMode, JsonPath};
use crate::error::{AddressingError, CancelledError, ParseError};
use crate::http::{Fetcher, HttpClient, HttpMethod, Persister};
use crate::logging::Logger;
use crate::resolver::{
    resolve_component_definition, resolve_profile, resolve_ssp, Resolution, Resolver,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Catalog,
    ComponentDefinition,
    Profile,
    Ssp,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Catalog,
        DocumentKind::ComponentDefinition,
        DocumentKind::Profile,
        DocumentKind::Ssp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DocumentKind::Catalog => "Catalog",
            DocumentKind::ComponentDefinition => "Component",
            DocumentKind::Profile => "Profile",
            DocumentKind::Ssp => "SSP",
        }
    }

    pub fn default_url(self) -> &'static str {
        match self {
            DocumentKind::Catalog => "https://raw.githubusercontent.com/EasyDynamics/oscal-demo-content/main/catalogs/NIST_SP-800-53_rev5_catalog.json",
            DocumentKind::ComponentDefinition => "https://raw.githubusercontent.com/EasyDynamics/oscal-demo-content/main/component-definitions/example-component.json",
            DocumentKind::Profile => "https://raw.githubusercontent.com/EasyDynamics/oscal-demo-content/main/profiles/NIST_SP-800-53_rev4_MODERATE-baseline_profile.json",
            DocumentKind::Ssp => "https://raw.githubusercontent.com/EasyDynamics/oscal-demo-content/main/system-security-plans/ssp-example.json",
        }
    }

    pub fn default_uuid(self) -> &'static str {
        match self {
            DocumentKind::Catalog => "613fca2d-704a-42e7-8e2b-b206fb92b456",
            DocumentKind::ComponentDefinition => "8223d65f-57a9-4689-8f06-2a975ae2ad72",
            DocumentKind::Profile => "8b3beca1-fcdc-43e0-aebb-ffc0a080c486",
            DocumentKind::Ssp => "cff8385f-108e-40a5-8f7a-82f3dc0eaba8",
        }
    }

    pub fn json_root_name(self) -> &'static str {
        match self {
            DocumentKind::Catalog => "catalog",
            DocumentKind::ComponentDefinition => "component-definition",
            DocumentKind::Profile => "profile",
            DocumentKind::Ssp => "system-security-plan",
        }
    }

    pub fn rest_path(self) -> &'static str {
        match self {
            DocumentKind::Catalog => "catalogs",
            DocumentKind::ComponentDefinition => "component-definitions",
            DocumentKind::Profile => "profiles",
            DocumentKind::Ssp => "system-security-plans",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DocumentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "catalog" => Ok(DocumentKind::Catalog),
            "component" | "component-definition" => Ok(DocumentKind::ComponentDefinition),
            "profile" => Ok(DocumentKind::Profile),
            "ssp" | "system-security-plan" => Ok(DocumentKind::Ssp),
            other => Err(anyhow!("unknown OSCAL document kind: {other}")),
        }
    }
}

/// A fetched document together with the text shown in the JSON editor.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedDocument {
    pub kind: DocumentKind,
    pub url: String,
    pub document: Value,
    pub source: String,
}

impl LoadedDocument {
    fn new(kind: DocumentKind, url: &str, document: Value) -> Result<Self> {
        if document.get(kind.json_root_name()).is_none() {
            return Err(ParseError::new(
                url,
                format!("missing expected root key `{}`", kind.json_root_name()),
            )
            .into());
        }
        let source = editor_source(&document)?;
        Ok(Self {
            kind,
            url: url.to_string(),
            document,
            source,
        })
    }

    pub fn root(&self) -> &Value {
        &self.document[self.kind.json_root_name()]
    }

    pub fn uuid(&self) -> Option<&str> {
        self.root().get("uuid").and_then(Value::as_str)
    }
}

/// One edited field on its way to the backend.
#[derive(Clone, Debug)]
pub struct FieldEdit {
    pub mode: EditMode,
    pub path: Option<JsonPath>,
    pub value: Option<Value>,
    pub method: HttpMethod,
    /// Empty or `None` targets `{base}/{rest-path}/{uuid}`; an `http` URL is
    /// used as is; anything else is appended to the base URL.
    pub rest_url_path: Option<String>,
}

impl FieldEdit {
    pub fn replace(path: JsonPath, value: Value) -> Self {
        Self {
            mode: EditMode::Replace,
            path: Some(path),
            value: Some(value),
            method: HttpMethod::Patch,
            rest_url_path: None,
        }
    }

    pub fn append(path: JsonPath, value: Value) -> Self {
        Self {
            mode: EditMode::Append,
            ..Self::replace(path, value)
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_rest_url_path(mut self, path: impl Into<String>) -> Self {
        self.rest_url_path = Some(path.into());
        self
    }
}

/// Tracks whether the consumer of a load is still interested. Closing it
/// cancels in-flight resolution and makes late results disappear.
#[derive(Clone, Default)]
pub struct LoadSession {
    closed: Arc<AtomicBool>,
}

impl LoadSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub fn deliver<T>(&self, result: T) -> Option<T> {
        self.is_open().then_some(result)
    }

    fn token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

/// Resolution running on a worker thread for a [`LoadSession`].
pub struct PendingResolution {
    session: LoadSession,
    rx: mpsc::Receiver<Result<Resolution>>,
}

impl PendingResolution {
    /// Blocks until the worker finishes. `None` once the session is closed,
    /// whatever the worker produced.
    pub fn wait(self) -> Option<Result<Resolution>> {
        let result = self
            .rx
            .recv()
            .unwrap_or_else(|_| Err(anyhow!("resolution worker stopped without a result")));
        match result {
            Err(err) if err.is::<CancelledError>() => None,
            other => self.session.deliver(other),
        }
    }
}

/// Loads, resolves and saves OSCAL documents against one backend.
#[derive(Clone)]
pub struct Loader {
    fetcher: Arc<dyn Fetcher>,
    persister: Arc<dyn Persister>,
    resolver: Resolver,
    rest_base_url: String,
    logger: Logger,
}

impl Loader {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        persister: Arc<dyn Persister>,
        config: &Config,
        logger: Logger,
    ) -> Self {
        let resolver = Resolver::new(Arc::clone(&fetcher), logger.clone());
        Self {
            fetcher,
            persister,
            resolver,
            rest_base_url: config.rest_base().to_string(),
            logger: logger.with_tags(json!({ "component": "loader" })),
        }
    }

    pub fn from_config(config: &Config, logger: Logger) -> Self {
        let client = Arc::new(HttpClient::new(config, logger.clone()));
        Self::new(client.clone(), client, config, logger)
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn load(&self, kind: DocumentKind, url: &str) -> Result<LoadedDocument> {
        self.logger.debug(
            "loading document",
            Some(json!({ "url": url, "kind": kind.json_root_name() })),
        );
        let document = self.fetcher.fetch_json(url)?;
        LoadedDocument::new(kind, url, document)
    }

    /// Loads `{base}/{rest-path}/{uuid}` from the backend.
    pub fn load_by_uuid(&self, kind: DocumentKind, uuid: &str) -> Result<LoadedDocument> {
        let url = format!("{}/{}/{}", self.rest_base_url, kind.rest_path(), uuid);
        self.load(kind, &url)
    }

    /// Catalogs import nothing and resolve to an empty result.
    pub fn resolve(&self, loaded: &LoadedDocument) -> Result<Resolution> {
        resolve_with(&self.resolver, loaded)
    }

    pub fn spawn_resolution(
        &self,
        session: &LoadSession,
        loaded: LoadedDocument,
    ) -> PendingResolution {
        let resolver = self.resolver.clone().with_cancellation(session.token());
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(resolve_with(&resolver, &loaded));
        });
        PendingResolution {
            session: session.clone(),
            rx,
        }
    }

    pub fn rest_url(
        &self,
        kind: DocumentKind,
        rest_url_path: Option<&str>,
        partial: &Value,
    ) -> Result<String> {
        match rest_url_path.filter(|path| !path.is_empty()) {
            Some(path) if path.starts_with("http") => Ok(path.to_string()),
            Some(path) => Ok(format!("{}/{}", self.rest_base_url, path)),
            None => {
                let uuid_path = JsonPath::new().key(kind.json_root_name()).key("uuid");
                let uuid = get_at_path(partial, &uuid_path)
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AddressingError::new(1, "uuid", "partial document has no uuid")
                    })?;
                Ok(format!("{}/{}/{}", self.rest_base_url, kind.rest_path(), uuid))
            }
        }
    }

    /// Applies `edit` to `partial` and sends the result. A path that does not
    /// fit the partial document rejects the edit before any request is made.
    pub fn save_field(
        &self,
        kind: DocumentKind,
        mut partial: Value,
        edit: FieldEdit,
    ) -> Result<LoadedDocument> {
        let url = self.rest_url(kind, edit.rest_url_path.as_deref(), &partial)?;
        if let Some(value) = edit.value {
            let path = edit
                .path
                .ok_or_else(|| AddressingError::new(0, "", "edited value has no path"))?;
            let rendered = path.to_string();
            set_at_path(&mut partial, path, value, edit.mode).map_err(|err| {
                self.logger.warn(
                    "rejected field edit",
                    Some(json!({ "path": rendered, "error": err.to_string() })),
                );
                err
            })?;
        }
        let persisted = self.persister.persist(&url, edit.method, &partial)?;
        self.logger.info(
            "saved field",
            Some(json!({ "url": url, "method": edit.method.as_str() })),
        );
        LoadedDocument::new(kind, &url, persisted)
    }

    /// Replaces the whole document with editor text (`PUT`).
    pub fn save_document(
        &self,
        kind: DocumentKind,
        url: &str,
        text: &str,
    ) -> Result<LoadedDocument> {
        let document = decode_document(url, text)?;
        let target = match url {
            "" => self.rest_url(kind, None, &document)?,
            other => other.to_string(),
        };
        let persisted = self.persister.persist(&target, HttpMethod::Put, &document)?;
        LoadedDocument::new(kind, &target, persisted)
    }
}

fn resolve_with(resolver: &Resolver, loaded: &LoadedDocument) -> Result<Resolution> {
    let parent = Some(loaded.url.as_str());
    match loaded.kind {
        DocumentKind::Catalog => Ok(Resolution::default()),
        DocumentKind::ComponentDefinition => {
            resolve_component_definition(resolver, loaded.root(), parent)
        }
        DocumentKind::Profile => resolve_profile(resolver, loaded.root(), parent),
        DocumentKind::Ssp => resolve_ssp(resolver, loaded.root(), parent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Level;
    use std::sync::Mutex;

    struct NoFetch;

    impl Fetcher for NoFetch {
        fn fetch_json(&self, url: &str) -> Result<Value> {
            Err(anyhow!("unexpected fetch of {url}"))
        }
    }

    #[derive(Default)]
    struct RecordingPersister {
        requests: Mutex<Vec<(String, HttpMethod, Value)>>,
    }

    impl Persister for RecordingPersister {
        fn persist(&self, url: &str, method: HttpMethod, body: &Value) -> Result<Value> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), method, body.clone()));
            Ok(body.clone())
        }
    }

    fn loader(persister: Arc<RecordingPersister>) -> Loader {
        let config = Config::from_toml_str("rest-base-url = \"http://backend/oscal/v1/\"").unwrap();
        Loader::new(Arc::new(NoFetch), persister, &config, Logger::new(Level::Fatal))
    }

    #[test]
    fn rest_url_variants() {
        let loader = loader(Arc::default());
        let partial = json!({ "system-security-plan": { "uuid": "s-1" } });
        assert_eq!(
            loader.rest_url(DocumentKind::Ssp, None, &partial).unwrap(),
            "http://backend/oscal/v1/system-security-plans/s-1"
        );
        assert_eq!(
            loader.rest_url(DocumentKind::Ssp, Some(""), &partial).unwrap(),
            "http://backend/oscal/v1/system-security-plans/s-1"
        );
        assert_eq!(
            loader
                .rest_url(DocumentKind::Ssp, Some("https://elsewhere/x"), &partial)
                .unwrap(),
            "https://elsewhere/x"
        );
        assert_eq!(
            loader
                .rest_url(DocumentKind::Ssp, Some("system-security-plans/s-1/metadata"), &partial)
                .unwrap(),
            "http://backend/oscal/v1/system-security-plans/s-1/metadata"
        );
        let err = loader
            .rest_url(DocumentKind::Profile, None, &partial)
            .unwrap_err();
        assert!(err.is::<AddressingError>());
    }

    #[test]
    fn save_field_applies_then_persists() {
        let persister = Arc::new(RecordingPersister::default());
        let loader = loader(persister.clone());
        let partial = json!({
            "system-security-plan": { "uuid": "s-1", "metadata": { "title": "Old" } }
        });
        let path = JsonPath::new()
            .key("system-security-plan")
            .key("metadata")
            .key("title");
        let saved = loader
            .save_field(DocumentKind::Ssp, partial, FieldEdit::replace(path, json!("New")))
            .unwrap();
        assert_eq!(saved.root()["metadata"]["title"], json!("New"));
        let requests = persister.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "http://backend/oscal/v1/system-security-plans/s-1");
        assert_eq!(requests[0].1, HttpMethod::Patch);
    }

    #[test]
    fn bad_path_rejects_before_persisting() {
        let persister = Arc::new(RecordingPersister::default());
        let loader = loader(persister.clone());
        let partial = json!({ "system-security-plan": { "uuid": "s-1" } });
        let path = JsonPath::new()
            .key("system-security-plan")
            .key("metadata")
            .key("title");
        let err = loader
            .save_field(DocumentKind::Ssp, partial, FieldEdit::replace(path, json!("New")))
            .unwrap_err();
        assert!(err.is::<AddressingError>());
        assert!(persister.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn closed_session_drops_results() {
        let session = LoadSession::new();
        assert_eq!(session.deliver(1), Some(1));
        session.close();
        assert!(!session.is_open());
        assert_eq!(session.deliver(1), None);
    }

    #[test]
    fn kinds_parse_and_describe_themselves() {
        assert_eq!("SSP".parse::<DocumentKind>().unwrap(), DocumentKind::Ssp);
        assert_eq!(
            "component-definition".parse::<DocumentKind>().unwrap(),
            DocumentKind::ComponentDefinition
        );
        for kind in DocumentKind::ALL {
            assert!(kind.default_url().ends_with(".json"));
            assert_eq!(kind.json_root_name().parse::<DocumentKind>().unwrap(), kind);
        }
    }
}
