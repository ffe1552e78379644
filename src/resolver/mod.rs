pub mod documents;
pub mod model;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::core::parts::{detach_sub_controls, flatten_controls};
use crate::core::urls::{import_url, normalize_reference};
use crate::error::{CancelledError, ParseError};
use crate::http::Fetcher;
use crate::logging::Logger;

pub use documents::{resolve_component_definition, resolve_profile, resolve_ssp};
pub use model::{ImportRef, Modifications, Provenance, Resolution, Selection, SourceKind};

/// Resolves import graphs of profiles and catalogs.
///
/// Cloning is cheap and clones share the fetcher, logger and cancellation
/// flag. Independent resolutions should use independent `Resolver`s (or at
/// least independent cancellation flags).
#[derive(Clone)]
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
    logger: Logger,
    cancellation: Arc<AtomicBool>,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, logger: Logger) -> Self {
        Self {
            fetcher,
            logger: logger.with_tags(json!({ "component": "resolver" })),
            cancellation: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_cancellation(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancellation)
    }

    pub fn cancel(&self) {
        self.cancellation.store(true, Ordering::SeqCst);
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancellation.load(Ordering::SeqCst) {
            return Err(CancelledError.into());
        }
        Ok(())
    }

    /// Resolves `imports` (relative to `parent_url`, with `#uuid` hrefs looked
    /// up in `back_matter`) into one control list, the accumulated
    /// modifications and the inheritance tree.
    ///
    /// URLs already present in `visited` are skipped without error, which is
    /// how import cycles terminate. Sibling imports are fetched concurrently;
    /// the first failure is returned and nothing from the level is merged.
    pub fn resolve_imports(
        &self,
        imports: &[ImportRef],
        parent_url: Option<&str>,
        back_matter: Option<&Value>,
        visited: &[String],
    ) -> Result<Resolution> {
        if imports.is_empty() {
            return Ok(Resolution::default());
        }

        let visited: Vec<String> = visited.iter().map(|url| normalize_reference(url)).collect();
        let visited = visited.as_slice();
        let mut pending: Vec<(ImportRef, String)> = Vec::with_capacity(imports.len());
        for import in imports {
            let url = import_url(&import.href, parent_url, back_matter)?;
            if visited.contains(&url) || pending.iter().any(|(_, seen)| seen == &url) {
                self.logger.debug(
                    "skipping already visited import",
                    Some(json!({ "url": url, "parent": parent_url })),
                );
                continue;
            }
            pending.push((import.clone(), url));
        }

        let branches = if pending.len() <= 1 {
            pending
                .iter()
                .map(|(import, url)| self.resolve_branch(import, url, visited))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.resolve_siblings(pending, visited)?
        };

        self.ensure_not_cancelled()?;
        let mut resolution = Resolution::default();
        for branch in branches {
            resolution.merge(branch);
        }
        Ok(resolution)
    }

    fn resolve_siblings(
        &self,
        pending: Vec<(ImportRef, String)>,
        visited: &[String],
    ) -> Result<Vec<Resolution>> {
        let total = pending.len();
        let (tx, rx) = mpsc::channel();
        for (index, (import, url)) in pending.into_iter().enumerate() {
            let tx = tx.clone();
            let resolver = self.clone();
            let visited = visited.to_vec();
            thread::spawn(move || {
                let result = resolver.resolve_branch(&import, &url, &visited);
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        let mut slots: Vec<Option<Resolution>> = (0..total).map(|_| None).collect();
        for _ in 0..total {
            let (index, result) = rx
                .recv()
                .map_err(|_| anyhow!("import worker stopped without reporting a result"))?;
            // Remaining workers keep running; their sends fail once `rx` drops.
            slots[index] = Some(result?);
        }
        Ok(slots.into_iter().flatten().collect())
    }

    fn resolve_branch(
        &self,
        import: &ImportRef,
        url: &str,
        visited: &[String],
    ) -> Result<Resolution> {
        self.ensure_not_cancelled()?;
        self.logger.debug(
            "fetching import",
            Some(json!({ "url": url, "href": import.href })),
        );
        let document = self.fetcher.fetch_json(url).map_err(|err| {
            self.logger.warn(
                "import fetch failed",
                Some(json!({ "url": url, "error": err.to_string() })),
            );
            err
        })?;
        self.ensure_not_cancelled()?;

        let mut path = visited.to_vec();
        path.push(url.to_string());

        if let Some(catalog) = document.get("catalog") {
            let controls: Vec<Value> = flatten_controls(catalog)
                .into_iter()
                .filter(|control| import.selection.admits(control))
                .map(detach_sub_controls)
                .collect();
            self.logger.info(
                "resolved catalog",
                Some(json!({ "url": url, "controls": controls.len() })),
            );
            return Ok(Resolution {
                resolved_controls: controls,
                modifications: Modifications::default(),
                inherited: vec![Provenance::catalog(catalog, url)],
            });
        }

        if let Some(profile) = document.get("profile") {
            let mut modifications = Modifications::from_modify(profile.get("modify"));
            let nested_imports = ImportRef::list(profile.get("imports"));
            let nested = self.resolve_imports(
                &nested_imports,
                Some(url),
                profile.get("back-matter"),
                &path,
            )?;
            modifications.extend(nested.modifications);
            let controls: Vec<Value> = nested
                .resolved_controls
                .into_iter()
                .filter(|control| import.selection.admits(control))
                .collect();
            self.logger.info(
                "resolved profile",
                Some(json!({ "url": url, "controls": controls.len() })),
            );
            return Ok(Resolution {
                resolved_controls: controls,
                modifications,
                inherited: vec![Provenance::profile(profile, url, nested.inherited)],
            });
        }

        Err(ParseError::new(url, "missing expected root key (catalog or profile)").into())
    }
}
