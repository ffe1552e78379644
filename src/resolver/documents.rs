use std::collections::HashSet;

use anyhow::Result;
use serde_json::Value;

use crate::core::urls::normalize_reference;

use super::model::{ImportRef, Modifications, Resolution};
use super::Resolver;

/// Accepts either a bare document or one wrapped under its root key.
fn unwrap_root<'a>(document: &'a Value, root: &str) -> &'a Value {
    document.get(root).unwrap_or(document)
}

/// The document's own URL counts as visited, so a document that imports
/// itself is pruned at the first step.
fn seed_visited(parent_url: Option<&str>) -> Vec<String> {
    parent_url
        .filter(|url| !url.is_empty())
        .map(normalize_reference)
        .into_iter()
        .collect()
}

/// Resolves the profile named by an SSP's `import-profile`. An SSP without
/// one resolves to nothing and triggers no fetch.
pub fn resolve_ssp(
    resolver: &Resolver,
    ssp: &Value,
    parent_url: Option<&str>,
) -> Result<Resolution> {
    let ssp = unwrap_root(ssp, "system-security-plan");
    let imports: Vec<ImportRef> = ssp
        .get("import-profile")
        .and_then(ImportRef::from_value)
        .into_iter()
        .collect();
    resolver.resolve_imports(
        &imports,
        parent_url,
        ssp.get("back-matter"),
        &seed_visited(parent_url),
    )
}

/// Resolves a profile's `imports`. The profile's own `modify` block comes
/// first in the returned modifications, followed by inherited ones.
pub fn resolve_profile(
    resolver: &Resolver,
    profile: &Value,
    parent_url: Option<&str>,
) -> Result<Resolution> {
    let profile = unwrap_root(profile, "profile");
    let imports = ImportRef::list(profile.get("imports"));
    let imported = resolver.resolve_imports(
        &imports,
        parent_url,
        profile.get("back-matter"),
        &seed_visited(parent_url),
    )?;
    let mut modifications = Modifications::from_modify(profile.get("modify"));
    modifications.extend(imported.modifications);
    Ok(Resolution {
        modifications,
        ..imported
    })
}

/// Resolves every distinct `source` referenced by the control
/// implementations of a component definition's components.
pub fn resolve_component_definition(
    resolver: &Resolver,
    definition: &Value,
    parent_url: Option<&str>,
) -> Result<Resolution> {
    let definition = unwrap_root(definition, "component-definition");
    let mut seen = HashSet::new();
    let imports: Vec<ImportRef> = definition
        .get("components")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|component| component.get("control-implementations"))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|implementation| implementation.get("source").and_then(Value::as_str))
        .filter(|source| seen.insert(source.to_string()))
        .map(ImportRef::new)
        .collect();
    resolver.resolve_imports(
        &imports,
        parent_url,
        definition.get("back-matter"),
        &seed_visited(parent_url),
    )
}
