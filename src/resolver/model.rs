use std::collections::{BTreeSet, HashSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::path::{set_at_path, EditMode, JsonPath};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Catalog,
    Profile,
}

/// One node of the inheritance tree: a catalog or profile a document's
/// controls were drawn from. Profiles nest the sources they import.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherited: Option<Vec<Provenance>>,
}

impl Provenance {
    pub fn catalog(catalog: &Value, url: &str) -> Self {
        Self {
            title: document_title(catalog),
            kind: SourceKind::Catalog,
            uuid: document_uuid(catalog),
            url: url.to_string(),
            inherited: None,
        }
    }

    pub fn profile(profile: &Value, url: &str, inherited: Vec<Provenance>) -> Self {
        Self {
            title: document_title(profile),
            kind: SourceKind::Profile,
            uuid: document_uuid(profile),
            url: url.to_string(),
            inherited: Some(inherited),
        }
    }

    pub fn children(&self) -> &[Provenance] {
        self.inherited.as_deref().unwrap_or(&[])
    }
}

fn document_title(doc: &Value) -> Option<String> {
    doc.get("metadata")
        .and_then(|meta| meta.get("title"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn document_uuid(doc: &Value) -> Option<String> {
    doc.get("uuid").and_then(Value::as_str).map(str::to_owned)
}

/// Accumulated tailoring from every imported profile, in application order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Modifications {
    #[serde(rename = "set-parameters", default)]
    pub set_parameters: Vec<Value>,
    #[serde(default)]
    pub alters: Vec<Value>,
}

impl Modifications {
    /// Reads a profile's `modify` block; anything missing is empty.
    pub fn from_modify(modify: Option<&Value>) -> Self {
        let list = |key: &str| {
            modify
                .and_then(|m| m.get(key))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        Self {
            set_parameters: list("set-parameters"),
            alters: list("alters"),
        }
    }

    /// Appends `other` after the current entries without overwriting any.
    pub fn extend(&mut self, other: Modifications) {
        self.set_parameters.extend(other.set_parameters);
        self.alters.extend(other.alters);
    }

    pub fn is_empty(&self) -> bool {
        self.set_parameters.is_empty() && self.alters.is_empty()
    }

    /// The effective setting for a parameter: the last one applied.
    pub fn parameter_setting(&self, param_id: &str) -> Option<&Value> {
        self.set_parameters
            .iter()
            .rev()
            .find(|setting| setting.get("param-id").and_then(Value::as_str) == Some(param_id))
    }

    pub fn alters_for(&self, control_id: &str) -> Vec<&Value> {
        self.alters
            .iter()
            .filter(|alter| alter.get("control-id").and_then(Value::as_str) == Some(control_id))
            .collect()
    }
}

/// Which controls an import contributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// `None` admits every control (`include-all`, or no selection at all).
    pub include: Option<BTreeSet<String>>,
    pub exclude: BTreeSet<String>,
}

impl Selection {
    fn from_import(import: &Value) -> Self {
        let include = if import.get("include-all").is_some() {
            None
        } else {
            import.get("include-controls").map(collect_with_ids)
        };
        let exclude = import
            .get("exclude-controls")
            .map(collect_with_ids)
            .unwrap_or_default();
        Self { include, exclude }
    }

    pub fn admits(&self, control: &Value) -> bool {
        let Some(id) = control.get("id").and_then(Value::as_str) else {
            return self.include.is_none();
        };
        if self.exclude.contains(id) {
            return false;
        }
        self.include.as_ref().map_or(true, |ids| ids.contains(id))
    }
}

fn collect_with_ids(selectors: &Value) -> BTreeSet<String> {
    selectors
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|selector| selector.get("with-ids").and_then(Value::as_array))
                .flatten()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// An `imports[]` entry, an SSP `import-profile`, or a component
/// implementation `source`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportRef {
    pub href: String,
    pub selection: Selection,
}

impl ImportRef {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            selection: Selection::default(),
        }
    }

    /// `None` when the entry carries no string `href`.
    pub fn from_value(import: &Value) -> Option<Self> {
        let href = import.get("href").and_then(Value::as_str)?;
        Some(Self {
            href: href.to_string(),
            selection: Selection::from_import(import),
        })
    }

    pub fn list(imports: Option<&Value>) -> Vec<Self> {
        imports
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Self::from_value).collect())
            .unwrap_or_default()
    }
}

/// Everything a document inherits through its imports.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub resolved_controls: Vec<Value>,
    pub modifications: Modifications,
    pub inherited: Vec<Provenance>,
}

impl Resolution {
    /// Appends a sibling branch. Controls whose `id` is already present are
    /// skipped so diamond-shaped imports do not duplicate them.
    pub fn merge(&mut self, other: Resolution) {
        let mut seen: HashSet<String> = self.control_ids().into_iter().map(str::to_owned).collect();
        for control in other.resolved_controls {
            match control.get("id").and_then(Value::as_str) {
                Some(id) if !seen.insert(id.to_string()) => {}
                _ => self.resolved_controls.push(control),
            }
        }
        self.modifications.extend(other.modifications);
        self.inherited.extend(other.inherited);
    }

    pub fn control_ids(&self) -> Vec<&str> {
        self.resolved_controls
            .iter()
            .filter_map(|control| control.get("id").and_then(Value::as_str))
            .collect()
    }

    /// Writes `resolvedControls` and `modifications` onto `document` for
    /// consumers that read them from the document itself.
    pub fn attach_to(&self, document: &mut Value) -> Result<()> {
        set_at_path(
            document,
            JsonPath::new().key("resolvedControls"),
            Value::Array(self.resolved_controls.clone()),
            EditMode::Replace,
        )?;
        set_at_path(
            document,
            JsonPath::new().key("modifications"),
            serde_json::to_value(&self.modifications)?,
            EditMode::Replace,
        )
    }
}
