use anyhow::Result;
use serde_json::Value;
use url::Url;

use crate::error::ReferenceError;

/// Points a document reference at its JSON rendition. References already
/// ending in `.json` are left alone; otherwise a trailing `.xml`, `.yaml` or
/// `.yml` extension becomes `.json` and the first `/xml/` or `/yaml/`
/// directory becomes `/json/`.
pub fn fix_json_urls(url: &str) -> String {
    if url.ends_with(".json") {
        return url.to_string();
    }
    let mut fixed = url.to_string();
    for ext in [".xml", ".yaml", ".yml"] {
        if let Some(stem) = fixed.strip_suffix(ext) {
            fixed = format!("{stem}.json");
            break;
        }
    }
    for dir in ["/xml/", "/yaml/"] {
        if fixed.contains(dir) {
            fixed = fixed.replacen(dir, "/json/", 1);
            break;
        }
    }
    fixed
}

/// True for `http(s)` references and anything else carrying a URL scheme.
pub fn is_absolute(reference: &str) -> bool {
    reference.starts_with("http") || Url::parse(reference).is_ok()
}

/// Resolves a relative reference against the URL the parent document was
/// retrieved from, using the literal `parent/../reference` join the upstream
/// OSCAL content relies on.
pub fn resolve_relative(reference: &str, parent_url: Option<&str>) -> String {
    let Some(parent) = parent_url.filter(|p| !p.is_empty()) else {
        return normalize_reference(reference);
    };
    if is_absolute(reference) {
        return normalize_reference(reference);
    }
    if let Ok(base) = Url::parse(parent) {
        if reference.starts_with('/') {
            if let Ok(joined) = base.join(reference) {
                return joined.to_string();
            }
        }
        let literal = format!("{parent}/../{reference}");
        return match Url::parse(&literal) {
            Ok(url) => url.to_string(),
            Err(_) => literal,
        };
    }
    if reference.starts_with('/') {
        return reference.to_string();
    }
    fold_segments(&format!("{parent}/../{reference}"))
}

/// Canonical spelling of a document identifier: URLs as serialised by
/// [`Url`], plain paths with `.` and `..` segments folded. Two references
/// to the same document compare equal once normalized.
pub fn normalize_reference(reference: &str) -> String {
    match Url::parse(reference) {
        // Single-letter schemes are Windows drive letters.
        Ok(url) if url.scheme().len() > 1 => url.to_string(),
        _ => fold_segments(reference),
    }
}

/// Collapses `.` and `..` segments of a slash-separated path.
fn fold_segments(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        push_segment(&mut segments, segment, absolute);
    }
    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

fn push_segment<'a>(segments: &mut Vec<&'a str>, segment: &'a str, absolute: bool) {
    if segment.is_empty() || segment == "." {
        return;
    }
    if segment == ".." {
        match segments.last() {
            Some(&last) if last != ".." => {
                segments.pop();
            }
            _ if !absolute => segments.push(".."),
            _ => {}
        }
        return;
    }
    segments.push(segment);
}

/// Maps a `#<uuid>` href onto the back-matter resource it names, preferring a
/// JSON rlink. Other hrefs are returned unchanged.
pub fn resolve_back_matter_href(href: &str, back_matter: Option<&Value>) -> Result<String> {
    let Some(uuid) = href.strip_prefix('#') else {
        return Ok(href.to_string());
    };
    let resource = back_matter
        .and_then(|bm| bm.get("resources"))
        .and_then(Value::as_array)
        .and_then(|resources| {
            resources
                .iter()
                .find(|res| res.get("uuid").and_then(Value::as_str) == Some(uuid))
        })
        .ok_or_else(|| ReferenceError::new(href, "no back-matter resource with this uuid"))?;
    let rlinks: Vec<(&str, bool)> = resource
        .get("rlinks")
        .and_then(Value::as_array)
        .map(|links| links.iter().filter_map(rlink_target).collect())
        .unwrap_or_default();
    rlinks
        .iter()
        .find(|(_, is_json)| *is_json)
        .or_else(|| rlinks.first())
        .map(|(target, _)| target.to_string())
        .ok_or_else(|| ReferenceError::new(href, "back-matter resource has no rlinks").into())
}

fn rlink_target(link: &Value) -> Option<(&str, bool)> {
    let target = link.get("href").and_then(Value::as_str)?;
    let json_media = link
        .get("media-type")
        .and_then(Value::as_str)
        .map(|media| media.contains("json"))
        .unwrap_or(false);
    Some((target, json_media || target.ends_with(".json")))
}

/// Full import href normalization: back-matter lookup, JSON fixup, then
/// relative resolution against the parent document.
pub fn import_url(
    href: &str,
    parent_url: Option<&str>,
    back_matter: Option<&Value>,
) -> Result<String> {
    let target = resolve_back_matter_href(href, back_matter)?;
    let fixed = fix_json_urls(&target);
    Ok(resolve_relative(&fixed, parent_url))
}
