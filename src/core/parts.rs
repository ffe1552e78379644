use serde_json::Value;

/// Pre-order list of `node` and every descendant reachable through `parts`.
/// The input is only read; nested parts stay attached to their parents.
pub fn flatten_parts(node: &Value) -> Vec<&Value> {
    flatten_nested(node, "parts")
}

/// Same traversal as [`flatten_parts`] over an arbitrary child field.
pub fn flatten_nested<'a>(node: &'a Value, field: &str) -> Vec<&'a Value> {
    let mut out = Vec::new();
    push_preorder(node, field, &mut out);
    out
}

fn push_preorder<'a>(node: &'a Value, field: &str, out: &mut Vec<&'a Value>) {
    out.push(node);
    if let Some(Value::Array(children)) = node.get(field) {
        for child in children {
            push_preorder(child, field, out);
        }
    }
}

/// Controls of a catalog (or group) in document order: the container's own
/// `controls`, then those of each group in `groups`, descending into nested
/// groups. Sub-controls remain nested inside their parent control.
pub fn collect_group_controls(container: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    for group in flatten_nested(container, "groups") {
        if let Some(Value::Array(controls)) = group.get("controls") {
            out.extend(controls.iter());
        }
    }
    out
}

/// Every control of a catalog, enhancements included: each control from
/// [`collect_group_controls`] followed by its sub-controls in pre-order.
pub fn flatten_controls(container: &Value) -> Vec<&Value> {
    collect_group_controls(container)
        .into_iter()
        .flat_map(|control| flatten_nested(control, "controls"))
        .collect()
}

/// A copy of `control` without its nested `controls`, for flat control lists.
pub fn detach_sub_controls(control: &Value) -> Value {
    let mut detached = control.clone();
    if let Value::Object(map) = &mut detached {
        map.remove("controls");
    }
    detached
}
