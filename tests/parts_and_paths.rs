use oscal_kernel_rs::core::path::Accessor;
use oscal_kernel_rs::core::{collect_group_controls, flatten_nested};
use oscal_kernel_rs::{flatten_parts, get_at_path, set_at_path, AddressingError, EditMode, JsonPath};
use serde_json::{json, Value};

fn ids(nodes: &[&Value]) -> Vec<String> {
    nodes
        .iter()
        .map(|node| node["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn flattening_statement_parts_of_a_control() {
    let control = json!({
        "id": "ac-2",
        "parts": [
            {
                "id": "ac-2_smt",
                "name": "statement",
                "parts": [
                    { "id": "ac-2_smt.a", "name": "item" },
                    {
                        "id": "ac-2_smt.b",
                        "name": "item",
                        "parts": [{ "id": "ac-2_smt.b.1", "name": "item" }]
                    }
                ]
            },
            { "id": "ac-2_gdn", "name": "guidance" }
        ]
    });
    let before = control.clone();
    let flat = flatten_parts(&control);
    assert_eq!(
        ids(&flat),
        vec!["ac-2", "ac-2_smt", "ac-2_smt.a", "ac-2_smt.b", "ac-2_smt.b.1", "ac-2_gdn"]
    );
    // Nodes keep their own nested parts.
    assert_eq!(flat[3]["parts"][0]["id"], json!("ac-2_smt.b.1"));
    assert_eq!(control, before);
}

#[test]
fn flattening_a_part_without_children() {
    let part = json!({ "id": "only", "prose": "text" });
    assert_eq!(flatten_parts(&part), vec![&part]);
}

#[test]
fn nested_groups_contribute_controls_in_order() {
    let catalog = json!({
        "controls": [{ "id": "top-1" }],
        "groups": [
            {
                "id": "ac",
                "controls": [{ "id": "ac-1" }, { "id": "ac-2", "controls": [{ "id": "ac-2.1" }] }]
            },
            { "id": "at", "groups": [{ "id": "at-inner", "controls": [{ "id": "at-1" }] }] }
        ]
    });
    assert_eq!(ids(&collect_group_controls(&catalog)), vec!["top-1", "ac-1", "ac-2", "at-1"]);
    assert_eq!(
        ids(&flatten_nested(&catalog["groups"][0]["controls"][1], "controls")),
        vec!["ac-2", "ac-2.1"]
    );
}

fn ssp() -> Value {
    json!({
        "system-security-plan": {
            "uuid": "s-1",
            "metadata": { "title": "Old title", "roles": [] },
            "control-implementation": {
                "implemented-requirements": [
                    { "uuid": "ir-1", "control-id": "ac-1", "statements": [] },
                    { "uuid": "ir-2", "control-id": "ac-2" }
                ]
            }
        }
    })
}

#[test]
fn replacing_a_nested_title_touches_nothing_else() {
    let mut doc = ssp();
    let path = JsonPath::new()
        .key("system-security-plan")
        .key("metadata")
        .key("title");
    set_at_path(&mut doc, path, json!("New title"), EditMode::Replace).unwrap();

    let mut expected = ssp();
    expected["system-security-plan"]["metadata"]["title"] = json!("New title");
    assert_eq!(doc, expected);
}

#[test]
fn appending_to_an_array_by_index_path() {
    let mut doc = ssp();
    let path = JsonPath::new()
        .key("system-security-plan")
        .key("control-implementation")
        .key("implemented-requirements")
        .index(0)
        .key("statements");
    set_at_path(&mut doc, path, json!({ "statement-id": "ac-1_smt" }), EditMode::Append).unwrap();
    let statements = &doc["system-security-plan"]["control-implementation"]
        ["implemented-requirements"][0]["statements"];
    assert_eq!(statements, &json!([{ "statement-id": "ac-1_smt" }]));
}

#[test]
fn accessor_selects_requirement_by_uuid() {
    let mut doc = ssp();
    let path = JsonPath::new()
        .key("system-security-plan")
        .key("control-implementation")
        .key("implemented-requirements")
        .accessor(Accessor::matching("uuid", json!("ir-2")))
        .key("remarks");
    set_at_path(&mut doc, path, json!("inherited"), EditMode::Replace).unwrap();
    assert_eq!(
        doc["system-security-plan"]["control-implementation"]["implemented-requirements"][1]
            ["remarks"],
        json!("inherited")
    );
    let by_index = JsonPath::new()
        .key("system-security-plan")
        .key("control-implementation")
        .key("implemented-requirements")
        .index(0)
        .key("remarks");
    assert_eq!(get_at_path(&doc, &by_index), None);
}

#[test]
fn invalid_paths_leave_the_document_unchanged() {
    let cases = vec![
        JsonPath::new().key("system-security-plan").key("missing").key("title"),
        JsonPath::new().key("system-security-plan").key("metadata").index(0),
        JsonPath::new()
            .key("system-security-plan")
            .key("control-implementation")
            .key("implemented-requirements")
            .index(5)
            .key("remarks"),
        JsonPath::new()
            .key("system-security-plan")
            .key("uuid")
            .key("deeper"),
    ];
    for path in cases {
        let mut doc = ssp();
        let rendered = path.to_string();
        let err = set_at_path(&mut doc, path, json!("x"), EditMode::Replace).unwrap_err();
        assert!(err.is::<AddressingError>(), "{rendered}: {err}");
        assert_eq!(doc, ssp(), "{rendered} mutated the document");
    }
}

#[test]
fn appending_onto_a_scalar_is_rejected() {
    let mut doc = ssp();
    let path = JsonPath::new().key("system-security-plan").key("uuid");
    let err = set_at_path(&mut doc, path, json!("x"), EditMode::Append).unwrap_err();
    assert!(err.is::<AddressingError>());
    assert_eq!(doc, ssp());
}

#[test]
fn paths_parse_from_json_arrays() {
    let path =
        JsonPath::parse_value(&json!(["system-security-plan", "metadata", "roles"])).unwrap();
    let mut doc = ssp();
    set_at_path(&mut doc, path, json!({ "id": "admin" }), EditMode::Append).unwrap();
    assert_eq!(
        doc["system-security-plan"]["metadata"]["roles"],
        json!([{ "id": "admin" }])
    );
    assert!(JsonPath::parse_value(&json!("metadata")).is_err());
    assert!(JsonPath::parse_value(&json!([-1])).is_err());
}
