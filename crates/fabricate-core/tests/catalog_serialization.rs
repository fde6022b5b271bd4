use fabricate_core::{
    Annotation, Constraints, FieldDefault, ModelCatalog, ScalarKind, Value, validate_catalog,
};
use schemars::schema_for;

const CATALOG: &str = r#"{
  "models": [
    {
      "name": "Item",
      "fields": [
        {"name": "count", "type": "int", "constraints": {"minimum": 0, "maximum": 10}},
        {"name": "label", "type": "str", "constraints": {"max_length": 5}},
        {"name": "tag", "type": "literal[\"a\", \"b\", \"c\"]"},
        {"name": "note", "type": "str | None", "default": null},
        {"name": "tags", "type": "list[str]", "default": ["x"]}
      ]
    }
  ]
}"#;

#[test]
fn parses_catalog_documents() {
    let catalog = ModelCatalog::from_json_str(CATALOG).expect("parse catalog");
    validate_catalog(&catalog).expect("valid catalog");
    assert_eq!(catalog.catalog_version, fabricate_core::CATALOG_VERSION);

    let item = catalog.model("Item").expect("item model");
    let fields = item.raw_fields();
    let names: Vec<&str> = fields.iter().map(|field| field.name.as_str()).collect();
    assert_eq!(names, vec!["count", "label", "tag", "note", "tags"]);

    assert_eq!(fields[0].annotation, Annotation::scalar(ScalarKind::Int));
    assert_eq!(fields[0].constraints, Constraints::between(0.0, 10.0));
    assert!(fields[0].default.is_absent());
}

#[test]
fn distinguishes_null_default_from_absent_default() {
    let catalog = ModelCatalog::from_json_str(CATALOG).expect("parse catalog");
    let fields = catalog.model("Item").expect("item model").raw_fields();

    assert!(matches!(fields[1].default, FieldDefault::Absent));
    assert!(matches!(fields[3].default, FieldDefault::Value(Value::Null)));
    assert_eq!(
        fields[4].default.resolve(),
        Some(Value::List(vec![Value::Text("x".to_string())]))
    );
}

#[test]
fn serializes_catalog_deterministically() {
    let catalog = ModelCatalog::from_json_str(CATALOG).expect("parse catalog");
    let first = serde_json::to_string_pretty(&catalog).expect("serialize");
    let reparsed = ModelCatalog::from_json_str(&first).expect("reparse");
    let second = serde_json::to_string_pretty(&reparsed).expect("serialize again");
    assert_eq!(first, second);
    assert!(first.contains("\"default\": null"));
}

#[test]
fn rejects_malformed_annotations() {
    let text = r#"{"models": [{"name": "Bad", "fields": [{"name": "x", "type": "list[int"}]}]}"#;
    assert!(ModelCatalog::from_json_str(text).is_err());
}

#[test]
fn json_schema_describes_annotations_as_strings() {
    let schema = serde_json::to_value(schema_for!(ModelCatalog)).expect("serialize schema");
    assert_eq!(schema["definitions"]["Annotation"]["type"], "string");
    assert!(schema["properties"]["models"].is_object());
}
