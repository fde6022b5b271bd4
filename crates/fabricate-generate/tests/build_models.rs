use std::sync::Arc;

use fabricate_core::{Annotation, FieldDef, ModelCatalog, ModelDef, RawField, Record, Value};
use fabricate_generate::{
    BuildOptions, BuildRequest, GenerationError, Model, ModelBuilder, Overrides,
    ProviderRegistry,
};
use rand::RngCore;

fn field(name: &str, annotation: &str) -> FieldDef {
    FieldDef::new(name, Annotation::parse(annotation).expect("annotation"))
}

fn catalog() -> ModelCatalog {
    ModelCatalog::new(vec![
        ModelDef::new(
            "Item",
            vec![
                field("count", "int(minimum=0, maximum=10)"),
                field("label", "str(max_length=5)"),
                field("tag", r#"literal["a", "b", "c"]"#),
            ],
        ),
        ModelDef::new(
            "Node",
            vec![field("value", "int"), field("children", "list[Node]")],
        ),
        ModelDef::new(
            "Person",
            vec![
                field("name", "str@name"),
                field("email", "str@email"),
                field("address", "Address"),
            ],
        ),
        ModelDef::new(
            "Address",
            vec![field("city", "str@city"), field("zip", "str@zip_code")],
        ),
        ModelDef::new(
            "Inventory",
            vec![field("stock", "dict[str(max_length=3), int(minimum=0)](min_length=1, max_length=4)")],
        ),
    ])
}

fn builder() -> ModelBuilder {
    ModelBuilder::new()
        .with_catalog(catalog())
        .expect("catalog")
}

fn record(value: &Value) -> &Record {
    value.as_record().expect("record")
}

fn nesting(value: &Value) -> usize {
    let children = record(value)
        .get("children")
        .and_then(Value::as_items)
        .unwrap_or(&[]);
    1 + children.iter().map(nesting).max().unwrap_or(0)
}

#[test]
fn seeded_builds_repeat_and_honor_constraints() {
    let builder = builder();
    let request = BuildRequest::new().seed(42);
    let first = builder.build("Item", &request).expect("first");
    let second = builder.build("Item", &request).expect("second");
    assert_eq!(first, second);

    let item = record(&first);
    let count = item.get("count").and_then(Value::as_i64).expect("count");
    assert!((0..=10).contains(&count));
    let label = item.get("label").and_then(Value::as_str).expect("label");
    assert!(label.chars().count() <= 5);
    let tag = item.get("tag").and_then(Value::as_str).expect("tag");
    assert!(["a", "b", "c"].contains(&tag));
}

#[test]
fn literal_overrides_win_for_every_seed() {
    let builder = builder();
    for seed in 0..20 {
        let request = BuildRequest::new().seed(seed).set("label", "fixed");
        let item = builder.build("Item", &request).expect("item");
        assert_eq!(record(&item).get("label"), Some(&Value::from("fixed")));
    }
}

#[test]
fn list_of_self_respects_the_depth_cap() {
    let builder = builder()
        .with_options(BuildOptions {
            max_recursion_depth: 3,
            ..BuildOptions::default()
        })
        .expect("options");
    let outcome = builder
        .build_batch_report("Node", 10, &BuildRequest::new().seed(3))
        .expect("nodes");
    assert_eq!(outcome.instances.len(), 10);
    for node in &outcome.instances {
        assert!(nesting(node) <= 3);
    }
    assert!(outcome.report.recursion_limit_hits > 0);
}

#[test]
fn nested_overrides_reach_into_sub_models() {
    let builder = builder();
    let request = BuildRequest::new().seed(9).set("address.city", "Lisbon");
    let person = builder.build("Person", &request).expect("person");
    let address = record(&person).get("address").expect("address");
    assert_eq!(record(address).get("city"), Some(&Value::from("Lisbon")));
    assert!(record(address).get("zip").and_then(Value::as_str).is_some());
    assert!(
        record(&person)
            .get("email")
            .and_then(Value::as_str)
            .is_some_and(|email| email.contains('@'))
    );
}

#[test]
fn factory_overrides_draw_from_the_build_rng() {
    let builder = builder();
    let overrides = Overrides::new().with_factory("count", |rng| {
        Value::Int(i64::from(rng.next_u32() % 3))
    });
    let request = BuildRequest::new().seed(5).overrides(overrides);
    let a = builder.build_batch("Item", 5, &request).expect("a");
    let b = builder.build_batch("Item", 5, &request).expect("b");
    assert_eq!(a, b);
    for item in &a {
        let count = record(item).get("count").and_then(Value::as_i64);
        assert!(matches!(count, Some(0..=2)));
    }
}

#[test]
fn mapping_keys_are_distinct_and_lengths_bounded() {
    let builder = builder();
    let batch = builder
        .build_batch("Inventory", 20, &BuildRequest::new().seed(11))
        .expect("inventory");
    for inventory in &batch {
        let entries = record(inventory)
            .get("stock")
            .and_then(Value::as_entries)
            .expect("stock");
        assert!((1..=4).contains(&entries.len()));
        for (idx, (key, value)) in entries.iter().enumerate() {
            assert!(entries[..idx].iter().all(|(other, _)| other != key));
            assert!(key.as_str().is_some_and(|key| key.chars().count() <= 3));
            assert!(value.as_i64().is_some_and(|value| value >= 0));
        }
    }
}

#[test]
fn unknown_models_and_override_keys_fail_explicitly() {
    let builder = builder();
    assert!(matches!(
        builder.build("Ghost", &BuildRequest::new()),
        Err(GenerationError::UnsupportedType { .. })
    ));
    assert!(matches!(
        builder.build("Item", &BuildRequest::new().set("colour", "red")),
        Err(GenerationError::InvalidOverride { .. })
    ));
}

#[test]
fn best_effort_batches_record_failures() {
    let catalog = ModelCatalog::new(vec![ModelDef::new(
        "Broken",
        vec![field("flags", "set[bool](min_length=3)")],
    )]);
    let builder = ModelBuilder::new()
        .with_catalog(catalog)
        .expect("catalog")
        .with_options(BuildOptions {
            max_unique_attempts: 5,
            ..BuildOptions::default()
        })
        .expect("options");

    let strict = builder.build_batch("Broken", 3, &BuildRequest::new().seed(1));
    assert!(matches!(
        strict,
        Err(GenerationError::UnsatisfiableConstraint { .. })
    ));

    let outcome = builder
        .build_batch_report("Broken", 3, &BuildRequest::new().seed(1).best_effort(true))
        .expect("best effort");
    assert!(outcome.instances.is_empty());
    assert_eq!(outcome.report.failures.len(), 3);
    assert_eq!(outcome.report.failures[2].index, 2);
}

#[test]
fn standalone_annotations_can_be_generated() {
    let builder = builder();
    let annotation = Annotation::parse("list[int(minimum=1, maximum=6)](min_length=2, max_length=2)")
        .expect("annotation");
    let value = builder
        .generate(&annotation, &BuildRequest::new().seed(4))
        .expect("value");
    let items = value.as_items().expect("items");
    assert_eq!(items.len(), 2);
    assert!(
        items
            .iter()
            .all(|item| item.as_i64().is_some_and(|n| (1..=6).contains(&n)))
    );
}

#[derive(Debug, PartialEq)]
struct Customer {
    name: String,
    age: i64,
    tags: Vec<String>,
    active: bool,
}

impl Model for Customer {
    const NAME: &'static str = "Customer";

    fn fields() -> Vec<RawField> {
        vec![
            RawField::parse("name", "str@name").expect("name"),
            RawField::parse("age", "int@age(maximum=120)").expect("age"),
            RawField::parse("tags", "list[str@word]").expect("tags"),
            RawField::parse("active", "bool")
                .expect("active")
                .with_default(true),
        ]
    }

    fn from_record(mut record: Record) -> fabricate_core::Result<Self> {
        Ok(Self {
            name: record.take_as("name")?,
            age: record.take_as("age")?,
            tags: record.take_as("tags")?,
            active: record.take_as("active")?,
        })
    }
}

#[test]
fn typed_models_build_into_their_own_type() {
    let builder = ModelBuilder::new().register_model::<Customer>();
    let request = BuildRequest::new().seed(21).use_default_for("active");
    let customers = builder
        .build_batch_as::<Customer>(5, &request)
        .expect("customers");
    assert_eq!(customers.len(), 5);
    for customer in &customers {
        assert!(!customer.name.is_empty());
        assert!((0..=120).contains(&customer.age));
        assert!(customer.active);
        assert!(!customer.tags.is_empty());
    }

    let skipped = builder
        .build_as::<Customer>(&BuildRequest::new().overrides(Overrides::new().skip("active")))
        .expect("skipped");
    assert!(skipped.active);
}

#[test]
fn typed_builds_require_registration() {
    let builder = ModelBuilder::new()
        .with_adapter(Arc::new(
            fabricate_generate::CatalogAdapter::new(catalog()).expect("catalog"),
        ));
    assert!(matches!(
        builder.build_as::<Customer>(&BuildRequest::new()),
        Err(GenerationError::UnsupportedType { .. })
    ));
}

fn single_field(annotation: &str) -> ModelBuilder {
    ModelBuilder::new()
        .with_catalog(ModelCatalog::new(vec![ModelDef::new(
            "Sample",
            vec![field("value", annotation)],
        )]))
        .expect("catalog")
}

fn built_field(builder: &ModelBuilder, seed: u64) -> Result<Value, GenerationError> {
    let value = builder.build("Sample", &BuildRequest::new().seed(seed))?;
    Ok(record(&value).get("value").cloned().expect("value field"))
}

#[test]
fn anchored_patterns_generate_full_matches() {
    let builder = single_field(r#"str(pattern="^[A-Z]{2}-[0-9]{3}$")"#);
    let code = regex::Regex::new("^[A-Z]{2}-[0-9]{3}$").expect("regex");
    for seed in 0..10 {
        let value = built_field(&builder, seed).expect("code");
        let text = value.as_str().expect("text");
        assert!(code.is_match(text), "{text}");
    }
}

#[test]
fn floats_spanning_the_whole_range_are_finite() {
    let builder = single_field("float(minimum=-1e308, maximum=1e308)");
    for seed in 0..10 {
        let value = built_field(&builder, seed).expect("float");
        let value = value.as_f64().expect("float");
        assert!(value.is_finite() && (-1e308..=1e308).contains(&value));
    }
}

#[test]
fn pattern_text_can_reach_a_long_min_length() {
    let builder = single_field(r#"str(pattern="[a-z]+", min_length=40)"#);
    let value = built_field(&builder, 1).expect("text");
    assert!(value.as_str().is_some_and(|text| text.len() >= 40));
}

#[test]
fn mapping_keys_never_truncate_silently() {
    let builder = single_field("dict[bool, int]")
        .with_options(BuildOptions {
            min_collection_length: 3,
            max_collection_length: 3,
            ..BuildOptions::default()
        })
        .expect("options");
    assert!(matches!(
        built_field(&builder, 1),
        Err(GenerationError::UnsatisfiableConstraint { .. })
    ));
}

#[test]
fn contradictory_element_constraints_fail_at_build_time() {
    let builder = single_field("list[int(minimum=5, maximum=1)]");
    assert!(matches!(
        built_field(&builder, 1),
        Err(GenerationError::UnsatisfiableConstraint { .. })
    ));
}

#[test]
fn rejected_construction_carries_the_field_values() {
    let catalog = ModelCatalog::new(vec![ModelDef::new(
        "Badge",
        vec![field("owner", "str"), field("number", "int")],
    )]);
    let builder = ModelBuilder::new().with_catalog(catalog).expect("catalog");
    let request = BuildRequest::new()
        .seed(3)
        .overrides(Overrides::new().set("owner", "ana").skip("number"));
    match builder.build("Badge", &request) {
        Err(GenerationError::Construction { model, fields, .. }) => {
            assert_eq!(model, "Badge");
            assert_eq!(fields.get("owner"), Some(&Value::from("ana")));
            assert!(fields.get("number").is_none());
        }
        other => panic!("expected a construction error, got {other:?}"),
    }
}

#[test]
fn single_builds_keep_the_original_error_under_best_effort() {
    let builder = single_field("bool").with_registry(Arc::new(ProviderRegistry::new()));
    let err = builder
        .build("Sample", &BuildRequest::new().seed(1).best_effort(true))
        .expect_err("no providers");
    assert!(matches!(
        err,
        GenerationError::ProviderNotFound { signature, .. } if signature == "bool"
    ));
}
