use fabricate_core::ModelCatalog;
use fabricate_generate::{BuildRequest, ModelBuilder};

const CATALOG: &str = r#"{
  "models": [
    {
      "name": "User",
      "fields": [
        { "name": "id", "type": "uuid" },
        { "name": "name", "type": "str@name" },
        { "name": "email", "type": "str@email" },
        { "name": "age", "type": "int@age(maximum=99)" },
        { "name": "role", "type": "literal[\"admin\", \"member\"]", "default": "member" },
        { "name": "manager", "type": "User | None" }
      ]
    }
  ]
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = ModelCatalog::from_json_str(CATALOG)?;
    let builder = ModelBuilder::new().with_catalog(catalog)?;
    let request = BuildRequest::new().seed(42).set("manager.role", "admin");
    let users = builder.build_batch("User", 3, &request)?;
    println!("{}", serde_json::to_string_pretty(&users)?);
    Ok(())
}
