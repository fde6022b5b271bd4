use std::collections::BTreeSet;

use crate::catalog::ModelCatalog;
use crate::error::{Error, Result};

/// Validate internal consistency of a model catalog.
///
/// This checks:
/// - empty or duplicate model names
/// - empty or duplicate field names
/// - field annotations referencing models missing from the catalog
/// - internally contradictory field constraints
pub fn validate_catalog(catalog: &ModelCatalog) -> Result<()> {
    let mut models = BTreeSet::new();
    for model in &catalog.models {
        if model.name.trim().is_empty() {
            return Err(Error::InvalidCatalog("model name must not be empty".to_string()));
        }
        if !models.insert(model.name.as_str()) {
            return Err(Error::InvalidCatalog(format!(
                "duplicate model name: {}",
                model.name
            )));
        }

        let mut fields = BTreeSet::new();
        for field in &model.fields {
            if field.name.trim().is_empty() {
                return Err(Error::InvalidCatalog(format!(
                    "empty field name in model: {}",
                    model.name
                )));
            }
            if !fields.insert(field.name.as_str()) {
                return Err(Error::InvalidCatalog(format!(
                    "duplicate field name: {}.{}",
                    model.name, field.name
                )));
            }
            field.constraints.check_consistency().map_err(|reason| {
                Error::InvalidCatalog(format!("{}.{}: {reason}", model.name, field.name))
            })?;
        }
    }

    for model in &catalog.models {
        for field in &model.fields {
            for reference in field.annotation.model_refs() {
                if !models.contains(reference) {
                    return Err(Error::InvalidCatalog(format!(
                        "model not found: {} (referenced by {}.{})",
                        reference, model.name, field.name
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Annotation, ScalarKind};
    use crate::catalog::{FieldDef, ModelDef};

    #[test]
    fn accepts_self_referential_models() {
        let catalog = ModelCatalog::new(vec![ModelDef::new(
            "Node",
            vec![
                FieldDef::new("value", Annotation::scalar(ScalarKind::Int)),
                FieldDef::new("children", Annotation::list(Annotation::model("Node"))),
            ],
        )]);
        assert!(validate_catalog(&catalog).is_ok());
    }

    #[test]
    fn rejects_unknown_references() {
        let catalog = ModelCatalog::new(vec![ModelDef::new(
            "Order",
            vec![FieldDef::new("customer", Annotation::model("Customer"))],
        )]);
        let err = validate_catalog(&catalog).expect_err("missing model");
        assert!(err.to_string().contains("Customer"));
    }

    #[test]
    fn rejects_duplicate_fields() {
        let catalog = ModelCatalog::new(vec![ModelDef::new(
            "User",
            vec![
                FieldDef::new("id", Annotation::scalar(ScalarKind::Uuid)),
                FieldDef::new("id", Annotation::scalar(ScalarKind::Int)),
            ],
        )]);
        assert!(matches!(
            validate_catalog(&catalog),
            Err(Error::InvalidCatalog(_))
        ));
    }
}
