//! Schema-level counterpart of [`crate::core::resolve`].
//!
//! Catches misconfigured columns when a `Bread` is built rather than at the
//! first render.

use crate::core::fieldspec::segments;
use crate::core::schema::{Member, Schema, has_required_args};
use crate::error::ValidationError;

/// Check that `spec` can be resolved on every instance of `model`.
pub fn validate_fieldspec(schema: &Schema, model: &str, spec: &str) -> Result<(), ValidationError> {
    let mut current = schema.require(model)?;
    for (head, rest) in segments(spec) {
        let member = current
            .lookup(head)
            .ok_or_else(|| ValidationError::NoSuchField {
                model: current.name.clone(),
                name: head.to_string(),
            })?;
        match (member, rest) {
            (Member::Field(field), Some(rest)) => {
                let Some(related) = field.kind.related_model() else {
                    return Err(ValidationError::NotALink {
                        model: current.name.clone(),
                        segment: head.to_string(),
                        rest: rest.to_string(),
                    });
                };
                current = schema.require(related)?;
            }
            (Member::Field(_) | Member::Constant(_), None) => {}
            (Member::Method(method), None) => {
                if has_required_args(method) {
                    return Err(ValidationError::RequiredArguments {
                        model: current.name.clone(),
                        method: head.to_string(),
                    });
                }
            }
            (Member::Method(_) | Member::Constant(_), Some(rest)) => {
                return Err(ValidationError::NotAField {
                    model: current.name.clone(),
                    segment: head.to_string(),
                    rest: rest.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_schema;

    const MODEL: &str = "BreadTestModel";

    #[test]
    fn accepts_fields_methods_and_links() {
        let schema = test_schema();
        for spec in [
            "name",
            "get_name",
            "method2",
            "other",
            "other__text",
            "other__get_text",
            "__str__",
        ] {
            validate_fieldspec(&schema, MODEL, spec).unwrap_or_else(|err| panic!("{spec}: {err}"));
        }
        validate_fieldspec(&schema, "BreadLabelValueTestModel", "model2__text")
            .expect("reverse one-to-one");
    }

    #[test]
    fn rejects_method_with_required_arg() {
        let schema = test_schema();
        let err = validate_fieldspec(&schema, MODEL, "method1").expect_err("required arg");
        assert!(matches!(err, ValidationError::RequiredArguments { .. }));
    }

    #[test]
    fn rejects_unknown_names_at_any_depth() {
        let schema = test_schema();
        let err = validate_fieldspec(&schema, MODEL, "petunias").expect_err("unknown");
        assert_eq!(
            err.to_string(),
            "There is no field or attribute named 'petunias' on model 'BreadTestModel'"
        );
        let err = validate_fieldspec(&schema, MODEL, "other__petunias").expect_err("unknown");
        assert!(matches!(err, ValidationError::NoSuchField { model, .. } if model == "BreadTestModel2"));
    }

    #[test]
    fn traversal_through_non_link_fails_regardless_of_rest() {
        let schema = test_schema();
        for rest in ["text", "petunias", "get_name"] {
            let spec = format!("name__{rest}");
            let err = validate_fieldspec(&schema, MODEL, &spec).expect_err("not a link");
            assert_eq!(
                err,
                ValidationError::NotALink {
                    model: MODEL.into(),
                    segment: "name".into(),
                    rest: rest.into(),
                }
            );
        }
        let err = validate_fieldspec(&schema, MODEL, "get_name__text").expect_err("method");
        assert!(matches!(err, ValidationError::NotAField { .. }));
    }
}
