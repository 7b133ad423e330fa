//! Model forms for the edit, add and delete views.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error as ThisError;
use tracing::{debug, info};

use crate::core::record::Record;
use crate::core::schema::{FieldDef, FieldKind, ModelSchema, verbose_name};
use crate::core::value::Value;
use crate::error::StorageError;
use crate::read::capfirst;
use crate::scaffold::{Bread, ViewKind};
use crate::store::MemoryStore;

const REQUIRED: &str = "This field is required.";
const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub id: i64,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    /// Input widget: `text`, `number`, `checkbox`, `select` or `multiselect`.
    pub widget: &'static str,
    pub value: String,
    pub required: bool,
    pub max_length: Option<usize>,
    pub choices: Vec<Choice>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BoundForm {
    pub fields: Vec<FormField>,
    #[serde(skip)]
    cleaned: BTreeMap<String, Value>,
}

impl BoundForm {
    pub fn is_valid(&self) -> bool {
        self.fields.iter().all(|field| field.errors.is_empty())
    }

    /// Parsed values, present only for fields without errors.
    pub fn cleaned(&self) -> &BTreeMap<String, Value> {
        &self.cleaned
    }

    pub fn errors(&self) -> BTreeMap<&str, &[String]> {
        self.fields
            .iter()
            .filter(|field| !field.errors.is_empty())
            .map(|field| (field.name.as_str(), field.errors.as_slice()))
            .collect()
    }
}

/// Stored, editable fields minus `exclude`.
pub fn form_fields<'m>(model: &'m ModelSchema, exclude: &[String]) -> Vec<&'m FieldDef> {
    model
        .fields
        .iter()
        .filter(|field| field.editable && field.kind.is_stored())
        .filter(|field| !exclude.contains(&field.name))
        .collect()
}

/// An unbound form, prefilled from `initial` when editing.
pub fn unbound(
    store: &MemoryStore,
    model: &ModelSchema,
    exclude: &[String],
    initial: Option<&BTreeMap<String, Value>>,
) -> Result<BoundForm, StorageError> {
    let mut form = BoundForm::default();
    for field in form_fields(model, exclude) {
        let value = initial
            .and_then(|values| values.get(&field.name))
            .cloned()
            .unwrap_or_default();
        form.fields.push(widget_for(store, model, field, &value)?);
    }
    Ok(form)
}

/// Bind submitted data; repeated keys carry many-to-many selections.
///
/// `pk` is the row being edited, if any. Its own one-to-one links do not
/// count as taken.
pub fn bind(
    store: &MemoryStore,
    model: &ModelSchema,
    pk: Option<i64>,
    exclude: &[String],
    data: &[(String, String)],
) -> Result<BoundForm, StorageError> {
    let mut form = BoundForm::default();
    for field in form_fields(model, exclude) {
        let raw: Vec<&str> = data
            .iter()
            .filter(|(key, _)| *key == field.name)
            .map(|(_, value)| value.trim())
            .collect();
        let (value, errors) = match clean(store, model, pk, field, &raw) {
            Ok(value) => (value, Vec::new()),
            Err(message) => (Value::Null, vec![message]),
        };
        let mut widget = widget_for(store, model, field, &value)?;
        if errors.is_empty() {
            form.cleaned.insert(field.name.clone(), value);
        } else {
            widget.value = raw.join(",");
        }
        widget.errors = errors;
        form.fields.push(widget);
    }
    Ok(form)
}

fn clean(
    store: &MemoryStore,
    model: &ModelSchema,
    pk: Option<i64>,
    field: &FieldDef,
    raw: &[&str],
) -> Result<Value, String> {
    let first = raw.first().copied().unwrap_or_default();
    if let FieldKind::Boolean = field.kind {
        return Ok(Value::Bool(matches!(first, "on" | "true" | "1" | "yes")));
    }
    if let FieldKind::ManyToMany { to } = &field.kind {
        let mut ids = Vec::new();
        for item in raw.iter().filter(|item| !item.is_empty()) {
            ids.push(Value::Int(link_id(store, to, item)?));
        }
        if ids.is_empty() && field.required {
            return Err(REQUIRED.to_string());
        }
        return Ok(Value::List(ids));
    }
    if first.is_empty() {
        return if field.required {
            Err(REQUIRED.to_string())
        } else {
            Ok(Value::Null)
        };
    }
    match &field.kind {
        FieldKind::Text => {
            let length = first.chars().count();
            match field.max_length {
                Some(max) if length > max => Err(format!(
                    "Ensure this value has at most {max} characters (it has {length})."
                )),
                _ => Ok(Value::Text(first.to_string())),
            }
        }
        FieldKind::Integer => first
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| "Enter a whole number.".to_string()),
        FieldKind::Float => first
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map(Value::Float)
            .ok_or_else(|| "Enter a number.".to_string()),
        FieldKind::ForeignKey { to, .. } => link_id(store, to, first).map(Value::Int),
        FieldKind::OneToOne { to, .. } => {
            let target = link_id(store, to, first)?;
            let taken = store
                .all(&model.name)
                .map_err(|err| err.to_string())?
                .iter()
                .any(|record| {
                    Some(record.id()) != pk
                        && record.row().get(&field.name).as_link_id() == Some(target)
                });
            if taken {
                return Err(format!(
                    "{} with this {} already exists.",
                    capfirst(&model.verbose_name()),
                    capfirst(&verbose_name(model, &field.name, false).unwrap_or_default())
                ));
            }
            Ok(Value::Int(target))
        }
        FieldKind::Boolean
        | FieldKind::ManyToMany { .. }
        | FieldKind::ReverseOneToOne { .. }
        | FieldKind::ReverseForeignKey { .. } => Ok(Value::Null),
    }
}

fn link_id(store: &MemoryStore, to: &str, raw: &str) -> Result<i64, String> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| store.get(to, *id).is_ok())
        .ok_or_else(|| INVALID_CHOICE.to_string())
}

fn widget_for(
    store: &MemoryStore,
    model: &ModelSchema,
    field: &FieldDef,
    value: &Value,
) -> Result<FormField, StorageError> {
    let (widget, choices) = match &field.kind {
        FieldKind::ForeignKey { to, .. } | FieldKind::OneToOne { to, .. } => {
            ("select", choices(store, to, &[value.as_link_id().unwrap_or(0)])?)
        }
        FieldKind::ManyToMany { to } => ("multiselect", choices(store, to, &value.link_ids())?),
        FieldKind::Integer | FieldKind::Float => ("number", Vec::new()),
        FieldKind::Boolean => ("checkbox", Vec::new()),
        _ => ("text", Vec::new()),
    };
    Ok(FormField {
        name: field.name.clone(),
        label: verbose_name(model, &field.name, true).unwrap_or_else(|_| field.name.clone()),
        widget,
        value: value.to_string(),
        required: field.required,
        max_length: field.max_length,
        choices,
        errors: Vec::new(),
    })
}

fn choices(store: &MemoryStore, to: &str, selected: &[i64]) -> Result<Vec<Choice>, StorageError> {
    store
        .all(to)?
        .into_iter()
        .map(|record| {
            Ok(Choice {
                id: record.id(),
                label: record
                    .display()
                    .unwrap_or_else(|_| record.label()),
                selected: selected.contains(&record.id()),
            })
        })
        .collect()
}

///
/// FormError
///
#[derive(Debug, ThisError)]
pub enum FormError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Outcome of submitting an add or edit form.
#[derive(Debug)]
pub enum Submission {
    /// Saved; the client should be redirected to `location`.
    Saved { id: i64, location: String },
    /// Validation failed; re-render with errors (HTTP 400).
    Invalid(BoundForm),
}

/// Validate and save an add (`pk = None`) or edit submission.
pub fn submit(
    store: &mut MemoryStore,
    bread: &Bread,
    pk: Option<i64>,
    data: &[(String, String)],
) -> Result<Submission, FormError> {
    let form = {
        let model = store
            .schema()
            .model(bread.model())
            .ok_or_else(|| StorageError::UnknownModel {
                model: bread.model().to_string(),
            })?;
        if let Some(pk) = pk {
            store.get(bread.model(), pk)?;
        }
        bind(store, model, pk, bread.exclude(), data)?
    };
    if !form.is_valid() {
        debug!(model = bread.model(), errors = ?form.errors(), "form invalid");
        return Ok(Submission::Invalid(form));
    }
    let values = form.cleaned;
    let id = match pk {
        Some(pk) => {
            store.update(bread.model(), pk, values)?;
            pk
        }
        None => store.insert(bread.model(), values)?,
    };
    info!(model = bread.model(), id, created = pk.is_none(), "saved");
    Ok(Submission::Saved {
        id,
        location: success_url(bread),
    })
}

/// Delete a record and return where to send the client.
pub fn delete(store: &mut MemoryStore, bread: &Bread, pk: i64) -> Result<String, FormError> {
    store.delete(bread.model(), pk)?;
    info!(model = bread.model(), id = pk, "deleted");
    Ok(success_url(bread))
}

/// Browse URL when browse is enabled, else the site root.
pub fn success_url(bread: &Bread) -> String {
    bread
        .url(ViewKind::Browse, None)
        .unwrap_or_else(|| "/".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaffold::BreadConfig;
    use crate::test_support::{seeded_store, test_schema};

    fn data(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn setup() -> (MemoryStore, Bread) {
        let schema = test_schema();
        let store = seeded_store(&schema);
        let config = BreadConfig {
            plural_name: Some("testmodels".into()),
            ..BreadConfig::new("BreadTestModel")
        };
        let bread = Bread::new(&schema, config, &store).expect("bread");
        (store, bread)
    }

    #[test]
    fn form_fields_skip_id_reverse_and_excluded() {
        let schema = test_schema();
        let model = schema.model("BreadTestModel2").expect("model");
        let names: Vec<&str> = form_fields(model, &[])
            .into_iter()
            .map(|field| field.name.as_str())
            .collect();
        assert_eq!(names, ["text", "label_model"]);
        let names: Vec<&str> = form_fields(model, &["label_model".to_string()])
            .into_iter()
            .map(|field| field.name.as_str())
            .collect();
        assert_eq!(names, ["text"]);
    }

    #[test]
    fn add_saves_and_redirects_to_browse() {
        let (mut store, bread) = setup();
        let outcome = submit(&mut store, &bread, None, &data(&[("name", "Joe"), ("age", "40")]))
            .expect("submit");
        match outcome {
            Submission::Saved { id, location } => {
                assert_eq!(location, "/testmodels/");
                let row = store.get("BreadTestModel", id).expect("saved").row();
                assert_eq!(row.get("name"), Value::from("Joe"));
                assert_eq!(row.get("age"), Value::Int(40));
                assert_eq!(row.get("other"), Value::Null);
            }
            Submission::Invalid(form) => panic!("unexpected errors {:?}", form.errors()),
        }
    }

    #[test]
    fn invalid_data_reports_field_errors() {
        let (mut store, bread) = setup();
        let outcome = submit(
            &mut store,
            &bread,
            None,
            &data(&[("name", "this name is too long"), ("age", "old"), ("other", "99")]),
        )
        .expect("submit");
        let Submission::Invalid(form) = outcome else {
            panic!("expected invalid form");
        };
        let errors = form.errors();
        assert_eq!(
            errors["name"],
            ["Ensure this value has at most 10 characters (it has 21)."]
        );
        assert_eq!(errors["age"], ["Enter a whole number."]);
        assert_eq!(errors["other"], [INVALID_CHOICE]);
        assert_eq!(store.count("BreadTestModel").expect("count"), 1);
    }

    #[test]
    fn missing_required_field() {
        let (mut store, bread) = setup();
        let Submission::Invalid(form) =
            submit(&mut store, &bread, None, &data(&[("age", "3")])).expect("submit")
        else {
            panic!("expected invalid form");
        };
        assert_eq!(form.errors()["name"], [REQUIRED]);
    }

    #[test]
    fn edit_updates_in_place() {
        let (mut store, bread) = setup();
        let outcome = submit(
            &mut store,
            &bread,
            Some(1),
            &data(&[("name", "Rudy"), ("other", "1"), ("age", "")]),
        )
        .expect("submit");
        assert!(matches!(outcome, Submission::Saved { id: 1, .. }));
        let row = store.get("BreadTestModel", 1).expect("row").row();
        assert_eq!(row.get("name"), Value::from("Rudy"));
        assert_eq!(row.get("age"), Value::Null);

        let err = submit(&mut store, &bread, Some(99), &data(&[("name", "x")])).expect_err("404");
        assert!(matches!(err, FormError::Storage(StorageError::NotFound { .. })));
    }

    #[test]
    fn unbound_form_offers_link_choices() {
        let (store, _) = setup();
        let model = store.schema().model("BreadTestModel").expect("model");
        let initial = store.get("BreadTestModel", 1).expect("row").row().fields.clone();
        let form = unbound(&store, model, &[], Some(&initial)).expect("form");
        let other = form
            .fields
            .iter()
            .find(|field| field.name == "other")
            .expect("other field");
        assert_eq!(other.widget, "select");
        assert_eq!(
            other.choices,
            [Choice {
                id: 1,
                label: "BreadTestModel2 object (1)".into(),
                selected: true,
            }]
        );
        assert_eq!(form.fields[0].value, "Rudy Vallee");
    }

    #[test]
    fn one_to_one_already_in_use_is_a_field_error() {
        let schema = test_schema();
        let mut store = seeded_store(&schema);
        let config = BreadConfig {
            views: "READ".into(),
            ..BreadConfig::new("BreadTestModel2")
        };
        let bread = Bread::new(&schema, config, &store).expect("bread");

        let outcome = submit(
            &mut store,
            &bread,
            None,
            &data(&[("text", "Zebra"), ("label_model", "1")]),
        )
        .expect("submit");
        let Submission::Invalid(form) = outcome else {
            panic!("expected invalid form");
        };
        assert_eq!(
            form.errors()["label_model"],
            ["Bread test model2 with this Label model already exists."]
        );
        assert_eq!(store.count("BreadTestModel2").expect("count"), 1);

        let outcome = submit(
            &mut store,
            &bread,
            Some(1),
            &data(&[("text", "Rhino"), ("label_model", "1")]),
        )
        .expect("submit");
        assert!(matches!(outcome, Submission::Saved { id: 1, .. }));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let schema = test_schema();
        let store = seeded_store(&schema);
        let field = FieldDef::new("ratio", FieldKind::Float);
        let model = schema.model("BreadTestModel").expect("model");
        for raw in ["NaN", "inf", "-infinity"] {
            assert_eq!(
                clean(&store, model, None, &field, &[raw]),
                Err("Enter a number.".to_string()),
                "{raw}"
            );
        }
        assert_eq!(
            clean(&store, model, None, &field, &["2.5"]),
            Ok(Value::Float(2.5))
        );
    }

    #[test]
    fn delete_removes_the_row() {
        let (mut store, bread) = setup();
        assert_eq!(delete(&mut store, &bread, 1).expect("delete"), "/testmodels/");
        assert!(store.get("BreadTestModel", 1).is_err());
        assert!(delete(&mut store, &bread, 1).is_err());
    }
}
