//! Read view contents: a field listing or configured label/value pairs.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::record::Record;
use crate::core::resolve::display_value;
use crate::core::schema::{ModelSchema, verbose_name};
use crate::core::value::Value;
use crate::error::ResolveError;
use crate::scaffold::Bread;

/// What a computed entry can see.
#[derive(Debug, Clone)]
pub struct ReadContext<'a> {
    pub model: &'a ModelSchema,
    /// Record label, e.g. `BreadTestModel #1`.
    pub label: String,
    /// Display text of the record.
    pub object: String,
}

pub type ComputeFn = Arc<dyn Fn(&ReadContext<'_>) -> Value + Send + Sync>;

/// How the value of a label/value entry is produced.
#[derive(Clone)]
pub enum Evaluator {
    /// A member of the record (methods are invoked), or the name itself when
    /// the record has no such member.
    Attr(String),
    Computed(ComputeFn),
    Literal(Value),
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluator::Attr(name) => f.debug_tuple("Attr").field(name).finish(),
            Evaluator::Computed(_) => f.write_str("Computed(..)"),
            Evaluator::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabelValue {
    /// `None` takes the title-cased verbose name of the field named by `Attr`.
    pub label: Option<String>,
    pub evaluator: Evaluator,
}

impl LabelValue {
    pub fn field(name: &str) -> Self {
        Self {
            label: None,
            evaluator: Evaluator::Attr(name.to_string()),
        }
    }

    pub fn attr(label: &str, name: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            evaluator: Evaluator::Attr(name.to_string()),
        }
    }

    pub fn computed(
        label: &str,
        compute: impl Fn(&ReadContext<'_>) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: Some(label.to_string()),
            evaluator: Evaluator::Computed(Arc::new(compute)),
        }
    }

    pub fn literal(label: &str, value: impl Into<Value>) -> Self {
        Self {
            label: Some(label.to_string()),
            evaluator: Evaluator::Literal(value.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum ReadMode {
    /// Every stored field not excluded, labelled by verbose name.
    #[default]
    Fields,
    LabelValue(Vec<LabelValue>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadItem {
    pub label: String,
    pub value: String,
}

/// Upper-case the first character.
pub fn capfirst(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Label/value rows for the read view of `record`.
pub fn read_items<R: Record>(
    bread: &Bread,
    model: &ModelSchema,
    record: &R,
) -> Result<Vec<ReadItem>, ResolveError> {
    match bread.read_mode() {
        ReadMode::Fields => model
            .fields
            .iter()
            .filter(|field| field.kind.is_stored())
            .filter(|field| !bread.exclude().contains(&field.name))
            .map(|field| {
                Ok(ReadItem {
                    label: title_label(model, &field.name),
                    value: display_value(record, &field.name)?,
                })
            })
            .collect(),
        ReadMode::LabelValue(entries) => {
            let context = ReadContext {
                model,
                label: record.label(),
                object: record.display()?,
            };
            entries
                .iter()
                .map(|entry| evaluate(entry, record, &context))
                .collect()
        }
    }
}

fn evaluate<R: Record>(
    entry: &LabelValue,
    record: &R,
    context: &ReadContext<'_>,
) -> Result<ReadItem, ResolveError> {
    let value = match &entry.evaluator {
        Evaluator::Attr(name) if record.member(name).is_some() => display_value(record, name)?,
        Evaluator::Attr(name) => name.clone(),
        Evaluator::Computed(compute) => compute(context).to_string(),
        Evaluator::Literal(value) => value.to_string(),
    };
    let label = match (&entry.label, &entry.evaluator) {
        (Some(label), _) => capfirst(label),
        (None, Evaluator::Attr(name)) => title_label(context.model, name),
        (None, _) => String::new(),
    };
    Ok(ReadItem { label, value })
}

/// Labels were checked when the bread was built; a miss falls back to the name.
fn title_label(model: &ModelSchema, field: &str) -> String {
    verbose_name(model, field, true).unwrap_or_else(|_| capfirst(field))
}
