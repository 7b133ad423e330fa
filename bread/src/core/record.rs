//! Instance-level reflection used by the field-path resolver.

use std::collections::BTreeMap;

use crate::core::value::Value;
use crate::error::ResolveError;

/// Stored data of one record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub id: i64,
    pub fields: BTreeMap<String, Value>,
}

impl Row {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Field value, with `id` served from the identity.
    pub fn get(&self, name: &str) -> Value {
        if name == "id" {
            return Value::Int(self.id);
        }
        self.fields.get(name).cloned().unwrap_or(Value::Null)
    }
}

/// What a member of a record resolves to.
#[derive(Debug, Clone)]
pub enum Resolved<R> {
    Value(Value),
    Record(R),
    /// Every record reachable through a many-valued relation.
    Many(Vec<R>),
}

impl<R> Resolved<R> {
    pub fn null() -> Self {
        Resolved::Value(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Resolved::Value(Value::Null))
    }
}

impl<R: Record> Resolved<R> {
    /// Display text: values via [`Value`]'s `Display`, records via [`Record::display`].
    pub fn display(&self) -> Result<String, ResolveError> {
        match self {
            Resolved::Value(value) => Ok(value.to_string()),
            Resolved::Record(record) => record.display(),
            Resolved::Many(records) => {
                let parts = records
                    .iter()
                    .map(Record::display)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(parts.join(", "))
            }
        }
    }
}

/// Kind of a member as seen on an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Constant,
    Method { required_args: usize },
}

/// A record the resolver can walk.
///
/// Implementations are cheap handles (typically a borrow of the storage layer
/// plus a row), so the resolver clones them freely.
pub trait Record: Clone {
    /// Name used in error messages, e.g. `BreadTestModel #3`.
    fn label(&self) -> String;

    /// Capability check: what `name` refers to on this record, if anything.
    fn member(&self, name: &str) -> Option<MemberKind>;

    /// Read a field or constant. Links are followed through the storage layer.
    fn get(&self, name: &str) -> Result<Resolved<Self>, ResolveError>;

    /// Invoke a method that takes no required arguments.
    fn call(&self, name: &str) -> Result<Resolved<Self>, ResolveError>;

    /// Text shown when the record itself is rendered.
    fn display(&self) -> Result<String, ResolveError>;
}
