//! Ordering built from the `o` query parameter.
//!
//! `o` is a comma-separated list of signed column indices (`0,-1`). Each
//! index maps to its column's sort field; default ordering keys are appended
//! as tie-breakers so the result order is total.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::core::columns::Column;
use crate::core::fieldspec::strip_direction;
use crate::error::{BadRequest, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// One `(field path, direction)` sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderKey {
    pub field: String,
    pub direction: Direction,
}

impl OrderKey {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Desc,
        }
    }

    /// Parse a model-style ordering entry (`name`, `-age`).
    pub fn parse(entry: &str) -> Self {
        match entry.strip_prefix('-') {
            Some(field) => Self::desc(field),
            None => Self::asc(entry),
        }
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Asc => f.write_str(&self.field),
            Direction::Desc => write!(f, "-{}", self.field),
        }
    }
}

/// The storage layer's "attempt to compile this ordering" call.
pub trait OrderCompiler {
    fn compile_order(&self, model: &str, keys: &[OrderKey]) -> Result<(), StorageError>;
}

/// Column indices that are valid in `o`, computed once at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct SortableColumns(Vec<usize>);

impl SortableColumns {
    /// Keep columns that are not disabled and whose sort field compiles.
    pub fn compute(model: &str, columns: &[Column], compiler: &dyn OrderCompiler) -> Self {
        let mut valid = Vec::new();
        for (idx, column) in columns.iter().enumerate() {
            let Some(field) = column.sort_field() else {
                continue;
            };
            match compiler.compile_order(model, &[OrderKey::asc(field)]) {
                Ok(()) => valid.push(idx),
                Err(err) => {
                    debug!(model, column = idx, field, error = %err, "column is not sortable");
                }
            }
        }
        Self(valid)
    }

    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn contains(&self, idx: i64) -> bool {
        usize::try_from(idx).is_ok_and(|idx| self.0.contains(&idx))
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

/// Parse `o` into `(direction, column index)` pairs, in request order.
pub fn parse_order_param(raw: &str) -> Result<Vec<(Direction, i64)>, BadRequest> {
    raw.split(',')
        .map(|token| {
            let (direction, digits) = match token.strip_prefix('-') {
                Some(rest) => (Direction::Desc, rest),
                None => (Direction::Asc, token),
            };
            let idx = digits.trim().parse::<i64>().map_err(|_| {
                BadRequest::new(format!(
                    "{digits} is not a valid integer in sorting param o={raw:?}"
                ))
            })?;
            Ok((direction, idx))
        })
        .collect()
}

/// Build the full ordering for a browse request.
///
/// Request order is preserved (the first token is the primary key). Default
/// ordering entries are appended unless their field, sign ignored, already
/// appears among the explicit keys. Field names are compared as exact
/// strings.
pub fn build_order(
    columns: &[Column],
    sortable: &SortableColumns,
    raw: &str,
    default_order: &[String],
) -> Result<Vec<OrderKey>, BadRequest> {
    let mut keys = Vec::new();
    for (direction, idx) in parse_order_param(raw)? {
        let field = sortable
            .contains(idx)
            .then(|| usize::try_from(idx).ok())
            .flatten()
            .and_then(|idx| columns.get(idx))
            .and_then(Column::sort_field)
            .ok_or_else(|| {
                BadRequest::new(format!(
                    "{idx} is not a valid column number to sort on. The valid column numbers are {:?}",
                    sortable.indices()
                ))
            })?;
        keys.push(OrderKey {
            field: field.to_string(),
            direction,
        });
    }

    let explicit: Vec<String> = keys
        .iter()
        .map(|key| strip_direction(&key.field).to_string())
        .collect();
    for entry in default_order {
        if !explicit.iter().any(|field| field == strip_direction(entry)) {
            keys.push(OrderKey::parse(entry));
        }
    }
    Ok(keys)
}

/// Ask the storage layer to compile `keys`, surfacing rejection as a bad request.
pub fn compile_order(
    compiler: &dyn OrderCompiler,
    model: &str,
    keys: &[OrderKey],
) -> Result<(), BadRequest> {
    compiler.compile_order(model, keys).map_err(|err| {
        BadRequest::new(format!(
            "There is an invalid column for sorting in the ordering parameter: {err}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts every path except the ones listed.
    struct Rejecting(Vec<&'static str>);

    impl OrderCompiler for Rejecting {
        fn compile_order(&self, _model: &str, keys: &[OrderKey]) -> Result<(), StorageError> {
            match keys.iter().find(|key| self.0.contains(&key.field.as_str())) {
                Some(key) => Err(StorageError::Field(format!(
                    "Cannot resolve keyword '{}' into field",
                    key.field
                ))),
                None => Ok(()),
            }
        }
    }

    fn columns() -> Vec<Column> {
        vec![Column::new("Name", "name"), Column::new("Text", "other__text")]
    }

    fn defaults() -> Vec<String> {
        vec!["name".to_string(), "-age".to_string()]
    }

    #[test]
    fn explicit_keys_then_remaining_defaults() {
        let sortable = SortableColumns::from_indices(vec![0, 1]);
        let keys = build_order(&columns(), &sortable, "0,1", &defaults()).expect("order");
        assert_eq!(
            keys,
            vec![
                OrderKey::asc("name"),
                OrderKey::asc("other__text"),
                OrderKey::desc("age"),
            ]
        );
    }

    #[test]
    fn request_order_and_direction_are_preserved() {
        let sortable = SortableColumns::from_indices(vec![0, 1]);
        let keys = build_order(&columns(), &sortable, "1,-0", &defaults()).expect("order");
        assert_eq!(
            keys,
            vec![
                OrderKey::asc("other__text"),
                OrderKey::desc("name"),
                OrderKey::desc("age"),
            ]
        );
    }

    #[test]
    fn default_key_never_overrides_explicit_direction() {
        let sortable = SortableColumns::from_indices(vec![0, 1]);
        let defaults = vec!["-name".to_string()];
        let keys = build_order(&columns(), &sortable, "0", &defaults).expect("order");
        assert_eq!(keys, vec![OrderKey::asc("name")]);
    }

    #[test]
    fn same_request_yields_same_order() {
        let sortable = SortableColumns::from_indices(vec![0, 1]);
        let first = build_order(&columns(), &sortable, "-1,0", &defaults()).expect("order");
        let second = build_order(&columns(), &sortable, "-1,0", &defaults()).expect("order");
        assert_eq!(first, second);
    }

    #[test]
    fn out_of_range_index_lists_valid_columns() {
        let sortable = SortableColumns::from_indices(vec![0, 1]);
        let err = build_order(&columns(), &sortable, "5", &defaults()).expect_err("bad index");
        assert_eq!(
            err.message,
            "5 is not a valid column number to sort on. The valid column numbers are [0, 1]"
        );
    }

    #[test]
    fn non_integer_token_is_named() {
        let sortable = SortableColumns::from_indices(vec![0, 1]);
        let err = build_order(&columns(), &sortable, "x", &defaults()).expect_err("bad token");
        assert_eq!(err.message, "x is not a valid integer in sorting param o=\"x\"");
        let err = build_order(&columns(), &sortable, "0,-y", &defaults()).expect_err("bad token");
        assert!(err.message.starts_with("y is not a valid integer"));
    }

    #[test]
    fn sortable_columns_skip_disabled_and_uncompilable() {
        let columns = vec![
            Column::new("Name", "name"),
            Column::new("Text", "other__get_text"),
            Column::new("Age", "age").unsortable(),
            Column::new("Other", "other__get_text").sort_by("other__text"),
        ];
        let compiler = Rejecting(vec!["other__get_text"]);
        let sortable = SortableColumns::compute("BreadTestModel", &columns, &compiler);
        assert_eq!(sortable.indices(), &[0, 3]);
        let err = build_order(&columns, &sortable, "1", &[]).expect_err("unsortable");
        assert!(err.message.contains("[0, 3]"));
    }

    #[test]
    fn compile_rejection_becomes_bad_request() {
        let compiler = Rejecting(vec!["bogus"]);
        let err = compile_order(&compiler, "BreadTestModel", &[OrderKey::asc("bogus")])
            .expect_err("rejected");
        assert!(
            err.message
                .starts_with("There is an invalid column for sorting in the ordering parameter")
        );
    }
}
