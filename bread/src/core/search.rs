//! Free-text search over declared fields (the `q` query parameter).
//!
//! Terms are whitespace-separated. A record matches a term if any search
//! field matches it, and matches the query if it matches every term.

use serde::Serialize;

use crate::core::fieldspec::segments;
use crate::core::schema::{Member, Schema};
use crate::core::value::Value;
use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// `^field`
    StartsWith,
    /// `=field`
    Exact,
    /// `@field`: whole-word match.
    FullText,
    /// Plain `field`: substring match.
    Contains,
}

/// A declared search field with its match mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchField {
    pub path: String,
    pub mode: MatchMode,
}

impl SearchField {
    pub fn parse(declared: &str) -> Self {
        let (mode, path) = match declared.chars().next() {
            Some('^') => (MatchMode::StartsWith, &declared[1..]),
            Some('=') => (MatchMode::Exact, &declared[1..]),
            Some('@') => (MatchMode::FullText, &declared[1..]),
            _ => (MatchMode::Contains, declared),
        };
        Self {
            path: path.to_string(),
            mode,
        }
    }

    /// Case-insensitive match of one stored value against one term.
    pub fn matches(&self, value: &Value, term: &str) -> bool {
        if value.is_null() {
            return false;
        }
        let haystack = value.to_string().to_lowercase();
        let needle = term.to_lowercase();
        match self.mode {
            MatchMode::Contains => haystack.contains(&needle),
            MatchMode::StartsWith => haystack.starts_with(&needle),
            MatchMode::Exact => haystack == needle,
            MatchMode::FullText => haystack
                .split(|ch: char| !ch.is_alphanumeric())
                .any(|word| word == needle),
        }
    }
}

/// Search fields validated against a model, built once at configuration time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFields {
    fields: Vec<SearchField>,
    distinct: bool,
}

impl SearchFields {
    /// Validate each path as a chain of relations ending in a stored field.
    ///
    /// `distinct` is set when a path crosses a many-valued relation, since
    /// one root record can then match through several related rows.
    pub fn compile(
        schema: &Schema,
        model: &str,
        declared: &[String],
    ) -> Result<Self, ValidationError> {
        let mut fields = Vec::with_capacity(declared.len());
        let mut distinct = false;
        for entry in declared {
            let field = SearchField::parse(entry);
            distinct |= check_search_path(schema, model, &field.path)?;
            fields.push(field);
        }
        Ok(Self { fields, distinct })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[SearchField] {
        &self.fields
    }

    /// Build the plan for one query string.
    pub fn build(&self, query: &str) -> SearchPlan {
        let terms: Vec<String> = query.split_whitespace().map(str::to_string).collect();
        if self.fields.is_empty() || terms.is_empty() {
            return SearchPlan::default();
        }
        SearchPlan {
            predicate: Some(SearchPredicate {
                terms,
                fields: self.fields.clone(),
            }),
            distinct: self.distinct,
        }
    }
}

/// Returns whether the path crosses a many-valued relation.
fn check_search_path(schema: &Schema, model: &str, path: &str) -> Result<bool, ValidationError> {
    let not_searchable = |reason: String| ValidationError::NotSearchable {
        model: model.to_string(),
        path: path.to_string(),
        reason,
    };
    let mut current = schema.require(model)?;
    let mut crosses_many = false;
    for (head, rest) in segments(path) {
        let field = match current.lookup(head) {
            Some(Member::Field(field)) => field,
            Some(_) => return Err(not_searchable(format!("'{head}' is not a field"))),
            None => {
                return Err(not_searchable(format!(
                    "no field named '{head}' on '{}'",
                    current.name
                )));
            }
        };
        match (field.kind.related_model(), rest) {
            (Some(related), Some(_)) => {
                crosses_many |= field.kind.is_many();
                current = schema.require(related)?;
            }
            (Some(_), None) => {
                return Err(not_searchable(format!("'{head}' is a relation")));
            }
            (None, Some(_)) => {
                return Err(not_searchable(format!("'{head}' is not a relation")));
            }
            (None, None) => {}
        }
    }
    Ok(crosses_many)
}

/// AND over terms of OR over fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPredicate {
    pub terms: Vec<String>,
    pub fields: Vec<SearchField>,
}

impl SearchPredicate {
    /// Evaluate against one record. `values_for` yields every value reachable
    /// through a path (several when it crosses a many-valued relation).
    pub fn matches<F, E>(&self, mut values_for: F) -> Result<bool, E>
    where
        F: FnMut(&str) -> Result<Vec<Value>, E>,
    {
        let mut field_values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            field_values.push(values_for(&field.path)?);
        }
        Ok(self.terms.iter().all(|term| {
            self.fields
                .iter()
                .zip(&field_values)
                .any(|(field, values)| values.iter().any(|value| field.matches(value, term)))
        }))
    }
}

/// Result of building a search: an optional predicate plus whether the caller
/// must deduplicate results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchPlan {
    pub predicate: Option<SearchPredicate>,
    pub distinct: bool,
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::test_support::test_schema;

    fn fields(declared: &[&str]) -> SearchFields {
        let declared: Vec<String> = declared.iter().map(|s| s.to_string()).collect();
        SearchFields::compile(&test_schema(), "BreadTestModel", &declared).expect("compile")
    }

    fn record(name: &str, text: &str) -> impl Fn(&str) -> Result<Vec<Value>, Infallible> {
        let name = name.to_string();
        let text = text.to_string();
        move |path| {
            Ok(match path {
                "name" => vec![Value::Text(name.clone())],
                "other__text" => vec![Value::Text(text.clone())],
                _ => Vec::new(),
            })
        }
    }

    #[test]
    fn parses_prefix_modifiers() {
        assert_eq!(SearchField::parse("^name").mode, MatchMode::StartsWith);
        assert_eq!(SearchField::parse("=name").mode, MatchMode::Exact);
        assert_eq!(SearchField::parse("@name").mode, MatchMode::FullText);
        let plain = SearchField::parse("other__text");
        assert_eq!(plain.mode, MatchMode::Contains);
        assert_eq!(plain.path, "other__text");
    }

    #[test]
    fn every_term_must_match_some_field() {
        let plan = fields(&["name", "other__text"]).build("Joe Smith");
        let predicate = plan.predicate.expect("predicate");
        assert!(predicate.matches(record("Joe", "Smith")).expect("eval"));
        assert!(!predicate.matches(record("Joe", "Brown")).expect("eval"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let predicate = fields(&["name"]).build("joe").predicate.expect("predicate");
        assert!(predicate.matches(record("Joe", "")).expect("eval"));
        let predicate = fields(&["name"]).build("قمر").predicate.expect("predicate");
        assert!(predicate.matches(record("قمر", "")).expect("eval"));
    }

    #[test]
    fn modes_restrict_matching() {
        let starts = SearchField::parse("^name");
        assert!(starts.matches(&Value::from("Joseph"), "jo"));
        assert!(!starts.matches(&Value::from("Bojo"), "jo"));
        let exact = SearchField::parse("=name");
        assert!(exact.matches(&Value::from("Joe"), "JOE"));
        assert!(!exact.matches(&Value::from("Joey"), "joe"));
        let full = SearchField::parse("@name");
        assert!(full.matches(&Value::from("Mr. Joe Smith"), "joe"));
        assert!(!full.matches(&Value::from("Joey"), "joe"));
    }

    #[test]
    fn blank_query_has_no_predicate() {
        let plan = fields(&["name"]).build("   ");
        assert_eq!(plan, SearchPlan::default());
    }

    #[test]
    fn many_relations_require_distinct() {
        assert!(!fields(&["name", "other__text"]).build("x").distinct);
        let schema = test_schema();
        let declared = vec!["breadtestmodel_set__name".to_string()];
        let many = SearchFields::compile(&schema, "BreadTestModel2", &declared).expect("compile");
        assert!(many.build("x").distinct);
    }

    #[test]
    fn non_field_paths_are_rejected() {
        let schema = test_schema();
        for path in ["get_name", "other", "name__text", "petunias"] {
            let declared = vec![path.to_string()];
            let err = SearchFields::compile(&schema, "BreadTestModel", &declared)
                .expect_err(path);
            assert!(matches!(err, ValidationError::NotSearchable { .. }), "{path}");
        }
    }
}
