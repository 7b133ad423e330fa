//! In-memory storage layer.
//!
//! Rows live in per-model tables keyed by id. The store plays the role of the
//! query layer for BREAD views: it follows links for the resolver, compiles
//! and applies orderings, and evaluates search predicates.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::core::fieldspec::segments;
use crate::core::ordering::{Direction, OrderCompiler, OrderKey};
use crate::core::record::{MemberKind, Record, Resolved, Row};
use crate::core::schema::{FieldDef, FieldKind, Member, ModelSchema, Schema};
use crate::core::search::SearchPredicate;
use crate::core::value::Value;
use crate::error::{ResolveError, StorageError};

type Table = BTreeMap<i64, Row>;

#[derive(Debug, Clone)]
pub struct MemoryStore {
    schema: Arc<Schema>,
    tables: BTreeMap<String, Table>,
    next_ids: BTreeMap<String, i64>,
}

impl MemoryStore {
    pub fn new(schema: Arc<Schema>) -> Self {
        let tables = schema
            .models()
            .map(|model| (model.name.clone(), Table::new()))
            .collect();
        Self {
            schema,
            tables,
            next_ids: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Insert a row with the next free id.
    pub fn insert(
        &mut self,
        model: &str,
        fields: BTreeMap<String, Value>,
    ) -> Result<i64, StorageError> {
        let id = self.next_ids.get(model).copied().unwrap_or(1);
        self.insert_with_id(model, id, fields)?;
        Ok(id)
    }

    /// Insert a row under an explicit id. Ids are never reused.
    pub fn insert_with_id(
        &mut self,
        model: &str,
        id: i64,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), StorageError> {
        self.check_fields(model, Some(id), &fields)?;
        let table = self.table_mut(model)?;
        if table.contains_key(&id) {
            return Err(StorageError::Invalid(format!(
                "{model} with id {id} already exists"
            )));
        }
        table.insert(id, Row { id, fields });
        let next = self.next_ids.entry(model.to_string()).or_insert(1);
        *next = (*next).max(id + 1);
        debug!(model, id, "inserted row");
        Ok(())
    }

    /// Overwrite the given fields of an existing row.
    pub fn update(
        &mut self,
        model: &str,
        id: i64,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), StorageError> {
        self.check_fields(model, Some(id), &fields)?;
        let row = self
            .table_mut(model)?
            .get_mut(&id)
            .ok_or_else(|| not_found(model, id))?;
        row.fields.extend(fields);
        debug!(model, id, "updated row");
        Ok(())
    }

    /// Remove a row.
    ///
    /// Rows linking to it through a foreign key or one-to-one field are
    /// deleted as well, recursively. Many-to-many lists drop its id.
    pub fn delete(&mut self, model: &str, id: i64) -> Result<Row, StorageError> {
        let row = self
            .table_mut(model)?
            .remove(&id)
            .ok_or_else(|| not_found(model, id))?;
        let mut pending = vec![(model.to_string(), id)];
        while let Some((target, target_id)) = pending.pop() {
            for (dependent, dependent_id) in self.unlink(&target, target_id) {
                let removed = self
                    .tables
                    .get_mut(&dependent)
                    .and_then(|table| table.remove(&dependent_id));
                if removed.is_some() {
                    debug!(model = %dependent, id = dependent_id, "cascaded delete");
                    pending.push((dependent, dependent_id));
                }
            }
        }
        debug!(model, id, "deleted row");
        Ok(row)
    }

    /// Drop `id` from many-to-many lists pointing at `model` and return the
    /// rows whose single-valued link points at it.
    fn unlink(&mut self, model: &str, id: i64) -> Vec<(String, i64)> {
        let schema = Arc::clone(&self.schema);
        let mut dependents = Vec::new();
        for source in schema.models() {
            let Some(table) = self.tables.get_mut(&source.name) else {
                continue;
            };
            for field in &source.fields {
                match &field.kind {
                    FieldKind::ForeignKey { to, .. } | FieldKind::OneToOne { to, .. }
                        if to == model =>
                    {
                        dependents.extend(
                            table
                                .values()
                                .filter(|row| row.get(&field.name).as_link_id() == Some(id))
                                .map(|row| (source.name.clone(), row.id)),
                        );
                    }
                    FieldKind::ManyToMany { to } if to == model => {
                        for row in table.values_mut() {
                            if let Some(Value::List(ids)) = row.fields.get_mut(&field.name) {
                                ids.retain(|item| item.as_link_id() != Some(id));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        dependents
    }

    pub fn get(&self, model: &str, id: i64) -> Result<StoredRecord<'_>, StorageError> {
        let schema = self.model(model)?;
        let row = self.table(model)?.get(&id).ok_or_else(|| not_found(model, id))?;
        Ok(StoredRecord {
            store: self,
            model: schema,
            row,
        })
    }

    /// Every row of `model`, by id.
    pub fn all(&self, model: &str) -> Result<Vec<StoredRecord<'_>>, StorageError> {
        let schema = self.model(model)?;
        Ok(self
            .table(model)?
            .values()
            .map(|row| StoredRecord {
                store: self,
                model: schema,
                row,
            })
            .collect())
    }

    pub fn count(&self, model: &str) -> Result<usize, StorageError> {
        Ok(self.table(model)?.len())
    }

    /// Run a query: filter, deduplicate, then stable-sort.
    ///
    /// Rows with equal keys keep id order, so a query without ordering
    /// returns rows by id.
    pub fn execute(&self, query: &QuerySet) -> Result<Vec<StoredRecord<'_>>, StorageError> {
        self.compile_order(&query.model, &query.order)?;
        let mut records = self.all(&query.model)?;

        if let Some(predicate) = &query.search {
            let mut matched = Vec::with_capacity(records.len());
            for record in records {
                if predicate.matches(|path| self.values_for(&record, path))? {
                    matched.push(record);
                }
            }
            records = matched;
        }

        if query.distinct {
            let mut seen = BTreeSet::new();
            records.retain(|record| seen.insert(record.row.id));
        }

        if !query.order.is_empty() {
            let mut keyed = Vec::with_capacity(records.len());
            for record in records {
                let keys = query
                    .order
                    .iter()
                    .map(|key| self.sort_value(&record, &key.field))
                    .collect::<Result<Vec<_>, _>>()?;
                keyed.push((keys, record));
            }
            keyed.sort_by(|(left, _), (right, _)| compare_keys(&query.order, left, right));
            records = keyed.into_iter().map(|(_, record)| record).collect();
        }

        debug!(model = %query.model, rows = records.len(), "executed query");
        Ok(records)
    }

    /// Every value reachable from `record` through `path`.
    ///
    /// Paths crossing many-valued relations fan out; empty links yield nothing.
    pub fn values_for<'s>(
        &'s self,
        record: &StoredRecord<'s>,
        path: &str,
    ) -> Result<Vec<Value>, StorageError> {
        let mut frontier = vec![*record];
        let mut values = Vec::new();
        for (head, rest) in segments(path) {
            let mut next = Vec::new();
            for current in &frontier {
                let field = current.field(head)?;
                match rest {
                    Some(_) => next.extend(self.related(current, field)?),
                    None => values.push(current.row.get(head)),
                }
            }
            frontier = next;
        }
        Ok(values)
    }

    /// Value used when sorting on `path`. Relation terminals sort by related id.
    fn sort_value<'s>(&'s self, record: &StoredRecord<'s>, path: &str) -> Result<Value, StorageError> {
        let mut current = *record;
        for (head, rest) in segments(path) {
            let field = current.field(head)?;
            match (rest, &field.kind) {
                (None, FieldKind::ReverseOneToOne { .. }) => {
                    let related = self.related(&current, field)?;
                    return Ok(related
                        .first()
                        .map(|target| Value::Int(target.row.id))
                        .unwrap_or(Value::Null));
                }
                (None, _) => return Ok(current.row.get(head)),
                (Some(_), _) => match self.related(&current, field)?.into_iter().next() {
                    Some(target) => current = target,
                    None => return Ok(Value::Null),
                },
            }
        }
        Ok(Value::Null)
    }

    /// Records linked through `field` from `record`.
    fn related<'s>(
        &'s self,
        record: &StoredRecord<'s>,
        field: &FieldDef,
    ) -> Result<Vec<StoredRecord<'s>>, StorageError> {
        match &field.kind {
            FieldKind::ForeignKey { to, .. } | FieldKind::OneToOne { to, .. } => {
                match record.row.get(&field.name).as_link_id() {
                    Some(id) => Ok(vec![self.get(to, id)?]),
                    None => Ok(Vec::new()),
                }
            }
            FieldKind::ManyToMany { to } => record
                .row
                .get(&field.name)
                .link_ids()
                .into_iter()
                .map(|id| self.get(to, id))
                .collect(),
            FieldKind::ReverseOneToOne { from, field: link }
            | FieldKind::ReverseForeignKey { from, field: link } => {
                let target = record.row.id;
                Ok(self
                    .all(from)?
                    .into_iter()
                    .filter(|candidate| candidate.row.get(link).as_link_id() == Some(target))
                    .collect())
            }
            FieldKind::Text | FieldKind::Integer | FieldKind::Float | FieldKind::Boolean => {
                Ok(Vec::new())
            }
        }
    }

    fn model(&self, model: &str) -> Result<&ModelSchema, StorageError> {
        self.schema.model(model).ok_or_else(|| StorageError::UnknownModel {
            model: model.to_string(),
        })
    }

    fn table(&self, model: &str) -> Result<&Table, StorageError> {
        self.tables.get(model).ok_or_else(|| StorageError::UnknownModel {
            model: model.to_string(),
        })
    }

    fn table_mut(&mut self, model: &str) -> Result<&mut Table, StorageError> {
        self.tables
            .get_mut(model)
            .ok_or_else(|| StorageError::UnknownModel {
                model: model.to_string(),
            })
    }

    /// Field names must be stored, editable fields; link ids must exist.
    fn check_fields(
        &self,
        model: &str,
        id: Option<i64>,
        fields: &BTreeMap<String, Value>,
    ) -> Result<(), StorageError> {
        let schema = self.model(model)?;
        for (name, value) in fields {
            let field = schema
                .get_field(name)
                .ok_or_else(|| unknown_keyword(schema, name))?;
            if name == "id" || !field.kind.is_stored() {
                return Err(StorageError::Invalid(format!(
                    "'{name}' on {model} cannot be assigned"
                )));
            }
            match &field.kind {
                FieldKind::ForeignKey { to, .. } => self.check_link(to, value)?,
                FieldKind::OneToOne { to, .. } => {
                    self.check_link(to, value)?;
                    if let Some(target) = value.as_link_id() {
                        let taken = self.table(model)?.values().any(|row| {
                            Some(row.id) != id && row.get(name).as_link_id() == Some(target)
                        });
                        if taken {
                            return Err(StorageError::Invalid(format!(
                                "{to} #{target} is already linked through {model}.{name}"
                            )));
                        }
                    }
                }
                FieldKind::ManyToMany { to } => {
                    for target in value.link_ids() {
                        self.check_link(to, &Value::Int(target))?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_link(&self, to: &str, value: &Value) -> Result<(), StorageError> {
        match value {
            Value::Null => Ok(()),
            Value::Int(target) => self.get(to, *target).map(|_| ()),
            other => Err(StorageError::Invalid(format!(
                "link to {to} must be an id, got {other:?}"
            ))),
        }
    }
}

impl OrderCompiler for MemoryStore {
    /// Every key must walk single-valued relations and end on a stored field.
    fn compile_order(&self, model: &str, keys: &[OrderKey]) -> Result<(), StorageError> {
        for key in keys {
            let mut current = self.model(model)?;
            for (head, rest) in segments(&key.field) {
                let field = match current.lookup(head) {
                    Some(Member::Field(field)) => field,
                    _ => return Err(unknown_keyword(current, head)),
                };
                match (field.kind.related_model(), rest) {
                    (Some(_), _) if field.kind.is_many() => {
                        return Err(StorageError::Field(format!(
                            "Cannot order by '{}': '{head}' is a multi-valued relation",
                            key.field
                        )));
                    }
                    (Some(related), Some(_)) => current = self.model(related)?,
                    (Some(_), None) | (None, None) => {}
                    (None, Some(rest)) => {
                        return Err(StorageError::Field(format!(
                            "Unsupported lookup '{rest}' for field '{head}' on {}",
                            current.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// A query against one model.
#[derive(Debug, Clone, Default)]
pub struct QuerySet {
    pub model: String,
    pub search: Option<SearchPredicate>,
    pub distinct: bool,
    pub order: Vec<OrderKey>,
}

impl QuerySet {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Self::default()
        }
    }
}

fn compare_keys(order: &[OrderKey], left: &[Value], right: &[Value]) -> Ordering {
    for ((key, left), right) in order.iter().zip(left).zip(right) {
        let ord = match key.direction {
            Direction::Asc => left.sort_cmp(right),
            Direction::Desc => right.sort_cmp(left),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn not_found(model: &str, id: i64) -> StorageError {
    StorageError::NotFound {
        model: model.to_string(),
        id,
    }
}

fn unknown_keyword(model: &ModelSchema, name: &str) -> StorageError {
    let choices: Vec<&str> = model
        .fields
        .iter()
        .map(|field| field.name.as_str())
        .collect();
    StorageError::Field(format!(
        "Cannot resolve keyword '{name}' into field. Choices are: {}",
        choices.join(", ")
    ))
}

/// A row of the store seen through the [`Record`] interface.
#[derive(Debug, Clone, Copy)]
pub struct StoredRecord<'a> {
    store: &'a MemoryStore,
    model: &'a ModelSchema,
    row: &'a Row,
}

impl<'a> StoredRecord<'a> {
    pub fn id(&self) -> i64 {
        self.row.id
    }

    pub fn row(&self) -> &'a Row {
        self.row
    }

    pub fn model(&self) -> &'a ModelSchema {
        self.model
    }

    fn field(&self, name: &str) -> Result<&'a FieldDef, StorageError> {
        self.model
            .get_field(name)
            .ok_or_else(|| unknown_keyword(self.model, name))
    }

    fn lookup_error(&self, name: &str, err: StorageError) -> ResolveError {
        match err {
            StorageError::NotFound { model, id } => ResolveError::RecordNotFound { model, id },
            other => ResolveError::NoSuchField {
                record: self.label(),
                attribute: format!("{name} ({other})"),
            },
        }
    }
}

impl Record for StoredRecord<'_> {
    fn label(&self) -> String {
        format!("{} #{}", self.model.name, self.row.id)
    }

    fn member(&self, name: &str) -> Option<MemberKind> {
        self.model.lookup(name).map(|member| match member {
            Member::Field(_) => MemberKind::Field,
            Member::Constant(_) => MemberKind::Constant,
            Member::Method(method) => MemberKind::Method {
                required_args: method
                    .params
                    .iter()
                    .filter(|param| !param.has_default)
                    .count(),
            },
        })
    }

    fn get(&self, name: &str) -> Result<Resolved<Self>, ResolveError> {
        let field = match self.model.lookup(name) {
            Some(Member::Field(field)) => field,
            Some(Member::Constant(value)) => return Ok(Resolved::Value(value.clone())),
            Some(Member::Method(_)) => return self.call(name),
            None => {
                return Err(ResolveError::NoSuchField {
                    record: self.label(),
                    attribute: name.to_string(),
                });
            }
        };
        if !field.kind.is_relation() {
            return Ok(Resolved::Value(self.row.get(name)));
        }
        let related = self
            .store
            .related(self, field)
            .map_err(|err| self.lookup_error(name, err))?;
        if field.kind.is_many() {
            return Ok(Resolved::Many(related));
        }
        Ok(related
            .into_iter()
            .next()
            .map(Resolved::Record)
            .unwrap_or_else(Resolved::null))
    }

    fn call(&self, name: &str) -> Result<Resolved<Self>, ResolveError> {
        let method = self
            .model
            .get_method(name)
            .ok_or_else(|| ResolveError::NoSuchField {
                record: self.label(),
                attribute: name.to_string(),
            })?;
        (method.body)(self.row)
            .map(Resolved::Value)
            .map_err(|reason| ResolveError::Method {
                record: self.label(),
                method: name.to_string(),
                reason,
            })
    }

    fn display(&self) -> Result<String, ResolveError> {
        if self.model.get_method("__str__").is_some() {
            return self.call("__str__")?.display();
        }
        Ok(format!("{} object ({})", self.model.name, self.row.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::search::SearchFields;
    use crate::test_support::{fields, seeded_store, test_schema};

    fn names(records: &[StoredRecord<'_>]) -> Vec<String> {
        records
            .iter()
            .map(|record| record.row().get("name").to_string())
            .collect()
    }

    fn people() -> MemoryStore {
        let schema = test_schema();
        let mut store = seeded_store(&schema);
        let other = store
            .insert("BreadTestModel2", fields(&[("text", "Zebra".into())]))
            .expect("other");
        for (name, age) in [("Joe", 30_i64), ("Ann", 30), ("Bob", 25)] {
            store
                .insert(
                    "BreadTestModel",
                    fields(&[
                        ("name", name.into()),
                        ("age", age.into()),
                        ("other", other.into()),
                    ]),
                )
                .expect("insert");
        }
        store
    }

    #[test]
    fn ids_are_sequential_and_never_reused() {
        let mut store = people();
        let last = store.count("BreadTestModel").expect("count") as i64;
        store.delete("BreadTestModel", last).expect("delete");
        let id = store
            .insert("BreadTestModel", fields(&[("name", "Eve".into())]))
            .expect("insert");
        assert_eq!(id, last + 1);
    }

    #[test]
    fn delete_cascades_through_single_valued_links() {
        let mut store = people();
        store.delete("BreadTestModel2", 1).expect("delete");
        let remaining = store.execute(&QuerySet::new("BreadTestModel")).expect("execute");
        assert_eq!(names(&remaining), ["Joe", "Ann", "Bob"]);

        store.delete("BreadLabelValueTestModel", 1).expect("delete");
        assert_eq!(store.count("BreadTestModel2").expect("count"), 1);

        let mut store = people();
        store.delete("BreadLabelValueTestModel", 1).expect("delete");
        assert!(store.get("BreadTestModel2", 1).is_err());
        assert_eq!(store.count("BreadTestModel").expect("count"), 3);
        assert_eq!(store.count("BreadTestModel2").expect("count"), 1);
    }

    #[test]
    fn insert_rejects_missing_link_targets_and_unknown_fields() {
        let mut store = seeded_store(&test_schema());
        let err = store
            .insert("BreadTestModel", fields(&[("other", 99_i64.into())]))
            .expect_err("dangling");
        assert_eq!(
            err,
            StorageError::NotFound {
                model: "BreadTestModel2".into(),
                id: 99
            }
        );
        let err = store
            .insert("BreadTestModel", fields(&[("petunias", 1_i64.into())]))
            .expect_err("unknown");
        assert!(matches!(err, StorageError::Field(_)));
    }

    #[test]
    fn one_to_one_targets_are_unique() {
        let mut store = seeded_store(&test_schema());
        let err = store
            .insert("BreadTestModel2", fields(&[("label_model", 1_i64.into())]))
            .expect_err("taken");
        assert!(matches!(err, StorageError::Invalid(_)));
        store
            .update("BreadTestModel2", 1, fields(&[("label_model", 1_i64.into())]))
            .expect("same row may keep its link");
    }

    #[test]
    fn execute_orders_by_keys_then_id() {
        let store = people();
        let mut query = QuerySet::new("BreadTestModel");
        query.order = vec![OrderKey::desc("age"), OrderKey::asc("name")];
        let records = store.execute(&query).expect("execute");
        assert_eq!(names(&records), ["Rudy Vallee", "Ann", "Joe", "Bob"]);

        let unordered = store.execute(&QuerySet::new("BreadTestModel")).expect("execute");
        assert_eq!(names(&unordered), ["Rudy Vallee", "Joe", "Ann", "Bob"]);
    }

    #[test]
    fn execute_orders_through_links() {
        let store = people();
        let mut query = QuerySet::new("BreadTestModel");
        query.order = vec![OrderKey::desc("other__text"), OrderKey::asc("name")];
        let records = store.execute(&query).expect("execute");
        assert_eq!(names(&records), ["Ann", "Bob", "Joe", "Rudy Vallee"]);
    }

    #[test]
    fn compile_rejects_methods_and_many_relations() {
        let store = people();
        for field in ["get_name", "other__get_text", "name__text", "petunias"] {
            let err = store
                .compile_order("BreadTestModel", &[OrderKey::asc(field)])
                .expect_err(field);
            assert!(matches!(err, StorageError::Field(_)), "{field}");
        }
        let err = store
            .compile_order("BreadTestModel2", &[OrderKey::asc("breadtestmodel_set__name")])
            .expect_err("many");
        assert!(err.to_string().contains("multi-valued"));
        store
            .compile_order("BreadTestModel", &[OrderKey::asc("other"), OrderKey::desc("id")])
            .expect("link terminal");
    }

    #[test]
    fn search_filters_through_relations() {
        let store = people();
        let schema = store.schema();
        let declared = vec!["name".to_string(), "other__text".to_string()];
        let search = SearchFields::compile(schema, "BreadTestModel", &declared).expect("search");

        let mut query = QuerySet::new("BreadTestModel");
        query.search = search.build("zeb").predicate;
        assert_eq!(names(&store.execute(&query).expect("execute")), ["Joe", "Ann", "Bob"]);

        query.search = search.build("rhino rudy").predicate;
        assert_eq!(names(&store.execute(&query).expect("execute")), ["Rudy Vallee"]);
    }

    #[test]
    fn many_relation_search_matches_each_row_once() {
        let store = people();
        let declared = vec!["breadtestmodel_set__name".to_string()];
        let search =
            SearchFields::compile(store.schema(), "BreadTestModel2", &declared).expect("search");
        let plan = search.build("o");
        let query = QuerySet {
            model: "BreadTestModel2".into(),
            search: plan.predicate,
            distinct: plan.distinct,
            order: Vec::new(),
        };
        let records = store.execute(&query).expect("execute");
        let ids: Vec<i64> = records.iter().map(StoredRecord::id).collect();
        assert_eq!(ids, [2]);
    }

    #[test]
    fn reverse_relations_resolve() {
        let store = people();
        let zebra = store.get("BreadTestModel2", 2).expect("record");
        match zebra.get("breadtestmodel_set").expect("reverse fk") {
            Resolved::Many(records) => assert_eq!(records.len(), 3),
            other => panic!("expected many, got {other:?}"),
        }
        let rudy = store.get("BreadTestModel", 1).expect("record");
        assert_eq!(rudy.display().expect("display"), "Rudy Vallee");
        let zebra_text = zebra.display().expect("display");
        assert_eq!(zebra_text, "BreadTestModel2 object (2)");
    }
}
