//! Test-only fixtures: the demo schema, a seeded store, and temp site files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::core::record::Row;
use crate::core::schema::{FieldDef, FieldKind, MethodDef, ModelSchema, Schema};
use crate::core::value::Value;
use crate::store::MemoryStore;

pub const APP_LABEL: &str = "tests";

fn text_of(field: &'static str) -> impl Fn(&Row) -> Result<Value, String> {
    move |row| Ok(row.get(field))
}

/// Three linked models:
///
/// ```text
/// BreadTestModel --other--> BreadTestModel2 --label_model--> BreadLabelValueTestModel
///                (fk)                        (one-to-one, reverse name `model2`)
/// ```
pub fn test_schema() -> Arc<Schema> {
    let label_value = ModelSchema::new(APP_LABEL, "BreadLabelValueTestModel")
        .field(FieldDef::text("name", 10))
        .field(
            FieldDef::new("banana", FieldKind::Integer)
                .with_verbose_name("a yellow fruit")
                .optional(),
        )
        .method(MethodDef::new("name_reversed", |row| {
            Ok(Value::Text(row.get("name").to_string().chars().rev().collect()))
        }));

    let model2 = ModelSchema::new(APP_LABEL, "BreadTestModel2")
        .field(FieldDef::text("text", 20))
        .field(FieldDef::one_to_one(
            "label_model",
            "BreadLabelValueTestModel",
            Some("model2"),
        ))
        .method(MethodDef::new("get_text", text_of("text")));

    let model = ModelSchema::new(APP_LABEL, "BreadTestModel")
        .field(FieldDef::text("name", 10))
        .field(FieldDef::foreign_key("other", "BreadTestModel2"))
        .field(FieldDef::new("age", FieldKind::Integer).optional())
        .method(MethodDef::new("get_name", text_of("name")))
        .method(MethodDef::new("__str__", text_of("name")))
        .method(MethodDef::new("method1", |_| Ok(Value::Null)).with_param("arg", false))
        .method(MethodDef::new("method2", |_| Ok(Value::Null)).with_param("arg", true))
        .ordering(["name"])
        .permission("read_breadtestmodel")
        .permission("browse_breadtestmodel");

    match Schema::from_models(vec![label_value, model2, model]) {
        Ok(schema) => Arc::new(schema),
        Err(err) => panic!("test schema is invalid: {err}"),
    }
}

/// Field map from `(name, value)` pairs.
pub fn fields(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Store holding one row per model, each linked to the next:
/// `Rudy Vallee` -> `Rhinocerous` -> `Species`, all with id 1.
pub fn seeded_store(schema: &Arc<Schema>) -> MemoryStore {
    let mut store = MemoryStore::new(Arc::clone(schema));
    let seeds = [
        (
            "BreadLabelValueTestModel",
            fields(&[("name", "Species".into()), ("banana", 0_i64.into())]),
        ),
        (
            "BreadTestModel2",
            fields(&[("text", "Rhinocerous".into()), ("label_model", 1_i64.into())]),
        ),
        (
            "BreadTestModel",
            fields(&[
                ("name", "Rudy Vallee".into()),
                ("other", 1_i64.into()),
                ("age", 72_i64.into()),
            ]),
        ),
    ];
    for (model, row) in seeds {
        if let Err(err) = store.insert(model, row) {
            panic!("seed {model}: {err}");
        }
    }
    store
}

/// Site configuration matching [`test_schema`], in TOML form.
pub const SITE_TOML: &str = r#"
[site]
base_template = "bread/base.html"
login_url = "/login/"

[[models]]
name = "BreadLabelValueTestModel"
app_label = "tests"
fields = [
    { name = "name", kind = "text", max_length = 10 },
    { name = "banana", kind = "integer", verbose_name = "a yellow fruit", required = false },
]
methods = [{ name = "name_reversed", expr = "name | reverse" }]

[[models]]
name = "BreadTestModel2"
app_label = "tests"
fields = [
    { name = "text", kind = "text", max_length = 20 },
    { name = "label_model", kind = "one_to_one", to = "BreadLabelValueTestModel", related_name = "model2" },
]
methods = [{ name = "get_text", expr = "text" }]

[[models]]
name = "BreadTestModel"
app_label = "tests"
ordering = ["name"]
permissions = ["browse_breadtestmodel", "read_breadtestmodel"]
fields = [
    { name = "name", kind = "text", max_length = 10 },
    { name = "other", kind = "foreign_key", to = "BreadTestModel2" },
    { name = "age", kind = "integer", required = false },
]
methods = [
    { name = "get_name", expr = "name" },
    { name = "__str__", expr = "name" },
    { name = "method1", expr = "none", params = [{ name = "arg" }] },
]

[[breads]]
model = "BreadTestModel"
plural_name = "testmodels"
paginate_by = 2
search_fields = ["name", "other__text"]
columns = [
    { label = "Name", field = "name" },
    { label = "Text", field = "other__text" },
    { label = "Method", field = "other__get_text", sort = false },
]

[[records]]
model = "BreadLabelValueTestModel"
values = { name = "Species", banana = 0 }

[[records]]
model = "BreadTestModel2"
values = { text = "Rhinocerous", label_model = 1 }

[[records]]
model = "BreadTestModel"
values = { name = "Rudy Vallee", other = 1, age = 72 }

[[records]]
model = "BreadTestModel"
values = { name = "Joe", age = 30 }

[[records]]
model = "BreadTestModel"
values = { name = "Ann", other = 1, age = 25 }

[[users]]
name = "joe"
permissions = ["tests.browse_breadtestmodel", "tests.view_breadtestmodel"]
"#;

/// A site file written into a temporary directory.
pub struct TempSite {
    dir: TempDir,
    path: PathBuf,
}

impl TempSite {
    pub fn new(contents: &str) -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        let path = dir.path().join("bread.toml");
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(Self { dir, path })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
