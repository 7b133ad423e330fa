//! Site configuration stored in a TOML file (default `bread.toml`).
//!
//! The file declares models, the breads built on them, seed records and the
//! users known to the demo server. It is read once at startup.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use minijinja::Environment;
use serde::Deserialize;

use crate::access::User;
use crate::core::columns::Column;
use crate::core::record::Row;
use crate::core::schema::{FieldDef, FieldKind, MethodDef, ModelSchema, Schema};
use crate::core::value::Value;
use crate::read::{LabelValue, ReadMode};
use crate::scaffold::BreadConfig;

pub const DEFAULT_CONFIG_PATH: &str = "bread.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SiteConfig {
    pub site: SiteSettings,
    pub models: Vec<ModelConfig>,
    pub breads: Vec<BreadEntry>,
    pub records: Vec<RecordConfig>,
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SiteSettings {
    /// Template the generic bread templates extend.
    pub base_template: String,
    pub login_url: String,
    /// Site-wide default for breads that set none.
    pub template_name_pattern: Option<String>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            base_template: "bread/base.html".to_string(),
            login_url: "/login/".to_string(),
            template_name_pattern: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub app_label: String,
    #[serde(default)]
    pub verbose_name: Option<String>,
    #[serde(default)]
    pub verbose_name_plural: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub methods: Vec<MethodConfig>,
    #[serde(default)]
    pub constants: BTreeMap<String, Value>,
    #[serde(default)]
    pub ordering: Vec<String>,
    /// Codenames beyond `add`, `change`, `delete` and `view`.
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKindConfig {
    Text,
    Integer,
    Float,
    Boolean,
    ForeignKey,
    OneToOne,
    ManyToMany,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub kind: FieldKindConfig,
    /// Target model of a relation.
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub related_name: Option<String>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub verbose_name: Option<String>,
    /// Defaults to true for scalars and false for relations.
    #[serde(default)]
    pub required: Option<bool>,
}

/// A method whose body is a minijinja expression over the row's fields.
#[derive(Debug, Clone, Deserialize)]
pub struct MethodConfig {
    pub name: String,
    pub expr: String,
    #[serde(default)]
    pub params: Vec<ParamConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParamConfig {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreadEntry {
    pub model: String,
    #[serde(default)]
    pub plural_name: Option<String>,
    #[serde(default = "default_views")]
    pub views: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub base_template: Option<String>,
    #[serde(default)]
    pub template_name_pattern: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub search_fields: Vec<String>,
    #[serde(default)]
    pub paginate_by: Option<usize>,
    #[serde(default)]
    pub ordering: Option<Vec<String>>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Switches the read view to label/value mode.
    #[serde(default)]
    pub read_fields: Option<Vec<ReadFieldConfig>>,
}

fn default_views() -> String {
    "BREAD".to_string()
}

/// One label/value read entry: `attr` names a member, `value` is a literal.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadFieldConfig {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub attr: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordConfig {
    pub model: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl SiteConfig {
    pub fn validate(&self) -> Result<()> {
        if self.site.login_url.trim().is_empty() {
            return Err(anyhow!("site.login_url must be non-empty"));
        }
        let mut plurals = Vec::new();
        for bread in &self.breads {
            if bread.paginate_by == Some(0) {
                bail!("bread for {}: paginate_by must be > 0", bread.model);
            }
            let plural = bread
                .plural_name
                .clone()
                .unwrap_or_else(|| format!("{}s", bread.model.to_lowercase()));
            if plurals.contains(&plural) {
                bail!("plural name '{plural}' is used by more than one bread");
            }
            plurals.push(plural);
            for entry in bread.read_fields.iter().flatten() {
                if entry.attr.is_some() == entry.value.is_some() {
                    bail!(
                        "bread for {}: each read field needs exactly one of `attr` or `value`",
                        bread.model
                    );
                }
            }
        }
        for model in &self.models {
            for field in &model.fields {
                let is_relation = matches!(
                    field.kind,
                    FieldKindConfig::ForeignKey
                        | FieldKindConfig::OneToOne
                        | FieldKindConfig::ManyToMany
                );
                if is_relation != field.to.is_some() {
                    bail!(
                        "{}.{}: `to` is required for relations and only allowed on them",
                        model.name,
                        field.name
                    );
                }
            }
        }
        Ok(())
    }

    /// Build the model registry, compiling method expressions.
    pub fn schema(&self) -> Result<Schema> {
        let mut models = Vec::with_capacity(self.models.len());
        for model in &self.models {
            models.push(model_schema(model).with_context(|| format!("model {}", model.name))?);
        }
        Schema::from_models(models).context("build schema")
    }

    /// Per-bread settings with site defaults filled in.
    pub fn bread_configs(&self) -> Vec<BreadConfig> {
        self.breads
            .iter()
            .map(|entry| BreadConfig {
                model: entry.model.clone(),
                plural_name: entry.plural_name.clone(),
                views: entry.views.clone(),
                namespace: entry.namespace.clone(),
                base_template: entry
                    .base_template
                    .clone()
                    .unwrap_or_else(|| self.site.base_template.clone()),
                template_name_pattern: entry
                    .template_name_pattern
                    .clone()
                    .or_else(|| self.site.template_name_pattern.clone()),
                columns: entry.columns.clone(),
                search_fields: entry.search_fields.clone(),
                paginate_by: entry.paginate_by,
                ordering: entry.ordering.clone(),
                exclude: entry.exclude.clone(),
                read: match &entry.read_fields {
                    Some(fields) => ReadMode::LabelValue(fields.iter().map(read_entry).collect()),
                    None => ReadMode::Fields,
                },
            })
            .collect()
    }
}

fn read_entry(config: &ReadFieldConfig) -> LabelValue {
    let evaluator = match (&config.attr, &config.value) {
        (Some(attr), _) => crate::read::Evaluator::Attr(attr.clone()),
        (None, value) => crate::read::Evaluator::Literal(value.clone().unwrap_or_default()),
    };
    LabelValue {
        label: config.label.clone(),
        evaluator,
    }
}

fn model_schema(config: &ModelConfig) -> Result<ModelSchema> {
    let mut model = ModelSchema::new(&config.app_label, &config.name)
        .ordering(config.ordering.iter().cloned());
    model.verbose_name = config.verbose_name.clone();
    model.verbose_name_plural = config.verbose_name_plural.clone();
    for field in &config.fields {
        model = model.field(field_def(field)?);
    }
    for method in &config.methods {
        model = model.method(method_def(method)?);
    }
    for (name, value) in &config.constants {
        model = model.constant(name, value.clone());
    }
    for codename in &config.permissions {
        model = model.permission(codename);
    }
    Ok(model)
}

fn field_def(config: &FieldConfig) -> Result<FieldDef> {
    let target = || {
        config
            .to
            .clone()
            .with_context(|| format!("field {} needs `to`", config.name))
    };
    let kind = match config.kind {
        FieldKindConfig::Text => FieldKind::Text,
        FieldKindConfig::Integer => FieldKind::Integer,
        FieldKindConfig::Float => FieldKind::Float,
        FieldKindConfig::Boolean => FieldKind::Boolean,
        FieldKindConfig::ForeignKey => FieldKind::ForeignKey {
            to: target()?,
            related_name: config.related_name.clone(),
        },
        FieldKindConfig::OneToOne => FieldKind::OneToOne {
            to: target()?,
            related_name: config.related_name.clone(),
        },
        FieldKindConfig::ManyToMany => FieldKind::ManyToMany { to: target()? },
    };
    let mut field = FieldDef::new(&config.name, kind);
    field.max_length = config.max_length;
    field.verbose_name = config.verbose_name.clone();
    if let Some(required) = config.required {
        field.required = required;
    }
    Ok(field)
}

/// Compile once to reject syntax errors early; evaluation recompiles per call.
fn method_def(config: &MethodConfig) -> Result<MethodDef> {
    Environment::new()
        .compile_expression(&config.expr)
        .with_context(|| format!("method {}: bad expression {:?}", config.name, config.expr))?;
    let expr = config.expr.clone();
    let mut method = MethodDef::new(&config.name, move |row: &Row| eval_expression(&expr, row));
    for param in &config.params {
        method = method.with_param(&param.name, param.optional);
    }
    Ok(method)
}

fn eval_expression(expr: &str, row: &Row) -> Result<Value, String> {
    let mut context = row.fields.clone();
    context.insert("id".to_string(), Value::Int(row.id));
    let env = Environment::new();
    let result = env
        .compile_expression(expr)
        .and_then(|compiled| compiled.eval(&context))
        .map_err(|err| err.to_string())?;
    if result.is_undefined() || result.is_none() {
        return Ok(Value::Null);
    }
    let json = serde_json::to_value(&result).map_err(|err| err.to_string())?;
    serde_json::from_value(json).map_err(|err| err.to_string())
}

/// Load and validate a site file. A missing file is an error.
pub fn load_config(path: &Path) -> Result<SiteConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SiteConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
