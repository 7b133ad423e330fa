//! Type-level reflection over models: fields, methods, constants.
//!
//! [`ModelSchema::lookup`] is the capability check used by the validator and
//! the storage layer. It returns a typed [`Member`] instead of probing for
//! attributes at runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::record::Row;
use crate::core::value::Value;
use crate::error::ValidationError;

/// Permission actions every model defines without declaring them.
pub const DEFAULT_PERMISSION_ACTIONS: [&str; 4] = ["add", "change", "delete", "view"];

/// Storage kind of a model field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
    /// Single-valued link stored on this model.
    ForeignKey {
        to: String,
        related_name: Option<String>,
    },
    /// Single-valued link stored on this model, unique per target.
    OneToOne {
        to: String,
        related_name: Option<String>,
    },
    /// Multi-valued link stored on this model as a list of ids.
    ManyToMany { to: String },
    /// Reverse side of a one-to-one link declared on `from`.
    ReverseOneToOne { from: String, field: String },
    /// Reverse side of a foreign key declared on `from` (one-to-many).
    ReverseForeignKey { from: String, field: String },
}

impl FieldKind {
    /// The model this field links to, if it is a relation.
    pub fn related_model(&self) -> Option<&str> {
        match self {
            FieldKind::ForeignKey { to, .. }
            | FieldKind::OneToOne { to, .. }
            | FieldKind::ManyToMany { to } => Some(to),
            FieldKind::ReverseOneToOne { from, .. } | FieldKind::ReverseForeignKey { from, .. } => {
                Some(from)
            }
            FieldKind::Text | FieldKind::Integer | FieldKind::Float | FieldKind::Boolean => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        self.related_model().is_some()
    }

    /// True when following this relation can yield more than one record.
    pub fn is_many(&self) -> bool {
        matches!(
            self,
            FieldKind::ManyToMany { .. } | FieldKind::ReverseForeignKey { .. }
        )
    }

    /// True when the value lives in this model's rows.
    pub fn is_stored(&self) -> bool {
        !matches!(
            self,
            FieldKind::ReverseOneToOne { .. } | FieldKind::ReverseForeignKey { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub verbose_name: Option<String>,
    pub kind: FieldKind,
    pub max_length: Option<usize>,
    /// Whether a form must supply a value.
    pub required: bool,
    pub editable: bool,
}

impl FieldDef {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        let required = !kind.is_relation();
        Self {
            name: name.to_string(),
            verbose_name: None,
            kind,
            max_length: None,
            required,
            editable: true,
        }
    }

    pub fn text(name: &str, max_length: usize) -> Self {
        Self {
            max_length: Some(max_length),
            ..Self::new(name, FieldKind::Text)
        }
    }

    pub fn foreign_key(name: &str, to: &str) -> Self {
        Self::new(
            name,
            FieldKind::ForeignKey {
                to: to.to_string(),
                related_name: None,
            },
        )
    }

    pub fn one_to_one(name: &str, to: &str, related_name: Option<&str>) -> Self {
        Self::new(
            name,
            FieldKind::OneToOne {
                to: to.to_string(),
                related_name: related_name.map(str::to_string),
            },
        )
    }

    pub fn with_verbose_name(mut self, verbose_name: &str) -> Self {
        self.verbose_name = Some(verbose_name.to_string());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn auto_id() -> Self {
        Self {
            editable: false,
            required: false,
            ..Self::new("id", FieldKind::Integer)
        }
    }
}

/// A method parameter (`self` excluded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub has_default: bool,
}

/// Method body evaluated against a stored row.
pub type MethodFn = Arc<dyn Fn(&Row) -> Result<Value, String> + Send + Sync>;

#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: MethodFn,
}

impl MethodDef {
    pub fn new(
        name: &str,
        body: impl Fn(&Row) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            body: Arc::new(body),
        }
    }

    pub fn with_param(mut self, name: &str, has_default: bool) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            has_default,
        });
        self
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// True if the method has any parameter without a default.
pub fn has_required_args(method: &MethodDef) -> bool {
    method.params.iter().any(|param| !param.has_default)
}

/// What a name refers to on a model.
#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
    Field(&'a FieldDef),
    Method(&'a MethodDef),
    Constant(&'a Value),
}

#[derive(Debug, Clone)]
pub struct ModelSchema {
    pub name: String,
    pub app_label: String,
    pub verbose_name: Option<String>,
    pub verbose_name_plural: Option<String>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    pub constants: BTreeMap<String, Value>,
    /// Default ordering (`name`, `-age`).
    pub ordering: Vec<String>,
    /// Permission codenames beyond the defaults (e.g. `browse_item`).
    pub permissions: Vec<String>,
}

impl ModelSchema {
    /// New model with an implicit integer `id` field.
    pub fn new(app_label: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            app_label: app_label.to_string(),
            verbose_name: None,
            verbose_name_plural: None,
            fields: vec![FieldDef::auto_id()],
            methods: Vec::new(),
            constants: BTreeMap::new(),
            ordering: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn constant(mut self, name: &str, value: Value) -> Self {
        self.constants.insert(name.to_string(), value);
        self
    }

    pub fn ordering<I, S>(mut self, ordering: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ordering = ordering.into_iter().map(Into::into).collect();
        self
    }

    pub fn permission(mut self, codename: &str) -> Self {
        self.permissions.push(codename.to_string());
        self
    }

    /// Lower-cased model name used in URL names and permission codenames.
    pub fn model_name(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn lookup(&self, name: &str) -> Option<Member<'_>> {
        if let Some(field) = self.fields.iter().find(|field| field.name == name) {
            return Some(Member::Field(field));
        }
        if let Some(method) = self.methods.iter().find(|method| method.name == name) {
            return Some(Member::Method(method));
        }
        self.constants.get(name).map(Member::Constant)
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn get_method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// Human-readable singular name; defaults to the split, lower-cased model name.
    pub fn verbose_name(&self) -> String {
        self.verbose_name
            .clone()
            .unwrap_or_else(|| split_camel_case(&self.name))
    }

    pub fn verbose_name_plural(&self) -> String {
        self.verbose_name_plural
            .clone()
            .unwrap_or_else(|| format!("{}s", self.verbose_name()))
    }

    /// True when `codename` is a default or declared permission.
    pub fn has_permission(&self, codename: &str) -> bool {
        let model_name = self.model_name();
        DEFAULT_PERMISSION_ACTIONS
            .iter()
            .any(|action| format!("{action}_{model_name}") == codename)
            || self.permissions.iter().any(|perm| perm == codename)
    }
}

/// Verbose name of a field, optionally title-cased.
pub fn verbose_name(
    model: &ModelSchema,
    field: &str,
    title_cap: bool,
) -> Result<String, ValidationError> {
    let field = model
        .get_field(field)
        .ok_or_else(|| ValidationError::NoSuchField {
            model: model.name.clone(),
            name: field.to_string(),
        })?;
    let name = field
        .verbose_name
        .clone()
        .unwrap_or_else(|| field.name.replace('_', " "));
    Ok(if title_cap { title_case(&name) } else { name })
}

/// Upper-case the first letter of every word and lower-case the rest.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut at_word_start = true;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

fn split_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (idx, ch) in name.chars().enumerate() {
        if ch.is_uppercase() && idx > 0 {
            out.push(' ');
        }
        out.extend(ch.to_lowercase());
    }
    out
}

/// Registry of models, with reverse relations filled in.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: BTreeMap<String, ModelSchema>,
}

impl Schema {
    /// Build a registry, checking link targets and adding reverse relations.
    ///
    /// A foreign key adds `<related_name>` (default `<model>_set`) to its
    /// target; a one-to-one adds `<related_name>` (default `<model>`).
    pub fn from_models(models: Vec<ModelSchema>) -> Result<Self, ValidationError> {
        let mut registry = BTreeMap::new();
        for model in models {
            let name = model.name.clone();
            if registry.insert(name.clone(), model).is_some() {
                return Err(ValidationError::Invalid(format!(
                    "model '{name}' is defined twice"
                )));
            }
        }

        let mut reverse = Vec::new();
        for model in registry.values() {
            for field in &model.fields {
                let Some(target) = field.kind.related_model() else {
                    continue;
                };
                if !registry.contains_key(target) {
                    return Err(ValidationError::UnknownModel {
                        model: target.to_string(),
                    });
                }
                let lowered = model.model_name();
                let reverse_field = match &field.kind {
                    FieldKind::ForeignKey { to, related_name } => Some((
                        to.clone(),
                        related_name
                            .clone()
                            .unwrap_or_else(|| format!("{lowered}_set")),
                        FieldKind::ReverseForeignKey {
                            from: model.name.clone(),
                            field: field.name.clone(),
                        },
                    )),
                    FieldKind::OneToOne { to, related_name } => Some((
                        to.clone(),
                        related_name.clone().unwrap_or_else(|| lowered.clone()),
                        FieldKind::ReverseOneToOne {
                            from: model.name.clone(),
                            field: field.name.clone(),
                        },
                    )),
                    _ => None,
                };
                reverse.extend(reverse_field);
            }
        }

        for (target, name, kind) in reverse {
            let Some(model) = registry.get_mut(&target) else {
                continue;
            };
            if model.lookup(&name).is_some() {
                return Err(ValidationError::Invalid(format!(
                    "reverse relation '{name}' clashes with an existing member of '{target}'"
                )));
            }
            let mut field = FieldDef::new(&name, kind);
            field.required = false;
            field.editable = false;
            model.fields.push(field);
        }

        Ok(Self { models: registry })
    }

    pub fn model(&self, name: &str) -> Option<&ModelSchema> {
        self.models.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&ModelSchema, ValidationError> {
        self.model(name).ok_or_else(|| ValidationError::UnknownModel {
            model: name.to_string(),
        })
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelSchema> {
        self.models.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_schema;

    #[test]
    fn has_required_args_ignores_defaulted_params() {
        let none = MethodDef::new("f", |_| Ok(Value::Null));
        assert!(!has_required_args(&none));
        let optional = MethodDef::new("f", |_| Ok(Value::Null)).with_param("foo", true);
        assert!(!has_required_args(&optional));
        let required = MethodDef::new("f", |_| Ok(Value::Null)).with_param("foo", false);
        assert!(has_required_args(&required));
        let mixed = MethodDef::new("f", |_| Ok(Value::Null))
            .with_param("foo", false)
            .with_param("bar", true);
        assert!(has_required_args(&mixed));
    }

    #[test]
    fn reverse_relations_are_added_to_targets() {
        let schema = test_schema();
        let label = schema.model("BreadLabelValueTestModel").expect("model");
        let field = label.get_field("model2").expect("reverse one-to-one");
        assert!(matches!(field.kind, FieldKind::ReverseOneToOne { .. }));

        let other = schema.model("BreadTestModel2").expect("model");
        let field = other.get_field("breadtestmodel_set").expect("reverse fk");
        assert!(field.kind.is_many());
    }

    #[test]
    fn unknown_link_target_is_rejected() {
        let model = ModelSchema::new("app", "A").field(FieldDef::foreign_key("b", "Missing"));
        let err = Schema::from_models(vec![model]).expect_err("unknown target");
        assert_eq!(
            err,
            ValidationError::UnknownModel {
                model: "Missing".into()
            }
        );
    }

    #[test]
    fn verbose_names_default_from_identifiers() {
        let schema = test_schema();
        let model = schema.model("BreadLabelValueTestModel").expect("model");
        assert_eq!(verbose_name(model, "banana", true).expect("field"), "A Yellow Fruit");
        assert_eq!(verbose_name(model, "banana", false).expect("field"), "a yellow fruit");
        assert_eq!(verbose_name(model, "id", true).expect("field"), "Id");
        assert!(verbose_name(model, "kjasfhkjdh", true).is_err());
        assert_eq!(model.verbose_name(), "bread label value test model");
    }

    #[test]
    fn default_and_declared_permissions() {
        let schema = test_schema();
        let model = schema.model("BreadTestModel").expect("model");
        assert!(model.has_permission("change_breadtestmodel"));
        assert!(model.has_permission("browse_breadtestmodel"));
        assert!(!model.has_permission("frobnicate_breadtestmodel"));
    }
}
