//! A configured set of BREAD views for one model.
//!
//! [`Bread::new`] validates everything that can be checked without data
//! (model, permissions, column paths, search fields, sortable columns) so a
//! misconfiguration fails at startup instead of on the first request.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::access::Principal;
use crate::core::columns::Column;
use crate::core::ordering::{OrderCompiler, SortableColumns};
use crate::core::schema::{ModelSchema, Schema, verbose_name};
use crate::core::search::SearchFields;
use crate::core::validate::validate_fieldspec;
use crate::error::ValidationError;
use crate::read::{Evaluator, ReadMode};

/// One of the five views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Browse,
    Read,
    Edit,
    Add,
    Delete,
}

impl ViewKind {
    pub const ALL: [ViewKind; 5] = [
        ViewKind::Browse,
        ViewKind::Read,
        ViewKind::Edit,
        ViewKind::Add,
        ViewKind::Delete,
    ];

    pub fn letter(self) -> char {
        match self {
            ViewKind::Browse => 'B',
            ViewKind::Read => 'R',
            ViewKind::Edit => 'E',
            ViewKind::Add => 'A',
            ViewKind::Delete => 'D',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|view| view.letter() == letter.to_ascii_uppercase())
    }

    pub fn name(self) -> &'static str {
        match self {
            ViewKind::Browse => "browse",
            ViewKind::Read => "read",
            ViewKind::Edit => "edit",
            ViewKind::Add => "add",
            ViewKind::Delete => "delete",
        }
    }

    /// Action part of the permission codename guarding this view.
    pub fn permission_action(self) -> &'static str {
        match self {
            ViewKind::Browse => "browse",
            ViewKind::Read => "view",
            ViewKind::Edit => "change",
            ViewKind::Add => "add",
            ViewKind::Delete => "delete",
        }
    }

    /// Add shares the edit template.
    pub fn template_suffix(self) -> &'static str {
        match self {
            ViewKind::Browse => "browse",
            ViewKind::Read => "read",
            ViewKind::Edit | ViewKind::Add => "edit",
            ViewKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Enabled views, parsed from letters such as `"BREAD"` or `"re"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSet([bool; 5]);

impl ViewSet {
    pub fn parse(letters: &str) -> Result<Self, ValidationError> {
        let mut enabled = [false; 5];
        for letter in letters.chars().filter(|ch| !ch.is_whitespace()) {
            let view = ViewKind::from_letter(letter)
                .ok_or(ValidationError::UnknownView { letter })?;
            enabled[view as usize] = true;
        }
        Ok(Self(enabled))
    }

    pub fn contains(&self, view: ViewKind) -> bool {
        self.0[view as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = ViewKind> + '_ {
        ViewKind::ALL.into_iter().filter(|view| self.contains(*view))
    }
}

impl Default for ViewSet {
    fn default() -> Self {
        Self([true; 5])
    }
}

impl fmt::Display for ViewSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.iter().try_for_each(|view| write!(f, "{}", view.letter()))
    }
}

/// Unvalidated settings for one [`Bread`].
#[derive(Debug, Clone)]
pub struct BreadConfig {
    pub model: String,
    pub plural_name: Option<String>,
    pub views: String,
    pub namespace: String,
    pub base_template: String,
    /// Uses `{app_label}`, `{model}` and `{view}` placeholders.
    pub template_name_pattern: Option<String>,
    pub columns: Vec<Column>,
    pub search_fields: Vec<String>,
    pub paginate_by: Option<usize>,
    /// Overrides the model's default ordering in browse.
    pub ordering: Option<Vec<String>>,
    /// Fields left out of forms and the default read view.
    pub exclude: Vec<String>,
    pub read: ReadMode,
}

impl BreadConfig {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            plural_name: None,
            views: "BREAD".to_string(),
            namespace: String::new(),
            base_template: "base.html".to_string(),
            template_name_pattern: None,
            columns: Vec::new(),
            search_fields: Vec::new(),
            paginate_by: None,
            ordering: None,
            exclude: Vec::new(),
            read: ReadMode::default(),
        }
    }
}

/// A routable URL for one view.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    pub view: ViewKind,
    /// URL name without namespace, e.g. `edit_breadtestmodel`.
    pub name: String,
    /// Route in `<int:pk>` notation, e.g. `testmodels/<int:pk>/edit/`.
    pub route: String,
    /// Router path with a leading slash, e.g. `/testmodels/{pk}/edit/`.
    pub path: String,
    regex: Regex,
}

impl UrlPattern {
    fn new(view: ViewKind, name: String, prefix: &str, tail: &str) -> Result<Self, ValidationError> {
        let route = format!("{prefix}{tail}");
        let path = format!("/{}", route.replace("<int:pk>", "{pk}"));
        let regex = format!(
            "^{}$",
            regex::escape(&route).replace("<int:pk>", r"(?P<pk>\d+)")
        );
        let regex = Regex::new(&regex)
            .map_err(|err| ValidationError::Invalid(format!("bad url pattern {route}: {err}")))?;
        Ok(Self {
            view,
            name,
            route,
            path,
            regex,
        })
    }

    /// Regex form, e.g. `^testmodels/(?P<pk>\d+)/edit/$`.
    pub fn regex(&self) -> &str {
        self.regex.as_str()
    }

    /// Match a request path (leading slash optional) and extract `pk`.
    pub fn matches(&self, path: &str) -> Option<Option<i64>> {
        let captures = self.regex.captures(path.strip_prefix('/').unwrap_or(path))?;
        match captures.name("pk") {
            Some(pk) => pk.as_str().parse().ok().map(Some),
            None => Some(None),
        }
    }

    /// Concrete path for `pk`.
    pub fn reverse(&self, pk: Option<i64>) -> Option<String> {
        match (self.route.contains("<int:pk>"), pk) {
            (true, Some(pk)) => Some(self.path.replace("{pk}", &pk.to_string())),
            (false, _) => Some(self.path.clone()),
            (true, None) => None,
        }
    }
}

/// Context shared by every view template.
#[derive(Debug, Clone, Serialize)]
pub struct SharedContext {
    pub verbose_name: String,
    pub verbose_name_plural: String,
    pub base_template: String,
    pub browse_url: Option<String>,
    pub add_url: Option<String>,
    pub may_browse: bool,
    pub may_read: bool,
    pub may_edit: bool,
    pub may_add: bool,
    pub may_delete: bool,
}

#[derive(Debug, Clone)]
pub struct Bread {
    model: String,
    app_label: String,
    name: String,
    plural_name: String,
    views: ViewSet,
    namespace: String,
    base_template: String,
    template_name_pattern: Option<String>,
    columns: Vec<Column>,
    search: SearchFields,
    sortable: SortableColumns,
    paginate_by: Option<usize>,
    ordering: Vec<String>,
    exclude: Vec<String>,
    read: ReadMode,
    verbose_name: String,
    verbose_name_plural: String,
    patterns: Vec<UrlPattern>,
}

impl Bread {
    pub fn new(
        schema: &Schema,
        config: BreadConfig,
        compiler: &dyn OrderCompiler,
    ) -> Result<Self, ValidationError> {
        let model = schema.require(&config.model)?;
        let name = model.model_name();
        let plural_name = config
            .plural_name
            .filter(|plural| !plural.is_empty())
            .unwrap_or_else(|| format!("{name}s"));
        let views = ViewSet::parse(&config.views)?;

        for view in views.iter() {
            let codename = format!("{}_{name}", view.permission_action());
            if !model.has_permission(&codename) {
                return Err(ValidationError::MissingPermission {
                    view: view.name().to_string(),
                    codename,
                });
            }
        }

        for column in config.columns.iter().filter(|column| !column.annotation) {
            validate_fieldspec(schema, &model.name, &column.field)?;
        }
        for excluded in &config.exclude {
            if model.get_field(excluded).is_none() {
                return Err(ValidationError::NoSuchField {
                    model: model.name.clone(),
                    name: excluded.clone(),
                });
            }
        }
        check_read_labels(model, &config.read)?;

        let search = SearchFields::compile(schema, &model.name, &config.search_fields)?;
        let sortable = SortableColumns::compute(&model.name, &config.columns, compiler);
        let ordering = config.ordering.unwrap_or_else(|| model.ordering.clone());

        let mut bread = Self {
            model: model.name.clone(),
            app_label: model.app_label.clone(),
            name,
            plural_name,
            views,
            namespace: config.namespace,
            base_template: config.base_template,
            template_name_pattern: config.template_name_pattern,
            columns: config.columns,
            search,
            sortable,
            paginate_by: config.paginate_by,
            ordering,
            exclude: config.exclude,
            read: config.read,
            verbose_name: model.verbose_name(),
            verbose_name_plural: model.verbose_name_plural(),
            patterns: Vec::new(),
        };
        bread.patterns = bread.url_patterns(true)?;
        debug!(
            model = %bread.model,
            views = %bread.views,
            sortable = ?bread.sortable.indices(),
            "configured bread"
        );
        Ok(bread)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn app_label(&self) -> &str {
        &self.app_label
    }

    /// Lower-cased model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plural_name(&self) -> &str {
        &self.plural_name
    }

    pub fn views(&self) -> ViewSet {
        self.views
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn search(&self) -> &SearchFields {
        &self.search
    }

    pub fn sortable(&self) -> &SortableColumns {
        &self.sortable
    }

    pub fn paginate_by(&self) -> Option<usize> {
        self.paginate_by
    }

    pub fn ordering(&self) -> &[String] {
        &self.ordering
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn read_mode(&self) -> &ReadMode {
        &self.read
    }

    pub fn base_template(&self) -> &str {
        &self.base_template
    }

    /// `browse_{plural}` or `{view}_{name}`, optionally `{namespace}:`-prefixed.
    pub fn url_name(&self, view: ViewKind, include_namespace: bool) -> String {
        let namespace = if include_namespace && !self.namespace.is_empty() {
            format!("{}:", self.namespace)
        } else {
            String::new()
        };
        match view {
            ViewKind::Browse => format!("{namespace}browse_{}", self.plural_name),
            other => format!("{namespace}{}_{}", other.name(), self.name),
        }
    }

    /// Patterns for the enabled views, optionally under `{plural}/`.
    pub fn url_patterns(&self, prefix: bool) -> Result<Vec<UrlPattern>, ValidationError> {
        let prefix = if prefix {
            format!("{}/", self.plural_name)
        } else {
            String::new()
        };
        self.views
            .iter()
            .map(|view| {
                let tail = match view {
                    ViewKind::Browse => "",
                    ViewKind::Read => "<int:pk>/",
                    ViewKind::Edit => "<int:pk>/edit/",
                    ViewKind::Add => "add/",
                    ViewKind::Delete => "<int:pk>/delete/",
                };
                UrlPattern::new(view, self.url_name(view, false), &prefix, tail)
            })
            .collect()
    }

    /// Prefixed pattern for `view`, when enabled.
    pub fn pattern(&self, view: ViewKind) -> Option<&UrlPattern> {
        self.patterns.iter().find(|pattern| pattern.view == view)
    }

    /// URL for `view`, when enabled and `pk` fits its route.
    pub fn url(&self, view: ViewKind, pk: Option<i64>) -> Option<String> {
        self.pattern(view)?.reverse(pk)
    }

    /// The view and `pk` a request path routes to.
    pub fn resolve_path(&self, path: &str) -> Option<(ViewKind, Option<i64>)> {
        self.patterns
            .iter()
            .find_map(|pattern| pattern.matches(path).map(|pk| (pattern.view, pk)))
    }

    /// Full permission name, e.g. `tests.change_breadtestmodel`.
    pub fn permission(&self, view: ViewKind) -> String {
        format!("{}.{}_{}", self.app_label, view.permission_action(), self.name)
    }

    /// Template lookup order: app-specific, custom pattern, generic.
    pub fn template_names(&self, view: ViewKind) -> Vec<String> {
        let suffix = match (view, &self.read) {
            (ViewKind::Read, ReadMode::LabelValue(_)) => "label_value_read",
            _ => view.template_suffix(),
        };
        let mut names = vec![format!("{}/{}_{suffix}.html", self.app_label, self.name)];
        if let Some(pattern) = &self.template_name_pattern {
            names.push(
                pattern
                    .replace("{app_label}", &self.app_label)
                    .replace("{model}", &self.name)
                    .replace("{view}", suffix),
            );
        }
        names.push(format!("bread/{suffix}.html"));
        names
    }

    /// A view is usable when it is enabled and the principal holds its permission.
    pub fn may(&self, view: ViewKind, principal: &dyn Principal) -> bool {
        self.views.contains(view) && principal.has_perm(&self.permission(view))
    }

    pub fn context(&self, principal: &dyn Principal) -> SharedContext {
        SharedContext {
            verbose_name: self.verbose_name.clone(),
            verbose_name_plural: self.verbose_name_plural.clone(),
            base_template: self.base_template.clone(),
            browse_url: self.url(ViewKind::Browse, None),
            add_url: self.url(ViewKind::Add, None),
            may_browse: self.may(ViewKind::Browse, principal),
            may_read: self.may(ViewKind::Read, principal),
            may_edit: self.may(ViewKind::Edit, principal),
            may_add: self.may(ViewKind::Add, principal),
            may_delete: self.may(ViewKind::Delete, principal),
        }
    }
}

/// A missing label is taken from a field's verbose name, so it needs a field.
fn check_read_labels(model: &ModelSchema, read: &ReadMode) -> Result<(), ValidationError> {
    let ReadMode::LabelValue(entries) = read else {
        return Ok(());
    };
    for entry in entries.iter().filter(|entry| entry.label.is_none()) {
        match &entry.evaluator {
            Evaluator::Attr(name) => {
                verbose_name(model, name, true)?;
            }
            Evaluator::Computed(_) | Evaluator::Literal(_) => {
                return Err(ValidationError::Invalid(format!(
                    "read entry on '{}' needs a label unless it names a field",
                    model.name
                )));
            }
        }
    }
    Ok(())
}
