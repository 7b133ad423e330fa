//! Template rendering around minijinja.
//!
//! Generic `bread/*.html` templates are compiled in. A template directory, when
//! given, is searched for every other name, so app-specific templates such as
//! `tests/breadtestmodel_browse.html` override the generic ones.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, ErrorKind, path_loader};
use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};

const BUILTIN_TEMPLATES: [(&str, &str); 6] = [
    ("bread/base.html", include_str!("../templates/bread/base.html")),
    ("bread/browse.html", include_str!("../templates/bread/browse.html")),
    ("bread/read.html", include_str!("../templates/bread/read.html")),
    (
        "bread/label_value_read.html",
        include_str!("../templates/bread/label_value_read.html"),
    ),
    ("bread/edit.html", include_str!("../templates/bread/edit.html")),
    ("bread/delete.html", include_str!("../templates/bread/delete.html")),
];

pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new(template_dir: Option<&Path>) -> Result<Self> {
        let mut env = Environment::new();
        if let Some(dir) = template_dir {
            env.set_loader(path_loader(dir));
        }
        for (name, source) in BUILTIN_TEMPLATES {
            env.add_template(name, source)
                .with_context(|| format!("parse template {name}"))?;
        }
        env.add_filter("capfirst", capfirst);
        Ok(Self { env })
    }

    /// Render the first template of `names` that exists.
    pub fn render<S: Serialize>(&self, names: &[String], ctx: S) -> AppResult<String> {
        for name in names {
            match self.env.get_template(name) {
                Ok(template) => {
                    debug!(template = %name, "rendering");
                    return Ok(template.render(ctx)?);
                }
                Err(err) if err.kind() == ErrorKind::TemplateNotFound => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(AppError::internal(format!(
            "none of the templates {names:?} exist"
        )))
    }
}

fn capfirst(value: String) -> String {
    bread::read::capfirst(&value)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use minijinja::context;

    use super::*;

    #[test]
    fn first_existing_template_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("tests")).expect("mkdir");
        fs::write(
            dir.path().join("tests/thing_browse.html"),
            "custom {{ name|capfirst }}",
        )
        .expect("write");
        let renderer = Renderer::new(Some(dir.path())).expect("renderer");
        let names = vec![
            "tests/thing_browse.html".to_string(),
            "bread/browse.html".to_string(),
        ];
        let html = renderer
            .render(&names, context! { name => "things" })
            .expect("render");
        assert_eq!(html, "custom Things");
    }

    #[test]
    fn missing_templates_are_an_error() {
        let renderer = Renderer::new(None).expect("renderer");
        let err = renderer
            .render(&["nope.html".to_string()], context! {})
            .expect_err("missing");
        assert_eq!(err.status, axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
