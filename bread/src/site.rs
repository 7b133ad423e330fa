//! A configured site: schema, seeded store, breads and users.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::access::User;
use crate::core::schema::Schema;
use crate::io::config::{SiteConfig, SiteSettings, load_config};
use crate::scaffold::{Bread, UrlPattern};
use crate::store::MemoryStore;

#[derive(Debug)]
pub struct Site {
    pub settings: SiteSettings,
    pub schema: Arc<Schema>,
    pub store: MemoryStore,
    pub breads: Vec<Bread>,
    pub users: Vec<User>,
}

impl Site {
    pub fn load(path: &Path) -> Result<Self> {
        let config = load_config(path)?;
        Self::from_config(config).with_context(|| format!("configure {}", path.display()))
    }

    /// Build the schema, seed the store, then validate every bread against both.
    pub fn from_config(config: SiteConfig) -> Result<Self> {
        let schema = Arc::new(config.schema()?);
        let mut store = MemoryStore::new(Arc::clone(&schema));
        for (idx, record) in config.records.iter().enumerate() {
            let values = record.values.clone();
            let inserted = match record.id {
                Some(id) => store.insert_with_id(&record.model, id, values),
                None => store.insert(&record.model, values).map(|_| ()),
            };
            inserted.with_context(|| format!("record #{} ({})", idx + 1, record.model))?;
        }

        let mut breads = Vec::with_capacity(config.breads.len());
        for bread_config in config.bread_configs() {
            let model = bread_config.model.clone();
            let bread = Bread::new(&schema, bread_config, &store)
                .with_context(|| format!("bread for {model}"))?;
            breads.push(bread);
        }
        info!(
            models = schema.models().count(),
            breads = breads.len(),
            records = config.records.len(),
            "site configured"
        );

        Ok(Self {
            settings: config.site,
            schema,
            store,
            breads,
            users: config.users,
        })
    }

    /// Bread by plural name.
    pub fn bread(&self, plural_name: &str) -> Option<&Bread> {
        self.breads
            .iter()
            .find(|bread| bread.plural_name() == plural_name)
    }

    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|user| user.name == name)
    }

    /// Every URL pattern of every bread.
    pub fn url_patterns(&self, prefix: bool) -> Result<Vec<UrlPattern>> {
        let mut patterns = Vec::new();
        for bread in &self.breads {
            patterns.extend(bread.url_patterns(prefix)?);
        }
        Ok(patterns)
    }
}
