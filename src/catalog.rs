use std::{collections::HashSet, path::Path};

use include_dir::{include_dir, Dir};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::{CatalogError, GenerationError}, models::CatalogOption};

static BUILTIN_CATALOG: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/catalog");

/// A listing as handed to presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "layout", content = "options", rename_all = "snake_case")]
pub enum OptionList {
    Flat(Vec<CatalogOption>),
    Categorized(IndexMap<String, Vec<CatalogOption>>),
}

#[derive(Debug, Deserialize)]
struct CategoryEntry {
    category: String,
    options: Vec<CatalogOption>,
}

/// Read-only table of models and backgrounds, built once at startup.
#[derive(Debug, Clone)]
pub struct Catalog {
    models: IndexMap<String, Vec<CatalogOption>>,
    all_models: Vec<CatalogOption>,
    backgrounds: Vec<CatalogOption>,
}

impl Catalog {
    pub fn new(
        models: IndexMap<String, Vec<CatalogOption>>,
        backgrounds: Vec<CatalogOption>,
    ) -> Result<Self, CatalogError> {
        let all_models: Vec<CatalogOption> = models.values().flatten().cloned().collect();
        ensure_unique(&all_models)?;
        ensure_unique(&backgrounds)?;
        Ok(Self { models, all_models, backgrounds })
    }

    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        let models = builtin_file("models.json")?;
        let backgrounds = builtin_file("backgrounds.json")?;
        Self::from_json(models, backgrounds)
    }

    /// Loads `models.json` and `backgrounds.json` from a directory.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let models = std::fs::read_to_string(dir.join("models.json"))?;
        let backgrounds = std::fs::read_to_string(dir.join("backgrounds.json"))?;
        let catalog = Self::from_json(&models, &backgrounds)?;
        info!(path = %dir.display(), models = catalog.all_models.len(), backgrounds = catalog.backgrounds.len(), "Loaded catalog");
        Ok(catalog)
    }

    pub fn from_json(models: &str, backgrounds: &str) -> Result<Self, CatalogError> {
        let entries: Vec<CategoryEntry> = serde_json::from_str(models)?;
        let backgrounds: Vec<CatalogOption> = serde_json::from_str(backgrounds)?;
        let mut groups: IndexMap<String, Vec<CatalogOption>> = IndexMap::new();
        for entry in entries {
            groups.entry(entry.category).or_default().extend(entry.options);
        }
        Self::new(groups, backgrounds)
    }

    pub fn resolve_model(&self, id: &str) -> Result<&CatalogOption, GenerationError> {
        self.all_models
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| GenerationError::Precondition(format!("unknown model id '{id}'")))
    }

    pub fn resolve_background(&self, id: &str) -> Result<&CatalogOption, GenerationError> {
        self.backgrounds
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| GenerationError::Precondition(format!("unknown background id '{id}'")))
    }

    pub fn list_models_by_category(&self) -> &IndexMap<String, Vec<CatalogOption>> {
        &self.models
    }

    pub fn all_models(&self) -> &[CatalogOption] {
        &self.all_models
    }

    pub fn backgrounds(&self) -> &[CatalogOption] {
        &self.backgrounds
    }

    pub fn model_listing(&self) -> OptionList {
        OptionList::Categorized(self.list_models_by_category().clone())
    }

    pub fn background_listing(&self) -> OptionList {
        OptionList::Flat(self.backgrounds.clone())
    }
}

fn builtin_file(name: &'static str) -> Result<&'static str, CatalogError> {
    BUILTIN_CATALOG
        .get_file(name)
        .and_then(|f| f.contents_utf8())
        .ok_or(CatalogError::Missing(name))
}

fn ensure_unique(options: &[CatalogOption]) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for option in options {
        if !seen.insert(option.id.as_str()) {
            return Err(CatalogError::DuplicateId(option.id.clone()));
        }
    }
    Ok(())
}
