//! Startup configuration: the category table (id → display name) loaded
//! once from a TOML artifact, per the operations surface's "Category
//! table, loaded from a config artifact at startup" requirement. Unlike
//! `MAX_SETS_PER_CATEGORY`/`MAX_AGE_MONTHS`, this table is not
//! runtime-mutable — adding a category is a deploy, not a `set-config`.

use std::collections::BTreeMap;
use std::path::Path;

use qs_types::CategoryId;
use serde::Deserialize;

/// One row of the category table.
#[derive(Debug, Deserialize)]
struct CategoryEntry {
    id: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct CategoryTableFile {
    #[serde(default)]
    category: Vec<CategoryEntry>,
}

/// The loaded category table: id → display name.
#[derive(Clone, Debug, Default)]
pub struct CategoryTable {
    entries: BTreeMap<CategoryId, String>,
}

impl CategoryTable {
    /// Parses a category table from TOML text of the shape:
    ///
    /// ```toml
    /// [[category]]
    /// id = "cat-algebra"
    /// display_name = "Algebra"
    /// ```
    pub fn parse(toml_text: &str) -> anyhow::Result<Self> {
        let file: CategoryTableFile = toml::from_str(toml_text)?;
        let entries = file
            .category
            .into_iter()
            .map(|e| (CategoryId(e.id), e.display_name))
            .collect();
        Ok(Self { entries })
    }

    /// Loads and parses a category table from a file on disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Every known category id, for request validation.
    pub fn ids(&self) -> std::collections::BTreeSet<CategoryId> {
        self.entries.keys().cloned().collect()
    }

    /// The display name for `id`, if known.
    pub fn display_name(&self, id: &CategoryId) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_category_table_toml() {
        let table = CategoryTable::parse(
            r#"
            [[category]]
            id = "cat-algebra"
            display_name = "Algebra"

            [[category]]
            id = "cat-geometry"
            display_name = "Geometry"
            "#,
        )
        .unwrap();
        assert_eq!(table.ids().len(), 2);
        assert_eq!(table.display_name(&CategoryId("cat-algebra".into())), Some("Algebra"));
    }
}
