use indexmap::IndexMap;
use thiserror::Error;

use super::model::Table;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("dataset '{0}' has no rows")]
    EmptyDataset(String),
    #[error("no dataset named '{0}'")]
    UnknownDataset(String),
}

// ---------------------------------------------------------------------------
// Dataset catalog
// ---------------------------------------------------------------------------

/// Loaded datasets in upload order, plus the one currently selected.
#[derive(Debug, Default)]
pub struct DatasetCatalog {
    datasets: IndexMap<String, Table>,
    active: Option<String>,
}

impl DatasetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(|k| k.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.datasets.get(name)
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&Table> {
        self.active.as_deref().and_then(|name| self.datasets.get(name))
    }

    /// Store `table` under a name derived from `file_name` and make it active.
    /// Returns the name actually used.
    pub fn insert(&mut self, file_name: &str, table: Table) -> Result<String, CatalogError> {
        if table.is_empty() {
            return Err(CatalogError::EmptyDataset(file_name.to_string()));
        }
        let name = self.unique_name(file_name);
        log::info!("registered dataset '{name}' ({} rows)", table.num_rows());
        self.datasets.insert(name.clone(), table);
        self.active = Some(name.clone());
        Ok(name)
    }

    pub fn select(&mut self, name: &str) -> Result<&Table, CatalogError> {
        let table = self
            .datasets
            .get(name)
            .ok_or_else(|| CatalogError::UnknownDataset(name.to_string()))?;
        self.active = Some(name.to_string());
        Ok(table)
    }

    /// Drop a dataset. When it was active, the first remaining one becomes
    /// active instead.
    pub fn remove(&mut self, name: &str) -> Result<Table, CatalogError> {
        let table = self
            .datasets
            .shift_remove(name)
            .ok_or_else(|| CatalogError::UnknownDataset(name.to_string()))?;
        if self.active.as_deref() == Some(name) {
            self.active = self.datasets.keys().next().cloned();
        }
        Ok(table)
    }

    /// `sales.csv`, then `sales (1).csv`, `sales (2).csv`, ...
    pub fn unique_name(&self, file_name: &str) -> String {
        if !self.datasets.contains_key(file_name) {
            return file_name.to_string();
        }
        let (stem, ext) = match file_name.rfind('.') {
            Some(dot) if dot > 0 => file_name.split_at(dot),
            _ => (file_name, ""),
        };
        (1..)
            .map(|n| format!("{stem} ({n}){ext}"))
            .find(|candidate| !self.datasets.contains_key(candidate))
            .unwrap_or_else(|| file_name.to_string())
    }
}
