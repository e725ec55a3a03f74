use crate::error::{ProgressError, ProgressResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Display text for a stage in each of its states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayVariants {
    pub idle: String,
    pub active: String,
    pub completed: String,
    pub failed: String,
}

impl DisplayVariants {
    /// Derive the four variants from a single label
    pub fn from_label(label: &str) -> Self {
        Self {
            idle: label.to_string(),
            active: format!("{}...", label),
            completed: format!("{} done", label),
            failed: format!("{} failed", label),
        }
    }
}

/// A single step of the visualized pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Stable identifier, unique within a catalog
    pub id: String,

    /// 0-based position in the catalog
    pub index: usize,

    pub display: DisplayVariants,
}

/// Ordered, immutable description of a pipeline's stages
///
/// The catalog length `N` defines the progress unit: each stage is worth
/// `100 / N` percent of the run.
///
/// # Example
/// ```
/// use stagecast::pipeline::StageCatalog;
///
/// let catalog = StageCatalog::from_ids(["fetch", "parse", "store"]).unwrap();
/// assert_eq!(catalog.len(), 3);
/// assert_eq!(catalog.index_of("parse"), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCatalog {
    stages: Vec<Stage>,
}

impl StageCatalog {
    /// Build a catalog from `(id, display)` pairs, in pipeline order
    ///
    /// # Errors
    /// Returns `ProgressError::InvalidCatalog` if the list is empty or an id
    /// is blank or repeated.
    pub fn new<I, S>(entries: I) -> ProgressResult<Self>
    where
        I: IntoIterator<Item = (S, DisplayVariants)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut stages = Vec::new();

        for (index, (id, display)) in entries.into_iter().enumerate() {
            let id = id.into();
            if id.trim().is_empty() {
                return Err(ProgressError::InvalidCatalog(format!(
                    "stage at position {} has an empty id",
                    index
                )));
            }
            if !seen.insert(id.clone()) {
                return Err(ProgressError::InvalidCatalog(format!(
                    "duplicate stage id '{}'",
                    id
                )));
            }
            stages.push(Stage { id, index, display });
        }

        if stages.is_empty() {
            return Err(ProgressError::InvalidCatalog(
                "a catalog needs at least one stage".to_string(),
            ));
        }

        Ok(Self { stages })
    }

    /// Build a catalog whose display text is derived from the ids
    pub fn from_ids<I, S>(ids: I) -> ProgressResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ids.into_iter().map(|id| {
            let id = id.into();
            let display = DisplayVariants::from_label(&id);
            (id, display)
        }))
    }

    /// The six steps of the document-labeling backend
    pub fn labeling_pipeline() -> Self {
        let entries = [
            ("router", "Routing document"),
            ("extractor", "Extracting content"),
            ("classifier", "Classifying category"),
            ("labeler", "Generating labels"),
            ("quality", "Checking quality"),
            ("output", "Writing output"),
        ];

        Self {
            stages: entries
                .iter()
                .enumerate()
                .map(|(index, (id, label))| Stage {
                    id: id.to_string(),
                    index,
                    display: DisplayVariants::from_label(label),
                })
                .collect(),
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a constructed catalog
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// Position of the stage with the given id
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.id == id)
    }

    /// Stage with the given id
    ///
    /// # Errors
    /// Returns `ProgressError::UnknownStage` if the catalog has no such stage.
    pub fn require(&self, id: &str) -> ProgressResult<&Stage> {
        self.stages
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| ProgressError::UnknownStage(id.to_string()))
    }

    /// Percentage of the run each stage accounts for
    pub fn progress_per_stage(&self) -> f64 {
        100.0 / self.stages.len() as f64
    }
}

impl Default for StageCatalog {
    fn default() -> Self {
        Self::labeling_pipeline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_stage() {
        let catalog = StageCatalog::labeling_pipeline();
        assert_eq!(catalog.require("labeler").unwrap().index, 3);
        assert!(matches!(
            catalog.require("translator"),
            Err(ProgressError::UnknownStage(_))
        ));
    }

    #[test]
    fn test_labeling_pipeline_order() {
        let catalog = StageCatalog::labeling_pipeline();
        let ids: Vec<&str> = catalog.stages().iter().map(|s| s.id.as_str()).collect();

        assert_eq!(
            ids,
            vec!["router", "extractor", "classifier", "labeler", "quality", "output"]
        );
        for (position, stage) in catalog.stages().iter().enumerate() {
            assert_eq!(stage.index, position);
        }
    }

    #[test]
    fn test_progress_per_stage() {
        let catalog = StageCatalog::from_ids(["a", "b", "c", "d"]).unwrap();
        assert_eq!(catalog.progress_per_stage(), 25.0);
    }

    #[test]
    fn test_empty_catalog_rejected() {
        let result = StageCatalog::from_ids(Vec::<String>::new());
        assert!(matches!(result, Err(ProgressError::InvalidCatalog(_))));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = StageCatalog::from_ids(["a", "b", "a"]);
        assert!(matches!(result, Err(ProgressError::InvalidCatalog(_))));
    }

    #[test]
    fn test_blank_id_rejected() {
        let result = StageCatalog::from_ids(["a", "  "]);
        assert!(matches!(result, Err(ProgressError::InvalidCatalog(_))));
    }

    #[test]
    fn test_index_of_unknown() {
        let catalog = StageCatalog::labeling_pipeline();
        assert_eq!(catalog.index_of("classifier"), Some(2));
        assert_eq!(catalog.index_of("translator"), None);
    }

    #[test]
    fn test_display_variants_from_label() {
        let display = DisplayVariants::from_label("Routing");
        assert_eq!(display.idle, "Routing");
        assert_eq!(display.active, "Routing...");
        assert_eq!(display.completed, "Routing done");
        assert_eq!(display.failed, "Routing failed");
    }
}
