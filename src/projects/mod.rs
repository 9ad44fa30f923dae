//! Project records consumed by the index.
//!
//! The index only needs two things from wherever projects live: the full
//! list (to build a generation) and a point lookup (to hydrate results).
//! [`ProjectSource`] is that seam; [`ProjectCatalog`] is the JSON-file
//! implementation used by the CLI.

mod catalog;

pub use catalog::ProjectCatalog;

use crate::error::CatalogResult;
use crate::{Project, ProjectId};

pub trait ProjectSource: Send + Sync {
    /// Every current project, ordered by id.
    fn list_all_projects(&self) -> CatalogResult<Vec<Project>>;

    fn lookup_project(&self, id: ProjectId) -> Option<Project>;
}

/// `(id, embedding text)` pairs for every project in `source`.
pub fn embedding_inputs(source: &dyn ProjectSource) -> CatalogResult<Vec<(ProjectId, String)>> {
    Ok(source
        .list_all_projects()?
        .into_iter()
        .map(|project| (project.id, project.embedding_text()))
        .collect())
}
