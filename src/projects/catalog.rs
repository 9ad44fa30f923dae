use super::ProjectSource;
use crate::error::{CatalogError, CatalogResult};
use crate::{Project, ProjectDraft, ProjectId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

const CATALOG_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CatalogFile {
    version: u32,
    #[serde(default)]
    next_id: u32,
    projects: Vec<Project>,
}

/// Thread-safe project store, optionally backed by a JSON file.
///
/// Clones share the same underlying data. Mutations only touch memory;
/// call [`ProjectCatalog::save`] to write them out.
#[derive(Clone, Debug)]
pub struct ProjectCatalog {
    projects: Arc<DashMap<ProjectId, Project>>,
    next_id: Arc<AtomicU32>,
    path: Option<PathBuf>,
}

impl Default for ProjectCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectCatalog {
    /// Empty in-memory catalog.
    pub fn new() -> Self {
        Self {
            projects: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU32::new(1)),
            path: None,
        }
    }

    /// Open the catalog at `path`; a missing file gives an empty catalog.
    pub fn open(path: impl Into<PathBuf>) -> CatalogResult<Self> {
        let catalog = Self {
            path: Some(path.into()),
            ..Self::new()
        };
        catalog.reload()?;
        Ok(catalog)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn get(&self, id: ProjectId) -> Option<Project> {
        self.projects.get(&id).map(|entry| entry.clone())
    }

    /// All projects ordered by id.
    pub fn list(&self) -> Vec<Project> {
        let mut projects: Vec<Project> = self
            .projects
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        projects.sort_by_key(|project| project.id);
        projects
    }

    fn validate(draft: &ProjectDraft) -> CatalogResult<()> {
        if draft.title.trim().is_empty() {
            return Err(CatalogError::Invalid {
                reason: "title cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    fn allocate_id(&self) -> CatalogResult<ProjectId> {
        let value = self
            .next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                next.checked_add(1)
            })
            .map_err(|_| CatalogError::IdExhausted)?;
        ProjectId::new(value).ok_or(CatalogError::IdExhausted)
    }

    pub fn insert(&self, draft: ProjectDraft) -> CatalogResult<Project> {
        Self::validate(&draft)?;
        let id = self.allocate_id()?;
        let project = Project::new(id, draft);
        self.projects.insert(id, project.clone());
        Ok(project)
    }

    pub fn insert_batch(
        &self,
        drafts: impl IntoIterator<Item = ProjectDraft>,
    ) -> CatalogResult<Vec<Project>> {
        drafts.into_iter().map(|draft| self.insert(draft)).collect()
    }

    pub fn update(&self, id: ProjectId, draft: ProjectDraft) -> CatalogResult<Project> {
        Self::validate(&draft)?;
        let mut entry = self
            .projects
            .get_mut(&id)
            .ok_or(CatalogError::NotFound { id })?;
        *entry = Project::new(id, draft);
        Ok(entry.clone())
    }

    pub fn remove(&self, id: ProjectId) -> CatalogResult<Project> {
        self.projects
            .remove(&id)
            .map(|(_, project)| project)
            .ok_or(CatalogError::NotFound { id })
    }

    /// Import a file of projects, choosing the format from its extension.
    ///
    /// `.csv` files are read as CSV; anything else is read as JSON.
    pub fn import_file(&self, path: &Path) -> CatalogResult<Vec<Project>> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            self.import_csv(path)
        } else {
            self.import_json(path)
        }
    }

    /// Import a JSON array of `{title, summary, domain}` records.
    ///
    /// Records with an empty title are skipped.
    pub fn import_json(&self, path: &Path) -> CatalogResult<Vec<Project>> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let drafts: Vec<ProjectDraft> =
            serde_json::from_str(&content).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        self.import_drafts(path, drafts)
    }

    /// Import a CSV file with a `Title,Summary,Domain` header row.
    ///
    /// Headers accept the same `title`/`Title` spellings as the JSON import.
    /// The `Domain` column may be omitted.
    pub fn import_csv(&self, path: &Path) -> CatalogResult<Vec<Project>> {
        let file = std::fs::File::open(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(file);
        let drafts = reader
            .deserialize::<ProjectDraft>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| CatalogError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
        self.import_drafts(path, drafts)
    }

    fn import_drafts(&self, path: &Path, drafts: Vec<ProjectDraft>) -> CatalogResult<Vec<Project>> {
        let total = drafts.len();
        let imported = self.insert_batch(
            drafts
                .into_iter()
                .map(|d| ProjectDraft::new(d.title, d.summary, d.domain))
                .filter(|d| !d.title.is_empty()),
        )?;
        if imported.len() < total {
            tracing::warn!(
                "Skipped {} records without a title while importing {}",
                total - imported.len(),
                path.display()
            );
        }
        Ok(imported)
    }

    /// Replace the in-memory contents with the file on disk.
    pub fn reload(&self) -> CatalogResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = match std::fs::read_to_string(path) {
            Ok(content) => {
                serde_json::from_str::<CatalogFile>(&content).map_err(|source| {
                    CatalogError::Parse {
                        path: path.clone(),
                        source,
                    }
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CatalogFile {
                version: CATALOG_VERSION,
                next_id: 1,
                projects: Vec::new(),
            },
            Err(source) => {
                return Err(CatalogError::Read {
                    path: path.clone(),
                    source,
                });
            }
        };

        let max_id = file
            .projects
            .iter()
            .map(|p| p.id.value())
            .max()
            .unwrap_or(0);
        let next_id = file.next_id.max(max_id.saturating_add(1)).max(1);

        self.projects.clear();
        for project in file.projects {
            self.projects.insert(project.id, project);
        }
        self.next_id.store(next_id, Ordering::SeqCst);

        tracing::debug!("Loaded {} projects from {}", self.len(), path.display());
        Ok(())
    }

    /// Write the catalog to its file. No-op for in-memory catalogs.
    pub fn save(&self) -> CatalogResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let write_err = |source: std::io::Error| CatalogError::Write {
            path: path.clone(),
            source,
        };

        let file = CatalogFile {
            version: CATALOG_VERSION,
            next_id: self.next_id.load(Ordering::SeqCst),
            projects: self.list(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| write_err(std::io::Error::other(e)))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_err)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        temp.write_all(json.as_bytes()).map_err(write_err)?;
        temp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

impl ProjectSource for ProjectCatalog {
    fn list_all_projects(&self) -> CatalogResult<Vec<Project>> {
        Ok(self.list())
    }

    fn lookup_project(&self, id: ProjectId) -> Option<Project> {
        self.get(id)
    }
}
