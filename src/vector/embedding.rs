//! Embedding generation for project similarity.
//!
//! The index treats embedding as an opaque `embed(text) -> vector` capability
//! behind the [`EmbeddingGenerator`] trait. Two implementations ship with the
//! crate:
//!
//! - [`FastEmbedGenerator`] runs one or more fastembed models and concatenates
//!   their outputs into a single vector.
//! - [`HashingEmbeddingGenerator`] is an offline feature-hashing provider. It
//!   needs no model download and is fully deterministic.

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::vector::{VectorDimension, VectorError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe: the query path and the rebuild
/// worker call into the same generator concurrently.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts.
    ///
    /// # Returns
    /// A vector of embeddings, one for each input text, or an error
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Stable name recorded in snapshot metadata.
    ///
    /// A snapshot built by a differently named generator is never loaded.
    fn model_name(&self) -> String;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        self.generate_embeddings(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                VectorError::EmbeddingFailed("Provider returned no embedding".to_string())
            })
    }
}

/// Normalise text the way every embedding input is normalised.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Build the embedding input for a project or a query.
///
/// The summary is repeated so that it outweighs the (short) title.
///
/// # Example
/// ```
/// use projmatch::vector::project_text;
/// assert_eq!(project_text("Chat Bot", "NLP assistant"), "chat bot nlp assistant nlp assistant");
/// ```
#[must_use]
pub fn project_text(title: &str, summary: &str) -> String {
    normalize_text(&format!("{title} {summary} {summary}"))
}

/// Parse a model name from configuration.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    match name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        "ParaphraseMLMiniLML12V2" => Ok(EmbeddingModel::ParaphraseMLMiniLML12V2),
        other => Err(VectorError::EmbeddingFailed(format!(
            "Unknown embedding model '{other}'. Supported: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, ParaphraseMLMiniLML12V2"
        ))),
    }
}

/// One loaded fastembed model and its output width.
struct LoadedModel {
    name: String,
    model: Mutex<TextEmbedding>,
    width: usize,
}

/// fastembed implementation that concatenates several models.
///
/// With the default configuration (`AllMiniLML6V2` + `BGESmallENV15`) each
/// text becomes a 768-dimensional vector: the first 384 values come from the
/// first model, the rest from the second.
pub struct FastEmbedGenerator {
    models: Vec<LoadedModel>,
    dimension: VectorDimension,
}

impl FastEmbedGenerator {
    /// Create a generator with the default model pair.
    ///
    /// # Errors
    /// Returns an error if a model fails to initialize or download.
    pub fn new(cache_dir: &Path) -> Result<Self, VectorError> {
        Self::with_models(&["AllMiniLML6V2", "BGESmallENV15"], cache_dir, false)
    }

    /// Create a generator from model names.
    ///
    /// Output widths are detected by embedding a probe text, so models of
    /// any width can be combined.
    pub fn with_models(
        names: &[impl AsRef<str>],
        cache_dir: &Path,
        show_progress: bool,
    ) -> Result<Self, VectorError> {
        if names.is_empty() {
            return Err(VectorError::EmbeddingFailed(
                "At least one embedding model must be configured".to_string(),
            ));
        }

        let mut models = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let model_kind = parse_embedding_model(name)?;
            let mut model = TextEmbedding::try_new(
                InitOptions::new(model_kind)
                    .with_cache_dir(cache_dir.to_path_buf())
                    .with_show_download_progress(show_progress),
            )
            .map_err(|e| VectorError::EmbeddingFailed(
                format!("Failed to initialize embedding model {name}: {e}. Ensure you have internet connection for first-time model download")
            ))?;

            let probe = model
                .embed(vec!["probe"], None)
                .map_err(|e| VectorError::EmbeddingFailed(e.to_string()))?;
            let width = probe.first().map(Vec::len).unwrap_or(0);
            VectorDimension::new(width)?;

            tracing::debug!("Loaded embedding model {name} ({width} dimensions)");
            models.push(LoadedModel {
                name: name.to_string(),
                model: Mutex::new(model),
                width,
            });
        }

        let dimension = VectorDimension::new(models.iter().map(|m| m.width).sum())?;
        Ok(Self { models, dimension })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        let mut combined: Vec<Vec<f32>> = texts
            .iter()
            .map(|_| Vec::with_capacity(self.dimension.get()))
            .collect();

        for loaded in &self.models {
            let embeddings = loaded
                .model
                .lock()
                .map_err(|_| {
                    VectorError::EmbeddingFailed(format!(
                        "Failed to acquire lock for model {} - model may be poisoned",
                        loaded.name
                    ))
                })?
                .embed(text_strings.clone(), None)
                .map_err(|e| {
                    VectorError::EmbeddingFailed(format!(
                        "Model {} failed to generate embeddings: {e}",
                        loaded.name
                    ))
                })?;

            if embeddings.len() != texts.len() {
                return Err(VectorError::EmbeddingFailed(format!(
                    "Model {} returned {} embeddings for {} texts",
                    loaded.name,
                    embeddings.len(),
                    texts.len()
                )));
            }

            for (target, part) in combined.iter_mut().zip(embeddings) {
                if part.len() != loaded.width {
                    return Err(VectorError::DimensionMismatch {
                        expected: loaded.width,
                        actual: part.len(),
                    });
                }
                target.extend(part);
            }
        }

        Ok(combined)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> String {
        self.models
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// Deterministic bag-of-words embedding using the hashing trick.
///
/// Every alphanumeric token is hashed into one of `dimension` buckets and
/// counted. The result is L2-normalised, so texts sharing many tokens end
/// up close together and texts sharing none are orthogonal (modulo bucket
/// collisions).
#[derive(Debug, Clone)]
pub struct HashingEmbeddingGenerator {
    dimension: VectorDimension,
}

impl Default for HashingEmbeddingGenerator {
    fn default() -> Self {
        Self::new(VectorDimension::dimension_384())
    }
}

impl HashingEmbeddingGenerator {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(prefix) % self.dimension.get() as u64) as usize
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension.get()];
        let normalized = normalize_text(text);
        for token in normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            embedding[self.bucket(token)] += 1.0;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }
        embedding
    }
}

impl EmbeddingGenerator for HashingEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> String {
        format!("hashing-{}", self.dimension.get())
    }
}

/// Create the generator described by the `[embedding]` settings.
pub fn create_embedding_generator(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingGenerator>, VectorError> {
    match config.provider {
        EmbeddingProviderKind::FastEmbed => {
            let cache_dir = config.model_cache_dir();
            std::fs::create_dir_all(&cache_dir)?;
            let generator = FastEmbedGenerator::with_models(&config.models, &cache_dir, false)?;
            Ok(Arc::new(generator))
        }
        EmbeddingProviderKind::Hashing => Ok(Arc::new(HashingEmbeddingGenerator::new(
            VectorDimension::new(config.dimension)?,
        ))),
    }
}
