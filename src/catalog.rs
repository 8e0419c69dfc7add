use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::models::Document;

/// Load the travel-catalog documents from the configured directory.
///
/// Matches files against the configured include globs (`**/*.md` by
/// default), reads them wholesale, and resolves each document's display
/// title through the optional filename → title mapping. Results are sorted
/// by filename for deterministic indexing order.
pub fn load_catalog(config: &CatalogConfig) -> Result<Vec<Document>> {
    let root = &config.root;
    if !root.exists() {
        return Err(Error::Config(format!(
            "catalog directory does not exist: {}",
            root.display()
        )));
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !include_set.is_match(relative) {
            continue;
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let title = config
            .titles
            .get(&filename)
            .cloned()
            .unwrap_or_else(|| filename.clone());

        let body = std::fs::read_to_string(path)?;

        documents.push(Document {
            filename,
            title,
            body,
        });
    }

    documents.sort_by(|a, b| a.filename.cmp(&b.filename));

    tracing::info!(documents = documents.len(), root = %root.display(), "catalog loaded");
    Ok(documents)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Config(format!("invalid catalog glob {:?}: {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid catalog globs: {}", e)))
}
