//! Artifact collection from the engine's shared output directory.
//!
//! The output tag written into the job's save node is the sole
//! correlation mechanism: the engine names artifacts
//! `<tag>_00001.png`, `<tag>_00002.png`, ... in a directory shared by
//! every in-flight request. Collection is read-only; housekeeping of the
//! directory is an external concern.

use std::path::Path;

use renderbox_core::workflow::OutputTag;

/// A binary result produced by the engine for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    /// MIME type derived from the file extension.
    pub content_type: &'static str,
}

/// Errors from artifact collection.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Dispatch reported success but no artifact carries the tag. This
    /// indicates a template/engine contract defect (e.g. the save node's
    /// naming field was not wired to the tag), not a user error.
    #[error("No artifact matching tag '{tag}' in {dir}")]
    NotFound { tag: String, dir: String },

    /// The output directory or a matching file could not be read.
    #[error("Failed to read artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Find the artifact for `tag` in `output_dir` and return its bytes.
///
/// When a job produces several matching files, the lexicographically
/// first name wins — deterministic, and for ComfyUI's `_00001`, `_00002`
/// suffixes it is also the first image of the batch.
pub async fn collect(output_dir: &Path, tag: &OutputTag) -> Result<Artifact, ArtifactError> {
    let mut matches: Vec<String> = Vec::new();

    let mut entries = tokio::fs::read_dir(output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(tag.as_str()) {
                matches.push(name.to_string());
            }
        }
    }

    matches.sort_unstable();
    let Some(name) = matches.first() else {
        tracing::error!(
            tag = %tag,
            dir = %output_dir.display(),
            "Dispatch succeeded but no artifact matches the tag; \
             the template's save node is not wired to the output tag",
        );
        return Err(ArtifactError::NotFound {
            tag: tag.as_str().to_string(),
            dir: output_dir.display().to_string(),
        });
    };

    if matches.len() > 1 {
        tracing::debug!(tag = %tag, count = matches.len(), "Multiple artifacts; returning first");
    }

    let path = output_dir.join(name);
    let bytes = tokio::fs::read(&path).await?;

    Ok(Artifact {
        bytes,
        content_type: content_type_for(name),
    })
}

/// Map a file name to a MIME type by extension.
fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
