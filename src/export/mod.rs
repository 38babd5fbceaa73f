//! Preview and export of a past submission.
//!
//! 1. [`render_preview`]: ask the [`SnapshotRenderer`] for one tall image of
//!    the submission's printable layout and keep it with a JPEG data URI
//! 2. [`paginate`]: slice the snapshot into page-sized bands
//! 3. [`pdf`]: embed each band as a JPEG page of a PDF
//! 4. [`write_document`]: atomically persist the PDF
//!
//! Steps 2–3 are CPU-bound and run in `spawn_blocking`.

pub mod encode;
pub mod paginate;
pub mod pdf;

use crate::config::PageGeometry;
use crate::error::IntakeError;
use crate::model::Submission;
use crate::ports::SnapshotRenderer;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use paginate::{plan_bands, Band, PageImage};

/// A rendered snapshot of one submission.
#[derive(Debug, Clone)]
pub struct Preview {
    pub submission_id: String,
    pub filename: String,
    pub image: DynamicImage,
    /// `data:image/jpeg;base64,...` of the whole snapshot.
    pub data_uri: String,
}

/// A finished PDF ready for download.
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// Render `submission` and encode the preview image.
pub async fn render_preview(
    renderer: &dyn SnapshotRenderer,
    submission: &Submission,
    jpeg_quality: u8,
) -> Result<Preview, IntakeError> {
    let image = renderer.render(submission).await.map_err(|e| {
        warn!("Preview rendering failed for {}: {}", submission.id, e);
        IntakeError::PreviewFailed {
            detail: e.to_string(),
        }
    })?;
    if image.width() == 0 || image.height() == 0 {
        return Err(IntakeError::PreviewFailed {
            detail: format!("renderer returned a {}x{} image", image.width(), image.height()),
        });
    }

    let for_encode = image.clone();
    let jpeg = tokio::task::spawn_blocking(move || encode::encode_jpeg(&for_encode, jpeg_quality))
        .await
        .map_err(|e| IntakeError::Internal(format!("Encode task panicked: {}", e)))?
        .map_err(|e| IntakeError::PreviewFailed {
            detail: e.to_string(),
        })?;

    info!(
        "Rendered preview of submission {} ({}x{})",
        submission.id,
        image.width(),
        image.height()
    );
    Ok(Preview {
        submission_id: submission.id.clone(),
        filename: submission.document_filename(),
        image,
        data_uri: encode::jpeg_data_uri(&jpeg),
    })
}

/// Paginate a preview into a multi-page PDF.
pub async fn export_document(
    preview: &Preview,
    page: PageGeometry,
    jpeg_quality: u8,
) -> Result<ExportedDocument, IntakeError> {
    export_image(preview.image.clone(), &preview.filename, page, jpeg_quality).await
}

/// Paginate any snapshot image into a PDF named `filename`.
pub async fn export_image(
    image: DynamicImage,
    filename: &str,
    page: PageGeometry,
    jpeg_quality: u8,
) -> Result<ExportedDocument, IntakeError> {
    let (bytes, page_count) = tokio::task::spawn_blocking(move || {
        let pages = paginate::paginate(&image, page)?;
        let bytes = pdf::build_pdf(&pages, page, jpeg_quality)?;
        Ok::<_, IntakeError>((bytes, pages.len()))
    })
    .await
    .map_err(|e| IntakeError::Internal(format!("Export task panicked: {}", e)))??;

    info!(
        "Exported {} ({} page(s), {} bytes)",
        filename,
        page_count,
        bytes.len()
    );
    Ok(ExportedDocument {
        filename: filename.to_string(),
        bytes,
        page_count,
    })
}

/// Write `doc` into `dir` under its own filename. Uses a temp file + rename
/// so a crash never leaves a truncated PDF behind.
pub async fn write_document(doc: &ExportedDocument, dir: &Path) -> Result<PathBuf, IntakeError> {
    let path = dir.join(&doc.filename);
    write_atomic(&path, &doc.bytes).await?;
    Ok(path)
}

/// Atomic write of `bytes` to `path`, creating parent directories.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IntakeError> {
    let fail = |source| IntakeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    Ok(())
}
