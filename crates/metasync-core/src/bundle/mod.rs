//! Migration bundles.
//!
//! A bundle is a zip archive carrying `task.dat`, a JSON document with
//! every metadata table, plus the generated client assets that belong to
//! that metadata. Imports unpack into a scratch directory; assets are only
//! copied into place after the migration has been applied.

mod archive;
mod document;

pub use archive::{write_bundle, ExportSummary, ExtractedBundle, ASSET_DIR};
pub use document::{BundleDocument, DOCUMENT_NAME, FORMAT_VERSION};
