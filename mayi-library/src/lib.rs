mod catalog;
pub mod config;
pub mod error;
mod extract;
mod router;
mod sanitize;
mod unlock;

pub use catalog::{Catalog, CatalogStats, SongRecord, SongStatus};
pub use config::Config;
pub use error::{LibraryError, Result};
pub use extract::{extract_metadata, file_md5};
pub use router::{
    DedupeReport, IngestOutcome, IngestReport, IngestStatus, LibraryManager, ScanReport,
};
pub use sanitize::sanitize_filename;
pub use unlock::{UnlockFailure, UnlockReport};
