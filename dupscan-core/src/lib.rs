pub mod config;
pub mod enrich;
pub mod error;
pub mod failure_report;
pub mod index_audit;
pub mod model;
pub mod path_safety;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod scan;
pub mod store;
pub mod writer;

pub use error::{DupscanError, Result, StoreError};
pub use model::{CollectionResult, DuplicateGroup, FieldScanResult, ScanTarget};
