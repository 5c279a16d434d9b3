//! Core services
//!
//! Each service wraps the shared pool; the HTTP layer is a thin adapter
//! over these.

pub mod aggregation;
pub mod annotations;
pub mod catalog;
pub mod gate;
pub mod ledger;

pub use aggregation::{
    Aggregator, CatalogExportRow, ExportRow, FeedItem, GlobalProgress, LeaderboardEntry,
    StatusFilter, UserBreakdown, UserProgress,
};
pub use annotations::{AnnotationStore, AnnotationSummary, Payload, SubmitOutcome, Target};
pub use catalog::{display_source, DisplaySource, ImageCatalog};
pub use gate::AccessGate;
pub use ledger::{AssignmentLedger, NextWork, WorkItem};
