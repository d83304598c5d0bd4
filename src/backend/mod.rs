mod client;
mod models;
mod outcome;

pub use client::Client;
pub use models::{
    DueDiligenceEntry, InventoryEntry, LibrarySearchHit, OrganizationDetails, ProductSummary, ProjectSummary, SourceFile,
    SourceFileLibrary,
};
pub use outcome::{ReassignOutcome, SyncOutcome};
