pub mod export;
pub mod identity;
pub mod listing;
pub mod notifier;
pub mod reconciler;
pub mod scheduler;
pub mod sync_service;

pub use identity::{ResolvedIdentity, resolve_identity, slugify};
pub use listing::{DedupKey, EntryStatus, Listing, ListingEntry, ListingService};
pub use notifier::{NotificationEngine, NotifyStats};
pub use reconciler::{LinkOutcome, ReconcileOutcome, StudentRepository, link_student_repositories, reconcile};
pub use scheduler::NotificationScheduler;
pub use sync_service::{SyncReport, SyncService, SyncStats};
