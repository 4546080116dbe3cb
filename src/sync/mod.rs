//! Reconciliation between the store, the sheet and the client cache.
//!
//! - **Key**: business key resolution shared by every component
//! - **Codec**: ticket ⇄ fixed-width sheet row, per section
//! - **Merge**: pull folding, deletion detection, store pull application
//! - **Seed**: promotion of sheet-origin rows into the store
//! - **Cache**: the persisted client view, seeded keys and counters
//! - **Cycle**: the session that drives all of the above
//!
//! # Example
//!
//! ```ignore
//! use crowd::sync::{ClientCache, SyncSession};
//!
//! let mut session = SyncSession::new(storage, sheets, ClientCache::load(&path)?, "Anati");
//! let report = session.run_cycle(Section::Ce).await;
//! let outcome = session.save_edits(Section::Ce, "CE-01001", Some("Closed"), None).await?;
//! ```

pub mod cache;
pub mod codec;
pub mod cycle;
pub mod events;
mod hash;
pub mod key;
pub mod merge;
pub mod seed;
mod types;

pub use cache::{atomic_write, ClientCache, CACHE_VERSION};
pub use cycle::SyncSession;
pub use events::{ChangeNotifier, SectionChanged};
pub use hash::{content_hash, has_changed};
pub use key::business_key;
pub use merge::{apply_store_pull, merge, reconcile_after_pull};
pub use seed::{seed_section, SEED_ACTOR};
pub use types::{CycleReport, LegOutcome, MergePolicy, MutationOutcome, SeedStats, StepOutcome};
