//! Image asset synchronization between the content tree and a flat destination.
//!
//! - [`discover`]: allow-list and inventories
//! - [`decision`]: whether a copy pass is required
//! - [`sync`]: the pass itself and single-asset removal

pub mod decision;
pub mod discover;
pub mod sync;

pub use decision::SyncDecision;
pub use discover::AllowList;
pub use sync::{AssetSync, SyncReport, remove_asset, synchronize};
