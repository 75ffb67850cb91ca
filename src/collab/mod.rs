//! In-memory coordinator for concurrent editors of the same record: presence,
//! per-field locks, versioned changes, conflict detection and expiry sweeps.

pub mod clock;
pub mod conflict;
pub mod coordinator;
pub mod locks;
pub mod policy;
pub mod registry;
pub mod session;
pub mod sweeper;
pub mod types;
pub mod user_index;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{CollaborationCoordinator, CoordinatorStats};
pub use policy::CollabPolicy;
pub use session::SessionSnapshot;
pub use sweeper::spawn_sweeper;
pub use types::*;
