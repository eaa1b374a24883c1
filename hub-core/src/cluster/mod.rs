//! Cluster coordination: the coordination-service contract, an in-process
//! implementation, leader election and job cursors.

pub mod coordinator;
pub mod cursor;
pub mod leader;
pub mod memory;

pub use coordinator::{CoordinationError, Coordinator, SessionState};
pub use cursor::{CursorKind, CursorStart, CursorStore, LastContentPath};
pub use leader::{Leader, LeaderElection, Leadership, election_path};
pub use memory::{InMemoryCoordinator, InMemorySession};
