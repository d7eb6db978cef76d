//! Session management
//!
//! The [`SessionManager`] is the single writer of the client session. Token
//! storage is a mirror that seeds the session once at construction.

pub mod manager;
pub mod state;
pub mod storage;

pub use manager::{SessionManager, SessionSettings};
pub use state::{SessionPhase, SessionSnapshot};
pub use storage::{FileTokenStore, MemoryTokenStore, StoredTokens, TokenStore};
