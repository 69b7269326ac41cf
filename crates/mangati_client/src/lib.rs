//! Client-side session handling for the Mangati API.
//!
//! The [`SessionManager`] owns the stored token and user profile, decides
//! locally whether the token is still usable and keeps at most one refresh in
//! flight. [`ApiClient`] sits on top of it and speaks HTTP.

pub mod client;
pub mod error;
pub mod session;
pub mod storage;
pub mod token;

pub use client::{ApiClient, ClientConfig, HttpRefresher};
pub use error::ClientError;
pub use session::{SessionManager, TokenRefresher};
pub use storage::{FileStorage, MemoryStorage, SessionStore, Storage, StoredSession, UserProfile};
