//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::token::{TokenIssuer, TokenVerifier};
use mangati_core::DatabaseService;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub issuer: TokenIssuer,
    pub verifier: TokenVerifier,
}

impl AppState {
    /// Builds the signing and verifying halves from the config. Fails when no
    /// signing secret is configured.
    pub fn new(
        db: Arc<dyn DatabaseService>,
        config: Arc<Config>,
    ) -> Result<Self, crate::token::TokenError> {
        let issuer = TokenIssuer::new(&config.jwt)?;
        let verifier = TokenVerifier::new(&config.jwt)?;
        Ok(Self {
            db,
            config,
            issuer,
            verifier,
        })
    }
}
