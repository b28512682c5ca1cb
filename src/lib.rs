//! Attendance Client Library
//!
//! Authenticated API access and the photo-verified clock-in workflow.

pub mod api;
pub mod auth;
pub mod capture;
pub mod commands;
pub mod config;
pub mod interceptor;
pub mod logging;
pub mod models;
pub mod platform;
pub mod storage;

use std::sync::Arc;

use anyhow::Context;

use api::ApiClient;
use auth::TokenStore;
use capture::{Devices, PunchLock, PunchOrchestrator};
use config::Config;
use storage::Storage;

/// Application state shared across commands
pub struct AppState {
    pub config: Config,
    pub tokens: Arc<TokenStore>,
    pub api: ApiClient,
    /// At most one punch per session, whichever orchestrator runs it
    punch_lock: PunchLock,
}

impl AppState {
    /// Open persisted credentials and build the API client
    pub fn init(config: Config) -> anyhow::Result<Self> {
        let storage = Storage::open(&config.data_dir).context("Failed to open data directory")?;
        let tokens = Arc::new(TokenStore::open(storage).context("Failed to load credentials")?);
        let api = ApiClient::new(&config.api_base_url, config.request_timeout, tokens.clone())
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            tokens,
            api,
            punch_lock: PunchLock::default(),
        })
    }

    /// Punch workflow bound to this session's API client
    pub fn orchestrator(&self, devices: Devices) -> PunchOrchestrator {
        PunchOrchestrator::new(
            devices,
            Arc::new(self.api.clone()),
            self.config.capture_dir(),
        )
        .with_lock(self.punch_lock.clone())
    }
}
