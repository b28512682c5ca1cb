//! Commands Module
//!
//! User-level operations on top of [`AppState`], one per screen action.

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::auth::Credentials;
use crate::capture::{PunchOrchestrator, PunchOutcome};
use crate::models::{FieldError, History, PasswordChange, Period, Profile, ProfileUpdate};
use crate::AppState;

/// Authenticate and persist the issued credential pair
pub async fn login(state: &AppState, username: &str, password: &str) -> Result<()> {
    info!("Logging in as {}", username);

    let response = state
        .api
        .authenticate(username, password)
        .await
        .context("Login failed")?;

    let credentials =
        Credentials::new(response.access, response.refresh).context("Server issued no token")?;
    state
        .tokens
        .save(credentials)
        .context("Failed to store credentials")?;

    Ok(())
}

/// Forget stored credentials
pub fn logout(state: &AppState) -> Result<()> {
    info!("Logging out");
    state.tokens.clear().context("Failed to clear credentials")
}

/// Run one punch attempt.
///
/// Without an explicit target the first permitted work location from the
/// profile is used; if the profile cannot be read the server picks one.
/// A punch already in flight on this session rejects the call before any
/// request is made.
pub async fn punch(
    state: &AppState,
    orchestrator: &PunchOrchestrator,
    work_location_id: Option<i64>,
) -> Result<PunchOutcome> {
    let reservation = orchestrator.reserve()?;

    if !state.tokens.is_authenticated() {
        warn!("Punching without stored credentials");
    }

    let target = match work_location_id {
        Some(id) => Some(id),
        None => match state.api.fetch_profile().await {
            Ok(profile) => {
                let default = profile.default_work_location();
                match default {
                    Some(location) => {
                        info!("Using default work location: {} ({})", location.name, location.id)
                    }
                    None => warn!("Profile has no permitted work locations"),
                }
                default.map(|location| location.id)
            }
            Err(e) => {
                warn!("Could not read profile for default location: {}", e);
                None
            }
        },
    };

    Ok(orchestrator.run_reserved(reservation, target).await)
}

pub async fn profile(state: &AppState) -> Result<Profile> {
    state.api.fetch_profile().await.context("Failed to load profile")
}

pub async fn update_profile(state: &AppState, update: &ProfileUpdate) -> Result<Profile> {
    if update.is_empty() {
        bail!("Nothing to update");
    }
    state
        .api
        .update_profile(update)
        .await
        .context("Failed to update profile")
}

/// Change the password; obvious mistakes are rejected before any request
pub async fn change_password(
    state: &AppState,
    new_password: &str,
    confirmation: &str,
) -> Result<PasswordChange> {
    if new_password.is_empty() {
        return Ok(PasswordChange::Rejected(vec![FieldError {
            field: Some("new_password1".into()),
            message: "Password must not be empty".into(),
        }]));
    }
    if new_password != confirmation {
        return Ok(PasswordChange::Rejected(vec![FieldError {
            field: Some("new_password2".into()),
            message: "Passwords do not match".into(),
        }]));
    }

    state
        .api
        .change_password(new_password, confirmation)
        .await
        .context("Failed to change password")
}

pub async fn history(
    state: &AppState,
    period: Period,
    date: Option<chrono::NaiveDate>,
) -> Result<History> {
    let history = state
        .api
        .fetch_history(period, date)
        .await
        .context("Failed to load history")?;

    debug!(
        "History {}..{}: {} day(s), {} h",
        history.start,
        history.end,
        history.days.len(),
        history.sum_hours
    );
    Ok(history)
}
