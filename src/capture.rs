//! Capture Orchestrator
//!
//! Drives one punch attempt through permission checks, photo capture,
//! location lookup and upload. Stages run strictly one after another; each
//! awaits a single device or network call before the next one starts.
//!
//! ```text
//! Idle -> LocationPermissionPending -> CameraPermissionPending -> Capturing
//!      -> LocationAcquiring -> Submitting -> Succeeded | Failed | Cancelled -> Idle
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::{broadcast, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{LocationFix, PhotoPunch, PunchResult};

const STAGE_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Fine or coarse location
    Location,
    Camera,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::Location => write!(f, "location"),
            Permission::Camera => write!(f, "camera"),
        }
    }
}

/// Runtime permission checks and prompts
#[async_trait]
pub trait PermissionGate: Send + Sync {
    fn is_granted(&self, permission: Permission) -> bool;

    /// Prompt the user; resolves to `true` on grant
    async fn request(&self, permission: Permission) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured,
    /// The user backed out of the camera
    Cancelled,
}

#[async_trait]
pub trait Camera: Send + Sync {
    /// Take a JPEG photo and write it to `destination`
    async fn capture(&self, destination: &Path) -> std::io::Result<CaptureOutcome>;
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Last known fix, or `None` when the device has none
    async fn last_known(&self) -> Option<LocationFix>;
}

/// Network seam for the final stage
#[async_trait]
pub trait PunchSubmitter: Send + Sync {
    async fn submit(&self, punch: PhotoPunch) -> Result<PunchResult, ApiError>;
}

#[async_trait]
impl PunchSubmitter for ApiClient {
    async fn submit(&self, punch: PhotoPunch) -> Result<PunchResult, ApiError> {
        self.submit_photo_punch(punch).await
    }
}

/// Device capabilities the workflow needs
#[derive(Clone)]
pub struct Devices {
    pub permissions: Arc<dyn PermissionGate>,
    pub camera: Arc<dyn Camera>,
    pub location: Arc<dyn LocationProvider>,
}

/// Why an attempt ended without a punch and without an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    PermissionDenied(Permission),
    CaptureAborted,
}

/// Terminal failures of an attempt
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PunchError {
    #[error("Could not prepare the photo: {0}")]
    LocalResource(String),

    #[error("Lost {0} permission")]
    PermissionLost(Permission),

    #[error("Could not get a location fix")]
    LocationUnavailable,

    /// Non-2xx response; `body` is the server's text, untouched
    #[error("Punch rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unreadable server response: {0}")]
    InvalidResponse(String),
}

impl From<ApiError> for PunchError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Network(msg) => PunchError::Network(msg),
            ApiError::Server { status, body } => PunchError::Rejected { status, body },
            ApiError::Parse(msg) => PunchError::InvalidResponse(msg),
            ApiError::Multipart(msg) => PunchError::LocalResource(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("A punch is already in progress")]
pub struct PunchInProgress;

/// Single-flight lock shared by every orchestrator of one session
pub type PunchLock = Arc<tokio::sync::Mutex<()>>;

/// Exclusive right to run one attempt; released on drop
#[derive(Debug)]
pub struct PunchReservation {
    _guard: OwnedMutexGuard<()>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PunchStage {
    Idle,
    LocationPermissionPending,
    CameraPermissionPending,
    Capturing,
    LocationAcquiring,
    Submitting,
    Succeeded(PunchResult),
    Failed(PunchError),
    Cancelled(CancelReason),
}

impl PunchStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PunchStage::Succeeded(_) | PunchStage::Failed(_) | PunchStage::Cancelled(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            PunchStage::Idle => "idle",
            PunchStage::LocationPermissionPending => "location-permission-pending",
            PunchStage::CameraPermissionPending => "camera-permission-pending",
            PunchStage::Capturing => "capturing",
            PunchStage::LocationAcquiring => "location-acquiring",
            PunchStage::Submitting => "submitting",
            PunchStage::Succeeded(_) => "succeeded",
            PunchStage::Failed(_) => "failed",
            PunchStage::Cancelled(_) => "cancelled",
        }
    }
}

/// Final result of one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum PunchOutcome {
    Succeeded(PunchResult),
    Failed(PunchError),
    Cancelled(CancelReason),
}

impl PunchOutcome {
    /// User-facing message; an aborted capture is silent
    pub fn notice(&self) -> Option<String> {
        match self {
            PunchOutcome::Succeeded(result) => Some(format!("Clocked {}", result.summary())),
            PunchOutcome::Failed(error) => Some(error.to_string()),
            PunchOutcome::Cancelled(CancelReason::PermissionDenied(permission)) => Some(format!(
                "The {} permission is required to clock in",
                permission
            )),
            PunchOutcome::Cancelled(CancelReason::CaptureAborted) => None,
        }
    }
}

impl From<PunchOutcome> for PunchStage {
    fn from(outcome: PunchOutcome) -> Self {
        match outcome {
            PunchOutcome::Succeeded(result) => PunchStage::Succeeded(result),
            PunchOutcome::Failed(error) => PunchStage::Failed(error),
            PunchOutcome::Cancelled(reason) => PunchStage::Cancelled(reason),
        }
    }
}

/// Runs punch attempts, one at a time.
///
/// A second [`run`](Self::run) while one is in flight is rejected with
/// [`PunchInProgress`] and has no effect on the running attempt. The lock
/// can be shared with [`with_lock`](Self::with_lock) so that every
/// orchestrator of one session counts as the same flight.
pub struct PunchOrchestrator {
    devices: Devices,
    submitter: Arc<dyn PunchSubmitter>,
    capture_dir: PathBuf,
    stage: Mutex<PunchStage>,
    events: broadcast::Sender<PunchStage>,
    in_flight: PunchLock,
}

impl PunchOrchestrator {
    pub fn new(
        devices: Devices,
        submitter: Arc<dyn PunchSubmitter>,
        capture_dir: impl Into<PathBuf>,
    ) -> Self {
        let (events, _) = broadcast::channel(STAGE_CHANNEL_CAPACITY);
        Self {
            devices,
            submitter,
            capture_dir: capture_dir.into(),
            stage: Mutex::new(PunchStage::Idle),
            events,
            in_flight: PunchLock::default(),
        }
    }

    /// Share the single-flight lock with other orchestrators
    pub fn with_lock(mut self, lock: PunchLock) -> Self {
        self.in_flight = lock;
        self
    }

    /// Claim the single-flight lock without starting an attempt
    pub fn reserve(&self) -> Result<PunchReservation, PunchInProgress> {
        let guard = self.in_flight.clone().try_lock_owned().map_err(|_| {
            warn!("Punch requested while another is in flight");
            PunchInProgress
        })?;
        Ok(PunchReservation { _guard: guard })
    }

    /// Current stage
    pub fn stage(&self) -> PunchStage {
        self.stage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Receive every stage transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PunchStage> {
        self.events.subscribe()
    }

    /// Run one attempt to its terminal stage, then return to `Idle`
    pub async fn run(&self, work_location_id: Option<i64>) -> Result<PunchOutcome, PunchInProgress> {
        let reservation = self.reserve()?;
        Ok(self.run_reserved(reservation, work_location_id).await)
    }

    /// Run one attempt under a reservation taken earlier with [`reserve`](Self::reserve)
    pub async fn run_reserved(
        &self,
        reservation: PunchReservation,
        work_location_id: Option<i64>,
    ) -> PunchOutcome {
        let _reservation = reservation;

        info!("Punch attempt started");
        let outcome = self.attempt(work_location_id).await;

        match &outcome {
            PunchOutcome::Succeeded(result) => info!("Punch succeeded: {}", result.summary()),
            PunchOutcome::Failed(e) => error!("Punch failed: {}", e),
            PunchOutcome::Cancelled(reason) => info!("Punch cancelled: {:?}", reason),
        }

        self.enter(outcome.clone().into());
        self.enter(PunchStage::Idle);
        outcome
    }

    async fn attempt(&self, work_location_id: Option<i64>) -> PunchOutcome {
        let permissions = &self.devices.permissions;

        if !permissions.is_granted(Permission::Location) {
            self.enter(PunchStage::LocationPermissionPending);
            if !permissions.request(Permission::Location).await {
                return PunchOutcome::Cancelled(CancelReason::PermissionDenied(
                    Permission::Location,
                ));
            }
        }

        self.enter(PunchStage::CameraPermissionPending);
        if !permissions.is_granted(Permission::Camera)
            && !permissions.request(Permission::Camera).await
        {
            return PunchOutcome::Cancelled(CancelReason::PermissionDenied(Permission::Camera));
        }

        self.enter(PunchStage::Capturing);
        // Owned by this attempt; the file is removed when it drops.
        let photo = match self.capture().await {
            Ok(Some(photo)) => photo,
            Ok(None) => return PunchOutcome::Cancelled(CancelReason::CaptureAborted),
            Err(e) => return PunchOutcome::Failed(e),
        };

        self.enter(PunchStage::LocationAcquiring);
        // Permission may have been revoked while the camera was open.
        if !permissions.is_granted(Permission::Location) {
            return PunchOutcome::Failed(PunchError::PermissionLost(Permission::Location));
        }
        let fix = match self.devices.location.last_known().await {
            Some(fix) if fix.is_valid() => fix,
            Some(fix) => {
                warn!("Discarding invalid location fix: {:?}", fix);
                return PunchOutcome::Failed(PunchError::LocationUnavailable);
            }
            None => return PunchOutcome::Failed(PunchError::LocationUnavailable),
        };
        debug!("Location fix: ({:.5}, {:.5})", fix.latitude, fix.longitude);

        self.enter(PunchStage::Submitting);
        let bytes = match tokio::fs::read(photo.path()).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                return PunchOutcome::Failed(PunchError::LocalResource(
                    "captured photo is empty".into(),
                ))
            }
            Err(e) => {
                return PunchOutcome::Failed(PunchError::LocalResource(format!(
                    "cannot read captured photo: {}",
                    e
                )))
            }
        };

        let punch = PhotoPunch {
            fix,
            work_location_id,
            photo: bytes,
        };
        match self.submitter.submit(punch).await {
            Ok(result) => PunchOutcome::Succeeded(result),
            Err(e) => PunchOutcome::Failed(e.into()),
        }
    }

    /// Allocate a fresh photo slot and hand it to the camera.
    ///
    /// `Ok(None)` means the user cancelled; the slot is released either way.
    async fn capture(&self) -> Result<Option<NamedTempFile>, PunchError> {
        let allocation_failed = |e: std::io::Error| {
            PunchError::LocalResource(format!("cannot allocate photo file: {}", e))
        };

        tokio::fs::create_dir_all(&self.capture_dir)
            .await
            .map_err(allocation_failed)?;
        let photo = tempfile::Builder::new()
            .prefix("face_")
            .suffix(".jpg")
            .tempfile_in(&self.capture_dir)
            .map_err(allocation_failed)?;
        debug!("Photo slot allocated at {:?}", photo.path());

        match self.devices.camera.capture(photo.path()).await {
            Ok(CaptureOutcome::Captured) => {
                let size = tokio::fs::metadata(photo.path())
                    .await
                    .map_err(|e| {
                        PunchError::LocalResource(format!("cannot read captured photo: {}", e))
                    })?
                    .len();
                if size == 0 {
                    return Err(PunchError::LocalResource("captured photo is empty".into()));
                }
                Ok(Some(photo))
            }
            Ok(CaptureOutcome::Cancelled) => Ok(None),
            Err(e) => Err(PunchError::LocalResource(format!("camera failed: {}", e))),
        }
    }

    fn enter(&self, stage: PunchStage) {
        debug!("Punch stage -> {}", stage.name());
        {
            let mut guard = self
                .stage
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = stage.clone();
        }
        // No subscribers is fine.
        let _ = self.events.send(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_keep_their_class() {
        assert_eq!(
            PunchError::from(ApiError::Network("connection refused".into())),
            PunchError::Network("connection refused".into())
        );
        assert_eq!(
            PunchError::from(ApiError::Server {
                status: 403,
                body: r#"{"detail":"Out of working hours"}"#.into(),
            }),
            PunchError::Rejected {
                status: 403,
                body: r#"{"detail":"Out of working hours"}"#.into(),
            }
        );
    }

    #[test]
    fn aborted_capture_has_no_notice() {
        assert_eq!(
            PunchOutcome::Cancelled(CancelReason::CaptureAborted).notice(),
            None
        );
        let denied = PunchOutcome::Cancelled(CancelReason::PermissionDenied(Permission::Camera))
            .notice()
            .unwrap();
        assert!(denied.contains("camera"));
    }

    #[test]
    fn success_notice_mentions_verdict() {
        let outcome = PunchOutcome::Succeeded(PunchResult {
            ok: true,
            within_geofence: false,
            distance_m: 240.5,
            punch_type: "OUT".into(),
            timestamp: "2024-01-01T17:00:00Z".into(),
            work_location: None,
        });
        assert_eq!(
            outcome.notice().unwrap(),
            "Clocked OUT at 2024-01-01T17:00:00Z, 240.5 m (outside geofence)"
        );
    }

    #[test]
    fn only_outcomes_are_terminal() {
        assert!(!PunchStage::Submitting.is_terminal());
        assert!(PunchStage::Cancelled(CancelReason::CaptureAborted).is_terminal());
        assert!(PunchStage::Failed(PunchError::LocationUnavailable).is_terminal());
    }
}
