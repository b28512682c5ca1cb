//! Headless device adapters used by the command-line shell.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::capture::{Camera, CaptureOutcome, LocationProvider, Permission, PermissionGate};
use crate::models::LocationFix;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Permissions fixed up front; a prompt answers with the standing decision
#[derive(Debug)]
pub struct StaticPermissions {
    location: AtomicBool,
    camera: AtomicBool,
}

impl StaticPermissions {
    pub fn new(location: bool, camera: bool) -> Self {
        Self {
            location: AtomicBool::new(location),
            camera: AtomicBool::new(camera),
        }
    }

    pub fn set(&self, permission: Permission, granted: bool) {
        self.flag(permission).store(granted, Ordering::SeqCst);
    }

    fn flag(&self, permission: Permission) -> &AtomicBool {
        match permission {
            Permission::Location => &self.location,
            Permission::Camera => &self.camera,
        }
    }
}

#[async_trait]
impl PermissionGate for StaticPermissions {
    fn is_granted(&self, permission: Permission) -> bool {
        self.flag(permission).load(Ordering::SeqCst)
    }

    async fn request(&self, permission: Permission) -> bool {
        let granted = self.is_granted(permission);
        info!("Permission {} requested: granted={}", permission, granted);
        granted
    }
}

/// "Captures" by copying an existing JPEG; no source means the user backed out
#[derive(Debug, Clone)]
pub struct FileCamera {
    source: Option<PathBuf>,
}

impl FileCamera {
    pub fn new(source: Option<PathBuf>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Camera for FileCamera {
    async fn capture(&self, destination: &Path) -> std::io::Result<CaptureOutcome> {
        let Some(source) = &self.source else {
            debug!("No photo supplied, treating as cancelled capture");
            return Ok(CaptureOutcome::Cancelled);
        };

        let bytes = tokio::fs::read(source).await?;
        if !bytes.starts_with(&JPEG_MAGIC) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not a JPEG image", source.display()),
            ));
        }

        tokio::fs::write(destination, &bytes).await?;
        debug!("Copied {} bytes from {:?}", bytes.len(), source);
        Ok(CaptureOutcome::Captured)
    }
}

/// Location provider returning a preset fix
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation {
    fix: Option<LocationFix>,
}

impl FixedLocation {
    pub fn new(fix: Option<LocationFix>) -> Self {
        Self { fix }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn last_known(&self) -> Option<LocationFix> {
        self.fix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_permissions_answer_prompts_with_current_state() {
        let permissions = StaticPermissions::new(true, false);
        assert!(permissions.request(Permission::Location).await);
        assert!(!permissions.request(Permission::Camera).await);

        permissions.set(Permission::Location, false);
        assert!(!permissions.is_granted(Permission::Location));
    }

    #[tokio::test]
    async fn file_camera_without_source_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = FileCamera::new(None)
            .capture(&dir.path().join("out.jpg"))
            .await
            .unwrap();
        assert_eq!(outcome, CaptureOutcome::Cancelled);
        assert!(!dir.path().join("out.jpg").exists());
    }

    #[tokio::test]
    async fn file_camera_copies_jpeg_and_rejects_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let jpeg = dir.path().join("face.jpg");
        std::fs::write(&jpeg, [0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]).unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"hello").unwrap();

        let destination = dir.path().join("slot.jpg");
        let outcome = FileCamera::new(Some(jpeg)).capture(&destination).await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Captured);
        assert_eq!(std::fs::read(&destination).unwrap().len(), 7);

        let err = FileCamera::new(Some(text))
            .capture(&destination)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
