//! Resident program placement and lifecycle
//!
//! The resident program is linked to run at [`PROGRAM_ADDR`] and expects the
//! mailbox right below it, so the working area must land exactly at
//! [`MAILBOX_ADDR`]. A [`LoaderSession`] lives for one top-level bank
//! operation: [`LoaderController::init`] places and starts the image,
//! [`LoaderController::quit`] halts the core and frees the area.

use alloc::borrow::Cow;
use alloc::format;
use alloc::vec::Vec;

use log::{debug, warn};
use maybe_async::maybe_async;

use esio_core::engine::EngineKind;
use esio_core::mailbox::{MAILBOX_ADDR, PROGRAM_ADDR, PROGRAM_SIZE, WORKING_AREA_SIZE};

use crate::error::{HostError, Result};
use crate::target::{DebugTarget, WorkingArea};

/// Source of resident program images, one per engine
pub trait ImageProvider {
    /// Raw image for `kind`, linked to run at [`PROGRAM_ADDR`]
    fn image(&self, kind: EngineKind) -> Result<Cow<'_, [u8]>>;
}

/// Images held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticImages {
    images: Vec<(EngineKind, Vec<u8>)>,
}

impl StaticImages {
    /// No images
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the image for `kind`
    pub fn with(mut self, kind: EngineKind, image: Vec<u8>) -> Self {
        self.images.retain(|(k, _)| *k != kind);
        self.images.push((kind, image));
        self
    }
}

impl ImageProvider for StaticImages {
    fn image(&self, kind: EngineKind) -> Result<Cow<'_, [u8]>> {
        self.images
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, image)| Cow::Borrowed(image.as_slice()))
            .ok_or_else(|| HostError::Image(format!("no {} image loaded", kind)))
    }
}

/// Images read from `esio-resident-<engine>.bin` files in a directory
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct ImageDir {
    dir: std::path::PathBuf,
}

#[cfg(feature = "std")]
impl ImageDir {
    /// Images under `dir`
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File name of the image for `kind`
    pub fn file_name(kind: EngineKind) -> alloc::string::String {
        format!("esio-resident-{}.bin", kind.name())
    }
}

#[cfg(feature = "std")]
impl ImageProvider for ImageDir {
    fn image(&self, kind: EngineKind) -> Result<Cow<'_, [u8]>> {
        let path = self.dir.join(Self::file_name(kind));
        std::fs::read(&path)
            .map(Cow::Owned)
            .map_err(|e| HostError::Image(format!("{}: {}", path.display(), e)))
    }
}

/// A resident program placed in target RAM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSession {
    /// Area holding mailbox, buffer and image
    pub area: WorkingArea,
    /// Engine the running image drives
    pub engine: EngineKind,
    /// Whether the image was started
    pub running: bool,
}

/// Places, starts and stops the resident program
#[derive(Debug)]
pub struct LoaderController {
    session: Option<LoaderSession>,
    timeout_ms: u32,
}

impl LoaderController {
    /// Controller whose `quit` waits at most `timeout_ms` for the core
    pub fn new(timeout_ms: u32) -> Self {
        Self {
            session: None,
            timeout_ms,
        }
    }

    /// Current session, if any
    pub fn session(&self) -> Option<&LoaderSession> {
        self.session.as_ref()
    }

    /// Place `image` for `engine` and start it
    ///
    /// Frees any area left from an earlier session first. Any failure frees
    /// the new area again.
    #[maybe_async]
    pub async fn init<T: DebugTarget>(&mut self, target: &mut T, engine: EngineKind, image: &[u8]) -> Result<()> {
        if let Some(old) = self.session.take() {
            target.free_working_area(old.area);
        }
        if image.len() > PROGRAM_SIZE {
            return Err(HostError::Image(format!(
                "{} image is {} bytes, limit {}",
                engine,
                image.len(),
                PROGRAM_SIZE
            )));
        }

        let area = target
            .alloc_working_area(WORKING_AREA_SIZE)
            .map_err(|e| HostError::ResourceUnavailable(format!("{:?}", e)))?;
        if area.address != MAILBOX_ADDR {
            target.free_working_area(area);
            return Err(HostError::ResourceUnavailable(format!(
                "working area at 0x{:08X}, resident program needs 0x{:08X}",
                area.address, MAILBOX_ADDR
            )));
        }

        if let Err(e) = target.write_memory(PROGRAM_ADDR, image).await {
            warn!("Failed to load {} resident program", engine);
            target.free_working_area(area);
            return Err(e.into());
        }
        if let Err(e) = target.start_algorithm(PROGRAM_ADDR).await {
            warn!("Failed to start {} resident program", engine);
            target.free_working_area(area);
            return Err(e.into());
        }

        debug!("{} resident program running at 0x{:08X}", engine, PROGRAM_ADDR);
        self.session = Some(LoaderSession {
            area,
            engine,
            running: true,
        });
        Ok(())
    }

    /// Halt the core, wait for the algorithm to exit and free the area
    ///
    /// The area is freed even when the wait fails.
    #[maybe_async]
    pub async fn quit<T: DebugTarget>(&mut self, target: &mut T) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let halted = target.halt().await;
        let waited = target.wait_algorithm(self.timeout_ms).await;
        target.free_working_area(session.area);
        debug!("{} resident program stopped", session.engine);
        halted?;
        waited?;
        Ok(())
    }
}

#[cfg(all(test, feature = "is_sync"))]
mod tests {
    use super::*;
    use crate::test_support::MockTarget;
    use alloc::vec;

    #[test]
    fn test_init_places_image_and_quit_frees() {
        let mut target = MockTarget::new();
        let mut loader = LoaderController::new(100);
        loader.init(&mut target, EngineKind::Spim, &[0xC3; 16]).unwrap();

        let off = (PROGRAM_ADDR - MAILBOX_ADDR) as usize;
        assert_eq!(&target.area[off..off + 16], &[0xC3; 16]);
        assert_eq!(target.starts, 1);
        assert!(!target.halted);
        assert_eq!(loader.session().map(|s| s.engine), Some(EngineKind::Spim));

        loader.quit(&mut target).unwrap();
        assert!(target.halted);
        assert_eq!(target.frees, 1);
        assert!(loader.session().is_none());
        loader.quit(&mut target).unwrap();
        assert_eq!(target.halts, 1);
    }

    #[test]
    fn test_reinit_frees_previous_area() {
        let mut target = MockTarget::new();
        let mut loader = LoaderController::new(100);
        loader.init(&mut target, EngineKind::Fiu, &[0; 8]).unwrap();
        loader.init(&mut target, EngineKind::Fiu, &[0; 8]).unwrap();
        assert_eq!(target.allocs, 2);
        assert_eq!(target.frees, 1);
    }

    #[test]
    fn test_oversized_image_rejected() {
        let mut target = MockTarget::new();
        let mut loader = LoaderController::new(100);
        let image = vec![0; PROGRAM_SIZE + 1];
        let err = loader.init(&mut target, EngineKind::Fiu, &image).unwrap_err();
        assert!(matches!(err, HostError::Image(_)));
        assert_eq!(target.allocs, 0);
    }

    #[test]
    fn test_static_images_lookup() {
        let images = StaticImages::new().with(EngineKind::Fiu, vec![1, 2]);
        assert_eq!(&*images.image(EngineKind::Fiu).unwrap(), &[1, 2]);
        assert!(matches!(images.image(EngineKind::Spim), Err(HostError::Image(_))));
    }
}
