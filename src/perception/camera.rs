use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::{DateTime, Utc};
use image::RgbImage;
use log::{info, warn};

use crate::error::{VerificationError, VerificationResult};

/// A single camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }
}

/// Platform camera backend. `open` fails on permission denial or when no
/// device is present; `close` must release the device.
pub trait FrameSource: Send + 'static {
    fn open(&mut self) -> Result<()>;
    fn next_frame(&mut self) -> Result<Frame>;
    fn close(&mut self);
}

type Slot = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<Box<dyn FrameSource>>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Owner of a camera backend. At most one [`CameraLease`] exists per device;
/// the backend lives in the lease while it is held and returns to the device
/// when the lease drops.
#[derive(Clone)]
pub struct CameraDevice {
    name: Arc<str>,
    slot: Slot,
}

impl CameraDevice {
    pub fn new(name: &str, source: impl FrameSource) -> Self {
        Self {
            name: Arc::from(name),
            slot: Arc::new(Mutex::new(Some(Box::new(source)))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when no lease is outstanding.
    pub fn is_free(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    pub fn acquire(&self) -> VerificationResult<CameraLease> {
        let mut source = lock_slot(&self.slot)
            .take()
            .ok_or(VerificationError::CameraBusy)?;

        if let Err(err) = source.open() {
            warn!("camera '{}' failed to open: {err:#}", self.name);
            *lock_slot(&self.slot) = Some(source);
            return Err(VerificationError::CameraUnavailable(format!("{err:#}")));
        }

        info!("camera '{}' acquired", self.name);
        Ok(CameraLease {
            name: Arc::clone(&self.name),
            source: Some(source),
            slot: Arc::clone(&self.slot),
        })
    }
}

/// Exclusive, scoped access to a camera. Dropping the lease closes the
/// device on every exit path, unwinding included.
pub struct CameraLease {
    name: Arc<str>,
    source: Option<Box<dyn FrameSource>>,
    slot: Slot,
}

impl CameraLease {
    pub fn next_frame(&mut self) -> VerificationResult<Frame> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| VerificationError::CameraUnavailable("lease already released".into()))?;
        source
            .next_frame()
            .map_err(|err| VerificationError::CameraUnavailable(format!("{err:#}")))
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
            *lock_slot(&self.slot) = Some(source);
            info!("camera '{}' released", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingSource {
        deny: bool,
        opens: Arc<AtomicUsize>,
        open_now: Arc<AtomicBool>,
    }

    impl FrameSource for CountingSource {
        fn open(&mut self) -> Result<()> {
            if self.deny {
                anyhow::bail!("permission denied");
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.open_now.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Frame> {
            Ok(Frame::new(RgbImage::new(4, 4)))
        }

        fn close(&mut self) {
            self.open_now.store(false, Ordering::SeqCst);
        }
    }

    fn device(deny: bool) -> (CameraDevice, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let open_now = Arc::new(AtomicBool::new(false));
        let source = CountingSource {
            deny,
            opens: Arc::clone(&opens),
            open_now: Arc::clone(&open_now),
        };
        (CameraDevice::new("test", source), opens, open_now)
    }

    #[test]
    fn second_lease_is_refused_until_first_drops() {
        let (camera, opens, open_now) = device(false);

        let mut lease = camera.acquire().unwrap();
        assert!(open_now.load(Ordering::SeqCst));
        assert!(lease.next_frame().is_ok());
        assert_eq!(camera.acquire().err(), Some(VerificationError::CameraBusy));

        drop(lease);
        assert!(!open_now.load(Ordering::SeqCst));
        assert!(camera.is_free());

        let _again = camera.acquire().unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn denied_open_returns_source_to_device() {
        let (camera, _, _) = device(true);
        let err = camera.acquire().err().unwrap();
        assert!(matches!(err, VerificationError::CameraUnavailable(_)));
        assert!(camera.is_free());
    }

    #[test]
    fn lease_is_released_when_holder_panics() {
        let (camera, _, open_now) = device(false);
        let cam = camera.clone();
        let result = std::thread::spawn(move || {
            let _lease = cam.acquire().unwrap();
            panic!("inference blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!open_now.load(Ordering::SeqCst));
        assert!(camera.is_free());
    }
}
