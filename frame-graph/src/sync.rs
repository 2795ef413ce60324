use crate::{FrameGraphError, QueueId, RawFence, RawSemaphore, RenderDevice, Result, SemaphoreOp};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPrimitiveType {
    Fence,
    Semaphore,
}

/// CPU-observable completion primitive. Destroyed through the device on drop.
pub struct Fence {
    raw: RawFence,
    device: Arc<dyn RenderDevice>,
}

impl Fence {
    pub fn new(device: Arc<dyn RenderDevice>, signaled: bool) -> Result<Self> {
        let raw = device.create_fence(signaled)?;
        Ok(Self { raw, device })
    }

    pub fn raw(&self) -> RawFence {
        self.raw
    }

    pub fn wait(&self) -> Result<()> {
        Ok(self.device.wait_fence(self.raw)?)
    }

    pub fn signal(&self) -> Result<()> {
        Ok(self.device.signal_fence(self.raw)?)
    }

    pub fn reset(&self) -> Result<()> {
        Ok(self.device.reset_fence(self.raw)?)
    }

    pub fn is_signaled(&self) -> bool {
        self.device.is_fence_signaled(self.raw)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.raw);
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Fence").field(&self.raw).finish()
    }
}

/// GPU-only timeline semaphore. Destroyed through the device on drop.
pub struct Semaphore {
    raw: RawSemaphore,
    device: Arc<dyn RenderDevice>,
}

impl Semaphore {
    pub fn new(device: Arc<dyn RenderDevice>) -> Result<Self> {
        let raw = device.create_semaphore()?;
        Ok(Self { raw, device })
    }

    pub fn raw(&self) -> RawSemaphore {
        self.raw
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.raw);
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Semaphore").field(&self.raw).finish()
    }
}

/// Either a fence or a semaphore. The kind is fixed at construction; the
/// CPU-side operations are only meaningful for fences.
#[derive(Debug)]
pub enum SyncPoint {
    Fence(Fence),
    Semaphore(Semaphore),
}

impl SyncPoint {
    pub fn new(device: Arc<dyn RenderDevice>, kind: SyncPrimitiveType) -> Result<Self> {
        match kind {
            SyncPrimitiveType::Fence => Ok(Self::Fence(Fence::new(device, false)?)),
            SyncPrimitiveType::Semaphore => Ok(Self::Semaphore(Semaphore::new(device)?)),
        }
    }

    pub fn kind(&self) -> SyncPrimitiveType {
        match self {
            Self::Fence(_) => SyncPrimitiveType::Fence,
            Self::Semaphore(_) => SyncPrimitiveType::Semaphore,
        }
    }

    pub fn as_fence(&self) -> Option<&Fence> {
        match self {
            Self::Fence(fence) => Some(fence),
            Self::Semaphore(_) => None,
        }
    }

    pub fn as_semaphore(&self) -> Option<&Semaphore> {
        match self {
            Self::Semaphore(semaphore) => Some(semaphore),
            Self::Fence(_) => None,
        }
    }

    fn fence(&self, operation: &'static str) -> Result<&Fence> {
        self.as_fence()
            .ok_or(FrameGraphError::NotAFence { operation })
    }

    pub fn wait(&self) -> Result<()> {
        self.fence("wait")?.wait()
    }

    pub fn signal(&self) -> Result<()> {
        self.fence("signal")?.signal()
    }

    pub fn reset(&self) -> Result<()> {
        self.fence("reset")?.reset()
    }

    pub fn is_signaled(&self) -> Result<bool> {
        Ok(self.fence("is_signaled")?.is_signaled())
    }
}

/// Semaphore pair linking a producer queue to a consumer queue.
///
/// The producer's batch signals `signal_semaphore` at `signal_value`; the
/// consumer's batch waits on `wait_semaphore` for `wait_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSyncPoint {
    pub producer: QueueId,
    pub consumer: QueueId,
    pub wait_semaphore: Option<RawSemaphore>,
    pub signal_semaphore: Option<RawSemaphore>,
    pub wait_value: u64,
    pub signal_value: u64,
}

impl QueueSyncPoint {
    pub fn wait_op(&self) -> Option<SemaphoreOp> {
        self.wait_semaphore.map(|semaphore| SemaphoreOp {
            semaphore,
            value: self.wait_value,
        })
    }

    pub fn signal_op(&self) -> Option<SemaphoreOp> {
        self.signal_semaphore.map(|semaphore| SemaphoreOp {
            semaphore,
            value: self.signal_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeadlessDevice;

    #[test]
    fn fence_operations_on_semaphore_fail() {
        let device: Arc<dyn RenderDevice> = Arc::new(HeadlessDevice::new());
        let point = SyncPoint::new(device, SyncPrimitiveType::Semaphore).unwrap();

        assert_eq!(point.kind(), SyncPrimitiveType::Semaphore);
        assert!(matches!(
            point.wait(),
            Err(FrameGraphError::NotAFence { operation: "wait" })
        ));
        assert!(point.reset().is_err());
        assert!(point.as_semaphore().is_some());
    }

    #[test]
    fn fence_signal_wait_reset() {
        let device: Arc<dyn RenderDevice> = Arc::new(HeadlessDevice::new());
        let point = SyncPoint::new(device, SyncPrimitiveType::Fence).unwrap();

        assert!(!point.is_signaled().unwrap());
        assert!(point.wait().is_err());
        point.signal().unwrap();
        point.wait().unwrap();
        point.reset().unwrap();
        assert!(!point.is_signaled().unwrap());
    }

    #[test]
    fn dropping_releases_device_objects() {
        let headless = Arc::new(HeadlessDevice::new());
        let device: Arc<dyn RenderDevice> = headless.clone();
        {
            let _fence = Fence::new(device.clone(), true).unwrap();
            let _semaphore = Semaphore::new(device).unwrap();
            assert_eq!(headless.live_fence_count(), 1);
            assert_eq!(headless.live_semaphore_count(), 1);
        }
        assert_eq!(headless.live_fence_count(), 0);
        assert_eq!(headless.live_semaphore_count(), 0);
    }
}
