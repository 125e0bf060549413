/// Image handle with upload readiness

use std::sync::Arc;
use crate::device::{ImageDesc, RawImage};
use crate::memory::Readiness;

pub struct ImageHandle {
    raw: Arc<dyn RawImage>,
    readiness: Readiness,
}

impl ImageHandle {
    pub fn new(raw: Arc<dyn RawImage>) -> Arc<Self> {
        Arc::new(Self {
            raw,
            readiness: Readiness::new(),
        })
    }

    pub fn raw(&self) -> &Arc<dyn RawImage> {
        &self.raw
    }

    pub fn native(&self) -> u64 {
        self.raw.native()
    }

    pub fn desc(&self) -> &ImageDesc {
        self.raw.desc()
    }

    /// Whether every upload enqueued into this image has been submitted
    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub(crate) fn readiness(&self) -> &Readiness {
        &self.readiness
    }
}
