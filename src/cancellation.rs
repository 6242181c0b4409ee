use crate::error::{ConvertError, ConvertResult};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Shared interruption flag. Clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn check_cancelled(&self, stage: &'static str) -> ConvertResult<()> {
        if self.is_cancelled() {
            return Err(ConvertError::Interrupted { stage });
        }
        Ok(())
    }
}
