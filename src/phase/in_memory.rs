use super::*;
use parking_lot::Mutex;

/// Fake in-memory phase store.
///
/// Useful for unit-tests.
#[derive(Default)]
pub struct InMemoryPhaseStore {
    value: Mutex<Option<String>>,
}

impl InMemoryPhaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedPhaseStore {
        Arc::new(Self::new())
    }
}

impl PhaseStore for InMemoryPhaseStore {
    fn load_raw(&self) -> Result<Option<String>> {
        Ok(self.value.lock().clone())
    }

    fn store_raw(&self, value: &str) -> Result<()> {
        *self.value.lock() = Some(value.to_owned());
        Ok(())
    }
}
