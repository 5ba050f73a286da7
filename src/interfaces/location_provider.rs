use async_trait::async_trait;
use crate::types::location::LocationSnapshot;

/// Source of the device's last known position. `None` means unavailable,
/// which alerts tolerate.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn last_known(&self) -> Option<LocationSnapshot>;
}

/// Provider that always answers with the same snapshot.
pub struct FixedLocation {
    snapshot: Option<LocationSnapshot>,
}

impl FixedLocation {
    pub fn new(snapshot: Option<LocationSnapshot>) -> Self {
        FixedLocation { snapshot }
    }

    pub fn unavailable() -> Self {
        FixedLocation { snapshot: None }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn last_known(&self) -> Option<LocationSnapshot> {
        self.snapshot.clone()
    }
}
