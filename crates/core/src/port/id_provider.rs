// Instance ID Provider Port (for deterministic testing)

/// Produces the instance id stamped on every new registration
pub trait IdProvider: Send + Sync {
    fn instance_id(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn instance_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

pub mod mocks {
    use super::IdProvider;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Deterministic ids: `inst-1`, `inst-2`, ...
    #[derive(Default)]
    pub struct SequentialIdProvider {
        next: AtomicU64,
    }

    impl SequentialIdProvider {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl IdProvider for SequentialIdProvider {
        fn instance_id(&self) -> String {
            format!("inst-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }
}
