/// Which download worker serves a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Foreground worker for startup and user-visible content.
    #[default]
    Active,
    /// Background worker for prefetching.
    Idle,
}

/// Per-request loading hints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadHints {
    /// Open containers and extract objects immediately instead of queueing
    /// them for [`update`](crate::BundleAssetProvider::update).
    pub synchronized: bool,
    pub lane:         Lane,
}

impl LoadHints {
    pub fn synchronized() -> Self {
        Self {
            synchronized: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn lane(mut self, lane: Lane) -> Self {
        self.lane = lane;
        self
    }
}
