use std::{sync::Arc, time::Duration};

use derivative::Derivative;
use lyra_cache::CacheConfig;
use lyra_net::{HttpClient, Net, NetExt};
use lyra_seek::SeekConfig;

use crate::error::LyraResult;

/// Everything needed to open sessions and coordinate seeks.
#[derive(Clone, Derivative)]
#[derivative(Debug, Default)]
pub struct LyraConfig {
    pub cache: CacheConfig,
    pub seek: SeekConfig,
    /// How long a replaced session keeps serving in-flight reads.
    #[derivative(Default(value = "Duration::from_secs(2)"))]
    pub grace_period: Duration,
}

impl LyraConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_seek(mut self, seek: SeekConfig) -> Self {
        self.seek = seek;
        self
    }

    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// reqwest client with the timeout and retry layers from `cache.net`.
    ///
    /// # Errors
    ///
    /// When the HTTP client cannot be built.
    pub fn http_client(&self) -> LyraResult<Arc<dyn Net>> {
        let options = self.cache.net.clone();
        let client = HttpClient::new(options.clone())?
            .with_timeout(options.request_timeout)
            .with_retry(options.retry_policy);
        Ok(Arc::new(client))
    }
}
