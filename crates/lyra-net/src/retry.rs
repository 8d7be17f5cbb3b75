use std::future::Future;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;
#[cfg(test)]
use unimock::unimock;
use url::Url;

use crate::{
    ByteStream,
    error::{NetError, NetResult},
    traits::Net,
    types::{Headers, RangeSpec, RetryPolicy},
};

#[cfg_attr(test, unimock(api = RetryClassifierMock))]
pub trait RetryClassifier: Send + Sync {
    fn should_retry(&self, error: &NetError) -> bool;
}

/// Classifies by [`NetError::is_retryable`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRetryClassifier;

impl RetryClassifier for DefaultRetryClassifier {
    fn should_retry(&self, error: &NetError) -> bool {
        error.is_retryable()
    }
}

/// Retry decorator for Net implementations.
///
/// Waits `policy.delay_for_attempt(n)` between attempts, or the server's
/// `Retry-After` hint when that is longer, capped at `policy.max_delay`.
pub struct RetryNet<N, C> {
    inner: N,
    classifier: C,
    policy: RetryPolicy,
}

impl<N: Net, C: RetryClassifier> RetryNet<N, C> {
    pub fn new(inner: N, classifier: C, policy: RetryPolicy) -> Self {
        Self {
            inner,
            classifier,
            policy,
        }
    }

    async fn run<T, F, Fut>(&self, mut op: F) -> NetResult<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = NetResult<T>> + Send,
    {
        let mut attempt = 0;
        loop {
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !self.classifier.should_retry(&error) {
                return Err(error);
            }
            if attempt >= self.policy.max_retries {
                return Err(NetError::RetryExhausted {
                    max_retries: self.policy.max_retries,
                    source: Box::new(error),
                });
            }

            attempt += 1;
            let backoff = self.policy.delay_for_attempt(attempt);
            let delay = error
                .retry_after()
                .map_or(backoff, |hint| hint.max(backoff))
                .min(self.policy.max_delay);
            debug!(attempt, ?delay, %error, "retrying request");
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl<N: Net, C: RetryClassifier> Net for RetryNet<N, C> {
    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<ByteStream, NetError> {
        self.run(|| {
            self.inner
                .get_range(url.clone(), range.clone(), headers.clone())
        })
        .await
    }

    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError> {
        self.run(|| self.inner.head(url.clone(), headers.clone()))
            .await
    }

    async fn probe_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<Headers, NetError> {
        self.run(|| {
            self.inner
                .probe_range(url.clone(), range.clone(), headers.clone())
        })
        .await
    }
}
