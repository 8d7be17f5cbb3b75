use std::{fmt, ops::Range, sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::{debug, trace};
use url::Url;

use crate::{
    error::{NetError, NetResult},
    traits::Net,
    types::{Headers, RangeSpec},
};

/// Size and range capability of a remote resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceInfo {
    pub total_size: u64,
    pub accepts_ranges: bool,
}

/// Fetches exact byte ranges of one remote resource.
///
/// Cheap to clone; clones share the underlying [`Net`] client.
#[derive(Clone)]
pub struct RangeFetcher {
    net: Arc<dyn Net>,
    url: Url,
    headers: Option<Headers>,
    body_timeout: Duration,
}

impl fmt::Debug for RangeFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeFetcher")
            .field("url", &self.url.as_str())
            .field("body_timeout", &self.body_timeout)
            .finish_non_exhaustive()
    }
}

impl RangeFetcher {
    pub fn new(net: Arc<dyn Net>, url: Url) -> Self {
        Self {
            net,
            url,
            headers: None,
            body_timeout: Duration::from_secs(15),
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    #[must_use]
    pub fn with_body_timeout(mut self, timeout: Duration) -> Self {
        self.body_timeout = timeout;
        self
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch exactly `range` (half-open) of the resource.
    ///
    /// # Errors
    ///
    /// [`NetError::InvalidRange`] for an empty range, [`NetError::Timeout`] when
    /// the body is not received within the body timeout, and
    /// [`NetError::ShortBody`] when fewer bytes arrive than requested.
    pub async fn fetch(&self, range: Range<u64>) -> NetResult<Bytes> {
        let spec = RangeSpec::from_range(&range)
            .ok_or_else(|| NetError::InvalidRange(format!("empty range {range:?}")))?;
        let expected = range.end - range.start;

        let body = tokio::time::timeout(self.body_timeout, self.read_body(spec, expected))
            .await
            .map_err(|_| NetError::Timeout)??;

        let got = body.len() as u64;
        if got != expected {
            return Err(NetError::ShortBody { expected, got });
        }
        trace!(start = range.start, end = range.end, "range fetched");
        Ok(body)
    }

    async fn read_body(&self, spec: RangeSpec, expected: u64) -> NetResult<Bytes> {
        let mut stream = self
            .net
            .get_range(self.url.clone(), spec, self.headers.clone())
            .await?;

        let capacity = usize::try_from(expected).unwrap_or(usize::MAX);
        let mut buf = BytesMut::with_capacity(capacity);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let room = capacity - buf.len();
            if chunk.len() >= room {
                // Servers answering 200 for a zero-based range send the whole body.
                buf.extend_from_slice(&chunk[..room]);
                break;
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Discover the total size of the resource.
    ///
    /// Uses HEAD `Content-Length` first and falls back to a one-byte range
    /// probe reading the total from `Content-Range`.
    ///
    /// # Errors
    ///
    /// Returns the probe's [`NetError`], or [`NetError::InvalidRange`] when no
    /// usable size is reported.
    pub async fn probe(&self) -> NetResult<ResourceInfo> {
        match self.net.head(self.url.clone(), self.headers.clone()).await {
            Ok(headers) => {
                if let Some(total_size) = headers.content_length().filter(|len| *len > 0) {
                    debug!(url = %self.url, total_size, "size from HEAD");
                    return Ok(ResourceInfo {
                        total_size,
                        accepts_ranges: headers.accepts_byte_ranges(),
                    });
                }
                debug!(url = %self.url, "HEAD without length, probing range");
            }
            Err(error) if !error.is_retryable() && error.status_code().is_some_and(|s| s != 405) => {
                return Err(error);
            }
            Err(error) => debug!(url = %self.url, %error, "HEAD failed, probing range"),
        }

        let headers = self
            .net
            .probe_range(
                self.url.clone(),
                RangeSpec::new(0, Some(0)),
                self.headers.clone(),
            )
            .await?;
        let total_size = headers
            .get("content-range")
            .and_then(parse_content_range_total)
            .filter(|len| *len > 0)
            .ok_or_else(|| {
                NetError::InvalidRange(format!("no usable size reported for {}", self.url))
            })?;
        debug!(url = %self.url, total_size, "size from range probe");
        Ok(ResourceInfo {
            total_size,
            accepts_ranges: true,
        })
    }
}

/// Total length from a `Content-Range` value such as `bytes 0-0/1234`.
///
/// Returns `None` for an unknown (`*`) or malformed total.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.rsplit_once('/')?;
    total.trim().parse().ok()
}
