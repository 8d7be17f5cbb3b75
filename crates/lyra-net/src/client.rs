use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, Response, StatusCode, header};
use tracing::trace;
use url::Url;

use crate::{
    ByteStream,
    error::{NetError, NetResult},
    traits::Net,
    types::{Headers, NetOptions, RangeSpec},
};

/// reqwest-backed [`Net`] implementation.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns [`NetError::Http`] if the underlying client cannot be built.
    pub fn new(options: NetOptions) -> NetResult<Self> {
        let inner = Client::builder()
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .connect_timeout(options.request_timeout)
            .build()
            .map_err(|e| NetError::http(e.to_string()))?;
        Ok(Self { inner, options })
    }

    #[must_use]
    pub fn options(&self) -> &NetOptions {
        &self.options
    }

    fn apply_headers(
        mut req: reqwest::RequestBuilder,
        headers: Option<Headers>,
    ) -> reqwest::RequestBuilder {
        if let Some(headers) = headers {
            for (k, v) in headers.iter() {
                req = req.header(k, v);
            }
        }
        req
    }

    fn collect_headers(resp: &Response) -> Headers {
        let mut out = Headers::new();
        for (name, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                out.insert(name.as_str(), v);
            }
        }
        out
    }

    fn status_error(url: &Url, resp: &Response) -> NetError {
        let retry_after = resp
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        NetError::HttpStatus {
            status: resp.status().as_u16(),
            url: url.to_string(),
            retry_after,
        }
    }

    async fn send_range(
        &self,
        url: &Url,
        range: &RangeSpec,
        headers: Option<Headers>,
    ) -> NetResult<Response> {
        let req = self
            .inner
            .get(url.clone())
            .header(header::RANGE, range.to_header_value());
        let req = Self::apply_headers(req, headers);

        let resp = req.send().await?;
        let status = resp.status();
        trace!(%url, range = %range.to_header_value(), status = status.as_u16(), "range response");

        if status == StatusCode::PARTIAL_CONTENT {
            return Ok(resp);
        }
        if status.is_success() {
            // A 200 carries the whole body; only usable when the range starts at zero.
            if range.start == 0 {
                return Ok(resp);
            }
            return Err(NetError::InvalidRange(format!(
                "server ignored range {} for {url}",
                range.to_header_value()
            )));
        }
        Err(Self::status_error(url, &resp))
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<ByteStream, NetError> {
        let resp = self.send_range(&url, &range, headers).await?;
        let stream = resp.bytes_stream().map_err(NetError::from);
        Ok(Box::pin(stream))
    }

    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError> {
        let req = self.inner.head(url.clone());
        let req = Self::apply_headers(req, headers);
        let req = req.timeout(self.options.request_timeout);

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Self::status_error(&url, &resp));
        }

        Ok(Self::collect_headers(&resp))
    }

    async fn probe_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<Headers, NetError> {
        let resp = self.send_range(&url, &range, headers).await?;
        Ok(Self::collect_headers(&resp))
    }
}
