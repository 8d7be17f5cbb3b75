#![forbid(unsafe_code)]

//! Range-addressable HTTP access for the streaming cache.

mod client;
mod error;
mod fetcher;
mod retry;
mod timeout;
mod traits;
mod types;

pub use crate::{
    client::HttpClient,
    error::{NetError, NetResult},
    fetcher::{RangeFetcher, ResourceInfo, parse_content_range_total},
    retry::{DefaultRetryClassifier, RetryClassifier, RetryNet},
    timeout::TimeoutNet,
    traits::{ByteStream, Net, NetExt},
    types::{Headers, NetOptions, RangeSpec, RetryPolicy},
};
