use url::Url;

/// A remote audio object. Immutable for the lifetime of one cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resource {
    pub id: String,
    pub url: Url,
    /// Known size, or `None` to probe it at open.
    pub total_size: Option<u64>,
}

impl Resource {
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            total_size: None,
        }
    }

    #[must_use]
    pub fn with_total_size(mut self, total_size: u64) -> Self {
        self.total_size = Some(total_size);
        self
    }
}
