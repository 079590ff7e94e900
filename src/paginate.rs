use crate::{
    config::Api,
    fetch::{FetchError, Fetcher},
    record::{MediaKind, PageResult, Query, Record},
    util::StatusLine,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One page of a paginated catalog query.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn fetch_page(
        &mut self,
        kind: MediaKind,
        query: &Query,
        page: u32,
    ) -> Result<PageResult, FetchError>;
}

pub struct TmdbSource {
    fetcher: Fetcher,
    base_url: String,
    api_key: String,
}

impl TmdbSource {
    pub fn new(api: &Api, fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            api_key: api.resolve_key(),
        }
    }
}

impl PageSource for TmdbSource {
    async fn fetch_page(
        &mut self,
        kind: MediaKind,
        query: &Query,
        page: u32,
    ) -> Result<PageResult, FetchError> {
        let url = format!("{}/{}", self.base_url, query.endpoint(kind));
        let params = query.params(&self.api_key, page);
        self.fetcher.get_json(&url, &params).await
    }
}

pub struct Paginator<S: PageSource> {
    source: S,
    page_delay: Duration,
    max_page: u32,
    cancel: CancellationToken,
    status: StatusLine,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S, page_delay: Duration, cancel: CancellationToken) -> Self {
        Self {
            source,
            page_delay,
            max_page: u32::MAX,
            cancel,
            status: StatusLine::disabled(),
        }
    }

    pub fn with_max_page(mut self, max_page: u32) -> Self {
        self.max_page = max_page.max(1);
        self
    }

    pub fn with_status_line(mut self, enabled: bool) -> Self {
        self.status = StatusLine::new(enabled);
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Appends every record of `kind` matching `query` to `sink`, stopping once
    /// the source runs out of pages or `goal` records of this kind were added.
    /// Records collected before an error stay in `sink`.
    pub async fn collect(
        &mut self,
        kind: MediaKind,
        query: &Query,
        goal: Option<usize>,
        sink: &mut Vec<Record>,
    ) -> Result<usize, FetchError> {
        let start_len = sink.len();
        let goal_met = |sink: &Vec<Record>| goal.is_some_and(|g| sink.len() - start_len >= g);

        let mut page: u32 = 1;
        let mut total_pages: u32 = 1;

        while page <= total_pages && !goal_met(sink) {
            if self.cancel.is_cancelled() {
                self.status.finish();
                return Err(FetchError::Cancelled);
            }

            let res = match self.source.fetch_page(kind, query, page).await {
                Ok(res) => res,
                Err(e) => {
                    self.status.finish();
                    return Err(e);
                }
            };
            let n = res.results.len();
            sink.extend(res.results.iter().map(|item| Record::from_json(kind, item)));
            let reported = res.total_pages.unwrap_or(1);
            if page == 1 && reported > self.max_page {
                warn!(%kind, reported, max_page = self.max_page, "capping pagination");
            }
            total_pages = reported.min(self.max_page);

            let collected = sink.len() - start_len;
            debug!(%kind, page, total_pages, n, "page fetched");
            self.status.update(&format!(
                "[{kind}] page {page}/{total_pages} | {collected} records{}",
                goal.map(|g| format!(" of {g}")).unwrap_or_default()
            ));

            page += 1;
            if page <= total_pages && !goal_met(sink) && !self.page_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        self.status.finish();
                        return Err(FetchError::Cancelled);
                    }
                    _ = tokio::time::sleep(self.page_delay) => {}
                }
            }
        }

        self.status.finish();
        let added = sink.len() - start_len;
        info!(%kind, records = added, pages = page - 1, "collection finished");
        Ok(added)
    }
}
