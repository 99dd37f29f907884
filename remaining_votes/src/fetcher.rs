//! Count the votes a user cast today
//!
//! The votes tab of a profile lists votes newest first, at most one page size
//! per page. Pages are walked in order and today's entries counted until a
//! page holds fewer than a full page of them, which is taken to mean today's
//! votes end on that page. Every page request draws on the shared throttle.

use std::num::NonZeroU32;

use remaining_votes_throttle::{Clock, RealClock, Storage, Throttle};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use time::Date;
use tracing::{debug, warn};

use crate::{
    endpoint::{self, Endpoint},
    marker::{self, DateMarker},
    vote::VoteKind,
};

fn default_page_size() -> NonZeroU32 {
    NonZeroU32::new(30).expect("30 is non-zero")
}

fn default_max_pages() -> NonZeroU32 {
    NonZeroU32::new(10).expect("10 is non-zero")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// How the votes tab is paged.
pub struct Pagination {
    /// The most entries a votes tab page shows. A page with fewer of today's
    /// votes is the last one read.
    #[serde(default = "default_page_size")]
    pub page_size: NonZeroU32,
    /// Never read more pages than this for one vote kind.
    #[serde(default = "default_max_pages")]
    pub max_pages: NonZeroU32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

/// Counts today's votes of one kind from the votes tab.
#[derive(Debug)]
pub struct VoteFetcher<S, C = RealClock> {
    client: Client,
    endpoint: Endpoint,
    throttle: Throttle<S, C>,
    pagination: Pagination,
}

impl<S, C> VoteFetcher<S, C>
where
    S: Storage + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Create a new [`VoteFetcher`] instance
    #[must_use]
    pub fn new(
        client: Client,
        endpoint: Endpoint,
        throttle: Throttle<S, C>,
        pagination: Pagination,
    ) -> Self {
        Self {
            client,
            endpoint,
            throttle,
            pagination,
        }
    }

    /// The throttle requests draw on.
    #[must_use]
    pub fn throttle(&self) -> &Throttle<S, C> {
        &self.throttle
    }

    /// Count the votes of `kind` cast today, UTC.
    ///
    /// Failed requests count as pages without votes and end the count, the
    /// result may then be short.
    pub async fn count_votes_today(&self, kind: VoteKind) -> u32 {
        self.count_votes_on(kind, marker::today()).await
    }

    /// Count the votes of `kind` cast on `date`.
    ///
    /// Only pages that list votes from `date` first are meaningful, which the
    /// votes tab guarantees only for the current day.
    pub async fn count_votes_on(&self, kind: VoteKind, date: Date) -> u32 {
        let marker = DateMarker::new(date);
        let page_size = self.pagination.page_size.get();
        let max_pages = self.pagination.max_pages.get();

        self.throttle.settle().await;

        let mut tally: u32 = 0;
        for page in 1..=max_pages {
            let reservation = self.throttle.reserve().await;
            let body =
                endpoint::fetch_text(&self.client, self.endpoint.votes(kind, page), "votes").await;
            self.throttle.release_after(reservation);

            let count = marker.count(&body);
            tally = tally.saturating_add(count);
            debug!(
                "{kind} page {page}: {count} vote(s) on {date}, {tally} so far",
                date = marker.date()
            );
            if count < page_size {
                return tally;
            }
        }

        warn!("stopped counting {kind}s after {max_pages} full page(s), the count may be short");
        tally
    }
}
