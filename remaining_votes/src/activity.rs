//! Total votes cast today
//!
//! The top activity tab reports how many votes the user cast today, deleted
//! posts included. It is a single unthrottled request.

use reqwest::Client;
use tracing::{debug, info};

use crate::{
    endpoint::{self, Endpoint},
    marker,
};

/// Reads the total of today's votes from the top activity tab.
#[derive(Debug, Clone)]
pub struct TotalVotesFetcher {
    client: Client,
    endpoint: Endpoint,
}

impl TotalVotesFetcher {
    /// Create a new [`TotalVotesFetcher`] instance
    #[must_use]
    pub fn new(client: Client, endpoint: Endpoint) -> Self {
        Self { client, endpoint }
    }

    /// The number of votes cast today, zero if the request fails or the page
    /// does not report one.
    pub async fn count_total_votes_today(&self) -> u32 {
        let body =
            endpoint::fetch_text(&self.client, self.endpoint.top_activity(), "topactivity").await;
        if let Some(total) = marker::today_total(&body) {
            debug!("{total} vote(s) cast today");
            total
        } else {
            info!("top activity page did not report today's votes");
            0
        }
    }
}
