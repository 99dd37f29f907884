//! The daily vote budget
//!
//! A user may cast a fixed number of votes per day across questions and
//! answers. What is left is the budget less today's upvotes and downvotes.

use std::fmt;

use metrics::gauge;
use remaining_votes_throttle::{Clock, Storage};
use serde::Serialize;
use tracing::info;

use crate::{activity::TotalVotesFetcher, fetcher::VoteFetcher, vote::VoteKind};

/// The site-wide daily vote cap.
pub const DAILY_VOTE_BUDGET: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// How close the user is to running out of votes.
pub enum Level {
    /// More than ten votes left.
    Plenty,
    /// Ten or fewer votes left.
    Low,
    /// Five or fewer votes left.
    Critical,
}

impl Level {
    /// The level for `available` votes left.
    #[must_use]
    pub fn for_available(available: i64) -> Self {
        match available {
            ..=5 => Level::Critical,
            6..=10 => Level::Low,
            _ => Level::Plenty,
        }
    }
}

/// Today's votes against the daily budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Upvotes cast today on posts that still exist.
    pub upvotes: u32,
    /// Downvotes cast today on posts that still exist.
    pub downvotes: u32,
    /// Every vote cast today as the site reports it.
    pub total: u32,
    /// The daily budget.
    pub budget: u32,
    /// Votes left today, negative if the tallies exceed the budget.
    pub available: i64,
    /// See [`Level`].
    pub level: Level,
}

impl Summary {
    /// Create a new `Summary` from resolved tallies.
    #[must_use]
    pub fn new(budget: u32, upvotes: u32, downvotes: u32, total: u32) -> Self {
        let available = i64::from(budget) - i64::from(upvotes) - i64::from(downvotes);
        Self {
            upvotes,
            downvotes,
            total,
            budget,
            available,
            level: Level::for_available(available),
        }
    }

    /// Tally today's upvotes, then downvotes, then the total and summarize.
    pub async fn gather<S, C>(
        votes: &VoteFetcher<S, C>,
        totals: &TotalVotesFetcher,
        budget: u32,
    ) -> Self
    where
        S: Storage + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let upvotes = votes.count_votes_today(VoteKind::Upvote).await;
        let downvotes = votes.count_votes_today(VoteKind::Downvote).await;
        let total = totals.count_total_votes_today().await;

        let summary = Self::new(budget, upvotes, downvotes, total);
        info!(
            "{upvotes} upvote(s), {downvotes} downvote(s), {total} total: {available} of {budget} left",
            available = summary.available
        );
        gauge!("votes_available").set(summary.available as f64);
        gauge!("votes_total").set(f64::from(summary.total));
        summary
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} left ({} total)", self.available, self.total)
    }
}
