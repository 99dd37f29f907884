//! Kinds of votes a user casts.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// The vote type, as the votes tab of a profile sorts them.
pub enum VoteKind {
    /// An upvote on a question or answer.
    Upvote,
    /// A downvote on a question or answer.
    Downvote,
}

impl VoteKind {
    /// The value of the `sort` query parameter selecting this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VoteKind::Upvote => "upvote",
            VoteKind::Downvote => "downvote",
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
