//! A stand-in Stack Exchange site for tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use warp::{Filter, http::StatusCode};

/// Canned responses served by [`MockSite`].
#[derive(Debug, Clone)]
pub(crate) struct Responses {
    /// Bodies of the upvote pages, page 1 first. Later pages are empty.
    pub(crate) upvote: Vec<String>,
    /// Bodies of the downvote pages, page 1 first. Later pages are empty.
    pub(crate) downvote: Vec<String>,
    /// Body of the top activity tab.
    pub(crate) top_activity: String,
    /// Status of every response.
    pub(crate) status: StatusCode,
}

impl Default for Responses {
    fn default() -> Self {
        Self {
            upvote: Vec::new(),
            downvote: Vec::new(),
            top_activity: String::new(),
            status: StatusCode::OK,
        }
    }
}

impl Responses {
    fn body(&self, query: &HashMap<String, String>) -> String {
        match query.get("tab").map(String::as_str) {
            Some("votes") => {
                let pages = match query.get("sort").map(String::as_str) {
                    Some("upvote") => &self.upvote,
                    Some("downvote") => &self.downvote,
                    _ => return String::new(),
                };
                query
                    .get("page")
                    .and_then(|page| page.parse::<usize>().ok())
                    .and_then(|page| page.checked_sub(1))
                    .and_then(|idx| pages.get(idx).cloned())
                    .unwrap_or_default()
            }
            Some("topactivity") => self.top_activity.clone(),
            _ => String::new(),
        }
    }
}

/// A running mock site, serving `users/current` on an ephemeral port.
#[derive(Debug)]
pub(crate) struct MockSite {
    origin: String,
    requests: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl MockSite {
    pub(crate) fn start(responses: Responses) -> Self {
        let requests: Arc<Mutex<Vec<HashMap<String, String>>>> = Arc::default();
        let log = Arc::clone(&requests);
        let route = warp::path!("users" / "current")
            .and(warp::query::<HashMap<String, String>>())
            .map(move |query: HashMap<String, String>| {
                let body = responses.body(&query);
                log.lock().expect("poisoned").push(query);
                warp::reply::with_status(body, responses.status)
            });

        let (addr, serve_fut) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        let _server_handle = tokio::spawn(serve_fut);

        Self {
            origin: format!("http://{addr}"),
            requests,
        }
    }

    pub(crate) fn origin(&self) -> &str {
        &self.origin
    }

    /// The query of every request received so far.
    pub(crate) fn requests(&self) -> Vec<HashMap<String, String>> {
        self.requests.lock().expect("poisoned").clone()
    }

    /// Requests received for the votes tab of `sort`.
    pub(crate) fn vote_requests(&self, sort: &str) -> usize {
        self.requests()
            .iter()
            .filter(|q| {
                q.get("tab").map(String::as_str) == Some("votes")
                    && q.get("sort").map(String::as_str) == Some(sort)
            })
            .count()
    }
}

/// A votes tab page holding `today` entries stamped `date` followed by
/// `older` entries from a year earlier.
pub(crate) fn votes_page(date: &str, today: usize, older: usize) -> String {
    let mut body = String::from(r#"<div id="user-tab-votes">"#);
    for n in 0..today {
        body.push_str(&format!(
            r#"<div class="s-post-summary"><a href="/q/{n}">Q{n}</a><span title="{date} 10:{m:02}:00Z" class="relativetime">today</span></div>"#,
            m = n % 60
        ));
    }
    for n in 0..older {
        body.push_str(&format!(
            r#"<div class="s-post-summary"><a href="/q/{n}">Old{n}</a><span title="2000-01-01 10:00:00Z" class="relativetime">Jan 1, 2000</span></div>"#
        ));
    }
    body.push_str("</div>");
    body
}

/// A top activity tab reporting `total` votes today.
pub(crate) fn top_activity_page(total: u32) -> String {
    format!(
        r#"<div class="d-flex gs16"><div class="flex--item"><div class="fs-body3 fc-dark">
            {total}
        </div>
        today</div></div>"#
    )
}
