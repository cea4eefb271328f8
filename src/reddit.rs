//! Reddit as a comment source: the top-level comments of the first non-stickied hot post.
//!
//! Listing parsing is plain JSON handling and always available. The HTTP client needs the
//! `online` feature.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::comments::Comment;

pub const HOT_POST_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    kind: String,
    data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub stickied: bool,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    body: String,
}

/// Picks the first post of a `hot` listing that is not pinned by the moderators.
pub fn select_post(hot_listing: &str) -> Result<Option<PostSummary>> {
    let listing: Listing =
        serde_json::from_str(hot_listing).context("failed to decode subreddit listing")?;
    for child in listing.data.children {
        if child.kind != "t3" {
            continue;
        }
        let post: PostSummary =
            serde_json::from_value(child.data).context("failed to decode post summary")?;
        if !post.stickied {
            return Ok(Some(post));
        }
    }
    Ok(None)
}

/// Extracts readable top-level comments from a thread response (`[post, comments]`).
///
/// "Load more" stubs, deleted or removed bodies and comments without an author are skipped.
pub fn extract_comments(thread: &str) -> Result<Vec<Comment>> {
    let listings: Vec<Listing> =
        serde_json::from_str(thread).context("failed to decode comment thread")?;
    let comments_listing = listings
        .into_iter()
        .nth(1)
        .ok_or_else(|| anyhow!("comment thread response has no comment listing"))?;

    let mut comments = Vec::new();
    for child in comments_listing.data.children {
        if child.kind != "t1" {
            continue;
        }
        let raw: RawComment =
            serde_json::from_value(child.data).context("failed to decode comment")?;
        let Some(author) = raw.author else {
            continue;
        };
        if author == "[deleted]" || matches!(raw.body.trim(), "[deleted]" | "[removed]") {
            continue;
        }
        comments.push(Comment::new(author, raw.body));
    }
    Ok(comments)
}

pub fn validate_subreddit(name: &str) -> Result<&str> {
    let name = name.trim().trim_start_matches("r/");
    let valid = (2..=21).contains(&name.len())
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid {
        bail!("'{name}' is not a valid subreddit name");
    }
    Ok(name)
}

#[cfg(feature = "online")]
pub use client::RedditClient;

#[cfg(feature = "online")]
mod client {
    use std::env;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use reqwest::blocking::Client;
    use serde::Deserialize;
    use url::Url;

    use super::{extract_comments, select_post, validate_subreddit, HOT_POST_LIMIT};
    use crate::comments::Comment;

    const PUBLIC_BASE: &str = "https://www.reddit.com";
    const OAUTH_BASE: &str = "https://oauth.reddit.com";
    const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

    #[derive(Debug, Deserialize)]
    struct TokenResponse {
        access_token: String,
    }

    pub struct RedditClient {
        http: Client,
        base: Url,
        token: Option<String>,
    }

    impl RedditClient {
        /// Uses app-only OAuth when `REDDIT_CLIENT_ID` and `REDDIT_CLIENT_SECRET` are set,
        /// the public JSON endpoints otherwise.
        pub fn from_env() -> Result<Self> {
            let http = Client::builder()
                .timeout(Duration::from_secs(25))
                .user_agent(concat!("slidecast/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("failed to create HTTP client")?;

            let credentials = env::var("REDDIT_CLIENT_ID")
                .ok()
                .zip(env::var("REDDIT_CLIENT_SECRET").ok());
            let Some((client_id, client_secret)) = credentials else {
                log::info!("reddit: no client credentials set, using public endpoints");
                return Ok(Self {
                    http,
                    base: Url::parse(PUBLIC_BASE)?,
                    token: None,
                });
            };

            let token: TokenResponse = http
                .post(TOKEN_URL)
                .basic_auth(client_id, Some(client_secret))
                .form(&[("grant_type", "client_credentials")])
                .send()
                .context("failed to request reddit access token")?
                .error_for_status()
                .context("reddit token endpoint returned an error status")?
                .json()
                .context("failed to decode reddit token response")?;

            Ok(Self {
                http,
                base: Url::parse(OAUTH_BASE)?,
                token: Some(token.access_token),
            })
        }

        fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
            let mut url = self.base.join(path)?;
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())))
                .append_pair("raw_json", "1");
            log::debug!("reddit: GET {url}");

            let mut request = self.http.get(url.clone());
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            request
                .send()
                .with_context(|| format!("failed to call reddit API {url}"))?
                .error_for_status()
                .with_context(|| format!("reddit API returned an error status for {url}"))?
                .text()
                .context("failed to read reddit response")
        }

        pub fn fetch_hot_thread_comments(&self, subreddit: &str) -> Result<Vec<Comment>> {
            let subreddit = validate_subreddit(subreddit)?;
            let listing = self.get_text(
                &format!("r/{subreddit}/hot.json"),
                &[("limit", HOT_POST_LIMIT.to_string())],
            )?;
            let Some(post) = select_post(&listing)? else {
                anyhow::bail!("r/{subreddit} has no non-stickied hot posts");
            };
            log::info!("reddit: using post {} \"{}\"", post.id, post.title);

            let thread = self.get_text(&format!("comments/{}.json", post.id), &[])?;
            extract_comments(&thread)
        }
    }
}
