//! Project-board ingestion adapter.
//!
//! [`BoardClient`] talks to a Trello-shaped REST API and normalizes each
//! card into a [`BoardCard`]. Board-level and card-list-level failures
//! abort the fetch; every per-card field lookup degrades to a sentinel
//! instead, so a failing lookup never loses the rest of the card:
//!
//! | Field | Absent | Lookup/format failure |
//! |-------|--------|----------------------|
//! | column | — | `"unknown"` |
//! | assignees | `"none"` | inline `"error: …"` marker per member |
//! | due date | `"none"` | `"unknown"` |
//! | description | `"none"` | — |
//! | comments | `"none"` | `"unknown"` |
//!
//! [`flatten_card`] renders a normalized card into the fixed labeled
//! template that gets stored in the vector index.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::BoardConfig;
use crate::models::BoardCard;

/// Sentinel for a field whose lookup or formatting failed.
pub const UNKNOWN: &str = "unknown";
/// Sentinel for a field that is simply absent.
pub const NONE: &str = "none";

// ============ Wire types ============

#[derive(Debug, Deserialize)]
struct RawBoard {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawCard {
    id: String,
    name: String,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    due: Option<String>,
    #[serde(rename = "idList")]
    id_list: String,
    #[serde(default, rename = "idMembers")]
    id_members: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawList {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    #[serde(rename = "fullName")]
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct RawCommentAction {
    data: RawCommentData,
}

#[derive(Debug, Deserialize)]
struct RawCommentData {
    #[serde(default)]
    text: String,
}

// ============ Client ============

/// HTTP client for the project-board REST API.
pub struct BoardClient {
    url: String,
    api_key: Option<String>,
    token: Option<String>,
    client: reqwest::Client,
}

impl BoardClient {
    /// Build a client from config. Credentials fall back to the
    /// `BOARD_API_KEY` / `BOARD_TOKEN` environment variables when not set
    /// in the config file.
    pub fn new(config: &BoardConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("BOARD_API_KEY").ok());
        let token = config
            .token
            .clone()
            .or_else(|| std::env::var("BOARD_TOKEN").ok());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            api_key,
            token,
            client,
        })
    }

    /// Fetch every card on `board_id`, normalized with per-field sentinel
    /// downgrades.
    ///
    /// # Errors
    ///
    /// Fails only when the board itself or its card list cannot be
    /// fetched. Per-card lookups never fail the call; they downgrade and
    /// are logged at warn.
    pub async fn fetch_cards(&self, board_id: &str) -> Result<Vec<BoardCard>> {
        let board: RawBoard = self
            .get_json(&format!("/boards/{}", board_id), &[])
            .await
            .with_context(|| format!("failed to fetch board {}", board_id))?;
        info!(board = %board.name, "fetched board");

        let raw_cards: Vec<RawCard> = self
            .get_json(&format!("/boards/{}/cards", board_id), &[])
            .await
            .with_context(|| format!("failed to fetch cards for board {}", board_id))?;
        info!(count = raw_cards.len(), "fetched cards");

        let mut cards = Vec::with_capacity(raw_cards.len());
        for raw in &raw_cards {
            cards.push(self.normalize_card(raw).await);
        }
        Ok(cards)
    }

    /// Normalize one raw card. Infallible by construction: every lookup
    /// failure becomes a sentinel or inline marker.
    async fn normalize_card(&self, raw: &RawCard) -> BoardCard {
        let column = match self.fetch_list_name(&raw.id_list).await {
            Ok(name) => name,
            Err(e) => {
                warn!(card = %raw.name, error = %e, "column lookup failed");
                UNKNOWN.to_string()
            }
        };

        let mut assignees = Vec::with_capacity(raw.id_members.len());
        for member_id in &raw.id_members {
            match self.fetch_member_name(member_id).await {
                Ok(name) => assignees.push(name),
                Err(e) => {
                    warn!(card = %raw.name, member = %member_id, error = %e, "member lookup failed");
                    assignees.push(format!("error: {}", e));
                }
            }
        }

        let comments = match self.fetch_comments(&raw.id).await {
            Ok(texts) => Some(texts),
            Err(e) => {
                warn!(card = %raw.name, error = %e, "comment lookup failed");
                None
            }
        };

        BoardCard {
            name: raw.name.clone(),
            column,
            assignees,
            due: raw.due.clone(),
            description: raw.desc.clone(),
            comments,
        }
    }

    async fn fetch_list_name(&self, list_id: &str) -> Result<String> {
        let list: RawList = self.get_json(&format!("/lists/{}", list_id), &[]).await?;
        Ok(list.name)
    }

    async fn fetch_member_name(&self, member_id: &str) -> Result<String> {
        let member: RawMember = self
            .get_json(&format!("/members/{}", member_id), &[])
            .await?;
        Ok(member.full_name)
    }

    async fn fetch_comments(&self, card_id: &str) -> Result<Vec<String>> {
        let actions: Vec<RawCommentAction> = self
            .get_json(
                &format!("/cards/{}/actions", card_id),
                &[("filter", "commentCard")],
            )
            .await?;
        Ok(actions.into_iter().map(|a| a.data.text).collect())
    }

    /// GET a board API resource and decode its JSON body. Credentials ride
    /// along as `key`/`token` query parameters, the way the Trello API
    /// expects them.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let mut request = self.client.get(format!("{}{}", self.url, path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(ref key) = self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }
        if let Some(ref token) = self.token {
            request = request.query(&[("token", token.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("board API error {}: {}", status, body);
        }

        Ok(response.json().await?)
    }
}

// ============ Card flattening ============

/// Render one normalized card into the fixed labeled template stored in
/// the vector index. Each card ends with a `---` separator line.
pub fn flatten_card(card: &BoardCard) -> String {
    format!(
        "Task: {}\nColumn: {}\nOwner: {}\nDue: {}\nDescription: {}\nComments: {}\n---\n",
        card.name,
        card.column,
        owner_field(&card.assignees),
        due_field(card.due.as_deref()),
        description_field(card.description.as_deref()),
        comments_field(card.comments.as_deref()),
    )
}

/// Comma-joined assignee names; `"none"` when the card has no members.
fn owner_field(assignees: &[String]) -> String {
    if assignees.is_empty() {
        NONE.to_string()
    } else {
        assignees.join(", ")
    }
}

/// `YYYY-MM-DD` from the upstream RFC 3339 timestamp; `"none"` when
/// absent, `"unknown"` when the timestamp does not parse.
fn due_field(due: Option<&str>) -> String {
    match due {
        None => NONE.to_string(),
        Some(raw) => match chrono::DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => dt.format("%Y-%m-%d").to_string(),
            Err(_) => UNKNOWN.to_string(),
        },
    }
}

/// Card description, `"none"` when absent or empty.
fn description_field(description: Option<&str>) -> String {
    match description {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => NONE.to_string(),
    }
}

/// Newline-joined comment texts; `"none"` for a card without comments,
/// `"unknown"` when the comment lookup itself failed.
fn comments_field(comments: Option<&[String]>) -> String {
    match comments {
        None => UNKNOWN.to_string(),
        Some([]) => NONE.to_string(),
        Some(texts) => texts.join("\n"),
    }
}
