/// REST collaborators, consumed by contract only
///
/// The realtime core treats these calls as informational: their outcome is
/// logged and reported to the caller, but local queue/cursor state never
/// blocks on them. Durable data (history, the notification list, swipe
/// records) lives behind these endpoints, not in the session.
use crate::error::Result;
use crate::geo::Coordinate;
use crate::realtime::event::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A discovery profile as returned by the candidate fetch. `distance_km` is
/// never sent by the backend; the geo engine annotates it client-side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

/// Swipe decision submitted for the candidate under the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeAction {
    Like,
    Pass,
}

#[derive(Debug, Serialize)]
struct SwipeRequest<'a> {
    swiper_user_id: &'a str,
    swiped_user_id: &'a str,
    action: SwipeAction,
}

/// Ack for a swipe submission; `matched` is set when the swipe completed a
/// mutual like
#[derive(Debug, Clone, Deserialize)]
pub struct SwipeAck {
    #[serde(default)]
    pub matched: bool,
}

/// One row of the durable, paginated notification list
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub sent_at: String,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Deserialize)]
struct CandidatePage {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct NotificationPage {
    notifications: Vec<NotificationRecord>,
}

/// Contract over the persisted-entity services. Implementations are assumed
/// idempotent-safe to retry at the caller's discretion.
#[async_trait]
pub trait MatchApi: Send + Sync {
    /// Paginated discovery fetch; profiles come with raw coordinates
    async fn fetch_candidates(&self, page: u32, per_page: u32) -> Result<Vec<Candidate>>;

    /// Durable swipe submission (the channel is never the only path for this)
    async fn submit_swipe(
        &self,
        swiper_user_id: &str,
        swiped_user_id: &str,
        action: SwipeAction,
    ) -> Result<SwipeAck>;

    /// Paginated message history, newest last
    async fn fetch_messages(&self, match_id: &str, page: u32, per_page: u32) -> Result<Vec<ChatMessage>>;

    /// Paginated durable notification list
    async fn fetch_notifications(&self, page: u32, per_page: u32) -> Result<Vec<NotificationRecord>>;
}

/// HTTP implementation against the Amora REST API
pub struct HttpMatchApi {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpMatchApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl MatchApi for HttpMatchApi {
    async fn fetch_candidates(&self, page: u32, per_page: u32) -> Result<Vec<Candidate>> {
        let body: CandidatePage = self
            .client
            .get(self.url("discovery/candidates"))
            .bearer_auth(&self.token)
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.candidates)
    }

    async fn submit_swipe(
        &self,
        swiper_user_id: &str,
        swiped_user_id: &str,
        action: SwipeAction,
    ) -> Result<SwipeAck> {
        let ack = self
            .client
            .post(self.url("swipes"))
            .bearer_auth(&self.token)
            .json(&SwipeRequest {
                swiper_user_id,
                swiped_user_id,
                action,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(ack)
    }

    async fn fetch_messages(&self, match_id: &str, page: u32, per_page: u32) -> Result<Vec<ChatMessage>> {
        let body: MessagePage = self
            .client
            .get(self.url(&format!("matches/{}/messages", match_id)))
            .bearer_auth(&self.token)
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.messages)
    }

    async fn fetch_notifications(&self, page: u32, per_page: u32) -> Result<Vec<NotificationRecord>> {
        let body: NotificationPage = self
            .client
            .get(self.url("notifications"))
            .bearer_auth(&self.token)
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.notifications)
    }
}
