//! Remote task-board client.
//!
//! [`BoardApi`] is the seam every other component talks to. [`TrelloClient`]
//! implements it over reqwest with key + token query authentication. No
//! retries happen here; callers decide what to do with each error kind.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fields::CustomFieldWrite;
use super::types::{BoardData, Card, FieldOption, Label, Member};
use crate::errors::BoardApiError;

pub const DEFAULT_BASE_URL: &str = "https://api.trello.com/1";

// ── Request / response types ─────────────────────────────────────────

/// Fields for a new card. The remote system assigns the id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    #[serde(rename = "idMembers", skip_serializing_if = "Vec::is_empty")]
    pub member_ids: Vec<String>,
}

/// Partial card update. `None` leaves a field untouched; `due: Some(None)`
/// clears the due date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_due"
    )]
    pub due: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_list: Option<String>,
}

impl CardUpdate {
    pub fn archive() -> Self {
        Self {
            closed: Some(true),
            ..Self::default()
        }
    }

    pub fn complete() -> Self {
        Self {
            due_complete: Some(true),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Distinguishes an explicit `"due": null` (clear) from an absent key.
fn deserialize_due<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<DateTime<Utc>>::deserialize(deserializer).map(Some)
}

/// The member a token belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentMember {
    pub id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub closed: bool,
}

// ── Trait ────────────────────────────────────────────────────────────

#[async_trait]
pub trait BoardApi: Send + Sync {
    /// Lists, open cards (with members and custom field items), custom field
    /// definitions, members and labels of one board.
    async fn fetch_board(&self, board_id: &str) -> Result<BoardData, BoardApiError>;

    async fn create_card(&self, list_id: &str, card: &NewCard) -> Result<Card, BoardApiError>;

    async fn set_custom_field(
        &self,
        card_id: &str,
        write: &CustomFieldWrite,
    ) -> Result<(), BoardApiError>;

    /// Several field writes in one request.
    async fn set_custom_fields(
        &self,
        card_id: &str,
        writes: &[CustomFieldWrite],
    ) -> Result<(), BoardApiError>;

    async fn add_label(&self, card_id: &str, label_id: &str) -> Result<(), BoardApiError>;

    async fn remove_label(&self, card_id: &str, label_id: &str) -> Result<(), BoardApiError>;

    async fn update_card(&self, card_id: &str, update: &CardUpdate) -> Result<Card, BoardApiError>;

    async fn add_member(&self, card_id: &str, member_id: &str) -> Result<(), BoardApiError>;

    /// The member `token` belongs to. The shared credentials are neither
    /// read nor written, so a candidate token can be checked before use.
    async fn member_for_token(&self, token: &str) -> Result<CurrentMember, BoardApiError>;

    async fn check_board_access(&self, board_id: &str) -> Result<BoardSummary, BoardApiError>;

    async fn add_custom_field_option(
        &self,
        field_id: &str,
        text: &str,
    ) -> Result<FieldOption, BoardApiError>;
}

// ── Credentials ──────────────────────────────────────────────────────

/// The per-user token, shared between the HTTP session and the client.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    token: Arc<RwLock<Option<String>>>,
}

impl Credentials {
    pub fn new(token: Option<String>) -> Self {
        let creds = Self::default();
        if let Some(token) = token {
            creds.set(token);
        }
        creds
    }

    /// Store a token. Surrounding whitespace is trimmed; an empty token clears.
    pub fn set(&self, token: impl AsRef<str>) {
        let token = token.as_ref().trim();
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = (!token.is_empty()).then(|| token.to_string());
    }

    pub fn clear(&self) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.token().is_some()
    }
}

// ── reqwest implementation ───────────────────────────────────────────

pub struct TrelloClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    credentials: Credentials,
}

impl TrelloClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            credentials,
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, BoardApiError> {
        let token = self
            .credentials
            .token()
            .ok_or_else(|| BoardApiError::Unauthorized("no board API token configured".into()))?;
        self.request_as(method, path, &token)
    }

    fn request_as(
        &self,
        method: Method,
        path: &str,
        token: &str,
    ) -> Result<RequestBuilder, BoardApiError> {
        if self.api_key.is_empty() {
            return Err(BoardApiError::Unauthorized(
                "no board API key configured".into(),
            ));
        }
        let url = format!("{}{}", self.base_url, path);
        Ok(self
            .http
            .request(method, url)
            .query(&[("key", self.api_key.as_str()), ("token", token)]))
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<reqwest::Response, BoardApiError> {
        let response = builder
            .send()
            .await
            .map_err(|e| BoardApiError::Network(format!("{}: {}", what, e)))?;
        check_status(response.status(), what)?;
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, BoardApiError> {
        self.send(builder, what)
            .await?
            .json::<T>()
            .await
            .map_err(|e| BoardApiError::Decode(format!("{}: {}", what, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T, BoardApiError> {
        let builder = self.request(Method::GET, path)?;
        self.send_json(builder, what).await
    }
}

/// Map an HTTP status onto the error taxonomy.
pub fn check_status(status: StatusCode, what: &str) -> Result<(), BoardApiError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(BoardApiError::Unauthorized(format!("{} ({})", what, status)))
        }
        StatusCode::TOO_MANY_REQUESTS => Err(BoardApiError::RateLimited),
        StatusCode::NOT_FOUND => Err(BoardApiError::NotFound(what.to_string())),
        s => Err(BoardApiError::Network(format!("{} returned {}", what, s))),
    }
}

#[async_trait]
impl BoardApi for TrelloClient {
    async fn fetch_board(&self, board_id: &str) -> Result<BoardData, BoardApiError> {
        debug!(board_id, "fetching board");
        let cards = async {
            let builder = self
                .request(Method::GET, &format!("/boards/{}/cards", board_id))?
                .query(&[("members", "true"), ("customFieldItems", "true")]);
            self.send_json::<Vec<Card>>(builder, "board cards").await
        };
        let lists_path = format!("/boards/{}/lists", board_id);
        let fields_path = format!("/boards/{}/customFields", board_id);
        let members_path = format!("/boards/{}/members", board_id);
        let labels_path = format!("/boards/{}/labels", board_id);
        let (lists, cards, custom_fields, members, labels) = tokio::try_join!(
            self.get(&lists_path, "board lists"),
            cards,
            self.get(&fields_path, "board custom fields"),
            self.get::<Vec<Member>>(&members_path, "board members"),
            self.get::<Vec<Label>>(&labels_path, "board labels"),
        )?;
        Ok(BoardData {
            lists,
            cards,
            custom_fields,
            members,
            labels,
        })
    }

    async fn create_card(&self, list_id: &str, card: &NewCard) -> Result<Card, BoardApiError> {
        let mut body = serde_json::to_value(card)
            .map_err(|e| BoardApiError::Decode(format!("encode card: {}", e)))?;
        if let Some(map) = body.as_object_mut() {
            map.insert("idList".into(), serde_json::Value::String(list_id.to_string()));
        }
        let builder = self.request(Method::POST, "/cards")?.json(&body);
        self.send_json(builder, "create card").await
    }

    async fn set_custom_field(
        &self,
        card_id: &str,
        write: &CustomFieldWrite,
    ) -> Result<(), BoardApiError> {
        let path = format!("/cards/{}/customField/{}/item", card_id, write.field_id);
        let builder = self.request(Method::PUT, &path)?.json(&write.body());
        self.send(builder, "set custom field").await.map(|_| ())
    }

    async fn set_custom_fields(
        &self,
        card_id: &str,
        writes: &[CustomFieldWrite],
    ) -> Result<(), BoardApiError> {
        let items: Vec<_> = writes.iter().map(CustomFieldWrite::bulk_item).collect();
        let body = serde_json::json!({ "customFieldItems": items });
        let builder = self
            .request(Method::PUT, &format!("/cards/{}/customFields", card_id))?
            .json(&body);
        self.send(builder, "set custom fields").await.map(|_| ())
    }

    async fn add_label(&self, card_id: &str, label_id: &str) -> Result<(), BoardApiError> {
        let builder = self
            .request(Method::POST, &format!("/cards/{}/idLabels", card_id))?
            .query(&[("value", label_id)]);
        self.send(builder, "add label").await.map(|_| ())
    }

    async fn remove_label(&self, card_id: &str, label_id: &str) -> Result<(), BoardApiError> {
        let path = format!("/cards/{}/idLabels/{}", card_id, label_id);
        let builder = self.request(Method::DELETE, &path)?;
        self.send(builder, "remove label").await.map(|_| ())
    }

    async fn update_card(&self, card_id: &str, update: &CardUpdate) -> Result<Card, BoardApiError> {
        let builder = self
            .request(Method::PUT, &format!("/cards/{}", card_id))?
            .json(update);
        self.send_json(builder, "update card").await
    }

    async fn add_member(&self, card_id: &str, member_id: &str) -> Result<(), BoardApiError> {
        let builder = self
            .request(Method::POST, &format!("/cards/{}/idMembers", card_id))?
            .query(&[("value", member_id)]);
        self.send(builder, "add member").await.map(|_| ())
    }

    async fn member_for_token(&self, token: &str) -> Result<CurrentMember, BoardApiError> {
        let builder = self
            .request_as(Method::GET, "/members/me", token)?
            .query(&[("fields", "id,fullName,username,email")]);
        self.send_json(builder, "current member").await
    }

    async fn check_board_access(&self, board_id: &str) -> Result<BoardSummary, BoardApiError> {
        let builder = self
            .request(Method::GET, &format!("/boards/{}", board_id))?
            .query(&[("fields", "id,name,closed")]);
        self.send_json(builder, "board").await
    }

    async fn add_custom_field_option(
        &self,
        field_id: &str,
        text: &str,
    ) -> Result<FieldOption, BoardApiError> {
        let body = serde_json::json!({ "value": { "text": text } });
        let builder = self
            .request(Method::POST, &format!("/customFields/{}/options", field_id))?
            .json(&body);
        self.send_json(builder, "add custom field option").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(check_status(StatusCode::OK, "x").is_ok());
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED, "x"),
            Err(BoardApiError::Unauthorized(_))
        ));
        assert_eq!(
            check_status(StatusCode::TOO_MANY_REQUESTS, "x"),
            Err(BoardApiError::RateLimited)
        );
        assert_eq!(
            check_status(StatusCode::NOT_FOUND, "card c1"),
            Err(BoardApiError::NotFound("card c1".into()))
        );
        assert!(matches!(
            check_status(StatusCode::BAD_GATEWAY, "x"),
            Err(BoardApiError::Network(_))
        ));
    }

    #[test]
    fn test_credentials_trim_and_clear() {
        let creds = Credentials::new(Some("  abc123 \n".into()));
        assert_eq!(creds.token().as_deref(), Some("abc123"));

        let shared = creds.clone();
        shared.clear();
        assert!(!creds.is_set());

        creds.set("   ");
        assert!(creds.token().is_none());
    }

    #[tokio::test]
    async fn test_missing_token_fails_without_network() {
        // Unroutable base URL: a request attempt would surface as Network.
        let client = TrelloClient::new("http://127.0.0.1:9", "key", Credentials::default());
        let err = client.fetch_board("b1").await.unwrap_err();
        assert!(matches!(err, BoardApiError::Unauthorized(_)));
    }

    /// Serves one board and `/members/me` on a local port.
    async fn stub_board_api() -> String {
        use std::collections::HashMap;

        use axum::extract::Query;
        use axum::routing::get;
        use axum::{Json, Router};

        let app = Router::new()
            .route(
                "/boards/b1/lists",
                get(|| async { Json(serde_json::json!([{"id": "l1", "name": "To Do"}])) }),
            )
            .route(
                "/boards/b1/cards",
                get(|| async {
                    Json(serde_json::json!([{"id": "c1", "name": "Logo", "idList": "l1"}]))
                }),
            )
            .route(
                "/boards/b1/customFields",
                get(|| async { Json(serde_json::json!([])) }),
            )
            .route(
                "/boards/b1/members",
                get(|| async {
                    Json(serde_json::json!([{"id": "m1", "fullName": "Dana Reyes", "username": "dana"}]))
                }),
            )
            .route(
                "/boards/b1/labels",
                get(|| async { Json(serde_json::json!([{"id": "lb1", "name": "Urgent"}])) }),
            )
            .route(
                "/members/me",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    if params.get("token").map(String::as_str) == Some("good") {
                        Ok(Json(serde_json::json!({"id": "m1", "fullName": "Dana Reyes"})))
                    } else {
                        Err(StatusCode::UNAUTHORIZED)
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_board_joins_all_five_reads() {
        let base = stub_board_api().await;
        let client = TrelloClient::new(base, "key", Credentials::new(Some("tok".into())));
        let data = client.fetch_board("b1").await.unwrap();
        assert_eq!(data.lists[0].name, "To Do");
        assert_eq!(data.cards[0].id, "c1");
        assert!(data.custom_fields.is_empty());
        assert_eq!(data.members[0].username, "dana");
        assert_eq!(data.labels[0].id, "lb1");
    }

    #[tokio::test]
    async fn test_member_for_token_uses_candidate_token() {
        let base = stub_board_api().await;
        let credentials = Credentials::new(Some("shared".into()));
        let client = TrelloClient::new(base, "key", credentials.clone());

        let member = client.member_for_token("good").await.unwrap();
        assert_eq!(member.full_name, "Dana Reyes");
        assert!(matches!(
            client.member_for_token("bad").await,
            Err(BoardApiError::Unauthorized(_))
        ));
        assert_eq!(credentials.token().as_deref(), Some("shared"));
    }

    #[test]
    fn test_new_card_body_omits_empty_fields() {
        let card = NewCard {
            name: "Homepage".into(),
            ..NewCard::default()
        };
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Homepage"}));
    }

    #[test]
    fn test_card_update_distinguishes_clear_from_absent() {
        let clear: CardUpdate = serde_json::from_str(r#"{"due": null}"#).unwrap();
        assert_eq!(clear.due, Some(None));

        let absent: CardUpdate = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
        assert_eq!(absent.due, None);
        assert!(!absent.is_empty());

        let json = serde_json::to_value(CardUpdate::archive()).unwrap();
        assert_eq!(json, serde_json::json!({"closed": true}));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = TrelloClient::new("https://example.test/1/", "k", Credentials::default());
        assert_eq!(client.base_url, "https://example.test/1");
    }
}
