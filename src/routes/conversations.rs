//! Buyer/seller messaging on a listing
//!
//! A conversation belongs to exactly two users: the buyer who opened it and
//! the listing's owner. Every read and write runs the participant gate.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::auth::models::AuthenticatedIdentity;
use crate::auth::policy::require_participant;
use crate::database::models::{Conversation, Message, UserView};
use crate::database::StoreError;
use crate::error::{ApiError, ApiResult};
use crate::routes::required_text;
use crate::routes::extract::{JsonBody, PathParam};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversation {
    pub listing_id: Uuid,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct NewMessage {
    pub content: String,
}

/// A conversation as seen by one of its participants
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub listing_title: Option<String>,
    pub listing_image: Option<String>,
    pub other_participant: Option<UserView>,
    pub last_message: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub has_unread_messages: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub is_read: bool,
    pub is_mine: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    fn new(message: Message, viewer: Uuid) -> Self {
        Self {
            id: message.id,
            is_mine: message.sender_id == viewer,
            sender_id: message.sender_id,
            content: message.content,
            is_read: message.is_read,
            created_at: message.created_at,
        }
    }
}

async fn summarize(
    state: &AppState,
    conversation: Conversation,
    viewer: Uuid,
) -> ApiResult<ConversationSummary> {
    let listing = state.store.find_listing(conversation.listing_id).await?;
    let other_id = if conversation.buyer_id == viewer {
        conversation.seller_id
    } else {
        conversation.buyer_id
    };
    let other = state.store.find_user_by_id(other_id).await?;
    let messages = state.store.messages(conversation.id).await?;
    let last = messages.last();

    Ok(ConversationSummary {
        id: conversation.id,
        listing_id: conversation.listing_id,
        listing_title: listing.as_ref().map(|l| l.title.clone()),
        listing_image: listing.as_ref().and_then(|l| l.image_urls.first().cloned()),
        other_participant: other.as_ref().map(UserView::from),
        last_message: last.map(|m| m.content.clone()),
        last_message_at: last.map_or(conversation.updated_at, |m| m.created_at),
        has_unread_messages: messages.iter().any(|m| !m.is_read && m.sender_id != viewer),
        created_at: conversation.created_at,
    })
}

/// Loads a conversation the caller takes part in
async fn participant_conversation(
    state: &AppState,
    identity: &AuthenticatedIdentity,
    id: Uuid,
) -> ApiResult<Conversation> {
    let conversation = state
        .store
        .find_conversation(id)
        .await?
        .ok_or(ApiError::NotFound("Conversation"))?;
    require_participant(identity, &conversation)?;
    Ok(conversation)
}

pub async fn my_conversations(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let conversations = state.store.conversations_for_user(identity.user_id).await?;
    let mut summaries = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        summaries.push(summarize(&state, conversation, identity.user_id).await?);
    }
    Ok(Json(summaries))
}

/// Opens a conversation on a listing with a first message, or appends to
/// the caller's existing conversation on that listing.
pub async fn start_conversation(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<StartConversation>,
) -> ApiResult<(StatusCode, Json<ConversationSummary>)> {
    let content = required_text(&request.content, "content")?;
    let listing = state
        .store
        .find_listing(request.listing_id)
        .await?
        .ok_or(ApiError::NotFound("Listing"))?;
    if listing.owner_id == identity.user_id {
        return Err(ApiError::Validation(
            "You cannot start a conversation on your own listing".to_string(),
        ));
    }

    let existing = state
        .store
        .find_conversation_for(listing.id, identity.user_id)
        .await?;
    let conversation = match existing {
        Some(conversation) => conversation,
        None => match state
            .store
            .insert_conversation(listing.id, identity.user_id, listing.owner_id)
            .await
        {
            Ok(conversation) => conversation,
            // Lost a race with a concurrent start on the same listing
            Err(StoreError::Duplicate(_)) => state
                .store
                .find_conversation_for(listing.id, identity.user_id)
                .await?
                .ok_or(ApiError::NotFound("Conversation"))?,
            Err(e) => return Err(e.into()),
        },
    };

    state
        .store
        .insert_message(conversation.id, identity.user_id, content)
        .await?;
    tracing::info!(
        "User {} messaged about listing {} in conversation {}",
        identity.user_id,
        listing.id,
        conversation.id
    );

    let conversation = state
        .store
        .find_conversation(conversation.id)
        .await?
        .ok_or(ApiError::NotFound("Conversation"))?;
    let summary = summarize(&state, conversation, identity.user_id).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn messages(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let conversation = participant_conversation(&state, &identity, id).await?;
    let messages = state.store.messages(conversation.id).await?;
    Ok(Json(
        messages
            .into_iter()
            .map(|m| MessageView::new(m, identity.user_id))
            .collect(),
    ))
}

pub async fn send_message(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(request): JsonBody<NewMessage>,
) -> ApiResult<(StatusCode, Json<MessageView>)> {
    let conversation = participant_conversation(&state, &identity, id).await?;
    let content = required_text(&request.content, "content")?;
    let message = state
        .store
        .insert_message(conversation.id, identity.user_id, content)
        .await?;
    Ok((StatusCode::CREATED, Json(MessageView::new(message, identity.user_id))))
}

pub async fn mark_read(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Json<Value>> {
    let conversation = participant_conversation(&state, &identity, id).await?;
    let marked = state
        .store
        .mark_read(conversation.id, identity.user_id)
        .await?;
    Ok(Json(json!({ "markedRead": marked })))
}

#[cfg(test)]
mod tests {
    use crate::auth::models::Role;
    use crate::routes::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_buyer_and_seller_exchange_messages() {
        let app = TestApp::new();
        let category = app.category("Apartments").await;
        let (seller, seller_token) = app.user("seller@example.com", Role::Agent).await;
        let (buyer, buyer_token) = app.user("buyer@example.com", Role::User).await;
        let listing = app.listing(&seller, &category, "Kraków").await;

        let (status, started) = app
            .call(
                Method::POST,
                "/api/conversations",
                Some(&buyer_token),
                Some(json!({ "listingId": listing.id, "content": "Is it still available?" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(started["otherParticipant"]["id"], seller.id.to_string());
        assert_eq!(started["lastMessage"], "Is it still available?");
        assert_eq!(started["hasUnreadMessages"], false);
        let conversation_id = started["id"].as_str().unwrap().to_string();

        let (status, again) = app
            .call(
                Method::POST,
                "/api/conversations",
                Some(&buyer_token),
                Some(json!({ "listingId": listing.id, "content": "Can I visit on Friday?" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(again["id"], conversation_id.as_str());

        let (status, inbox) = app
            .call(Method::GET, "/api/conversations", Some(&seller_token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(inbox.as_array().unwrap().len(), 1);
        assert_eq!(inbox[0]["hasUnreadMessages"], true);
        assert_eq!(inbox[0]["otherParticipant"]["id"], buyer.id.to_string());
        assert_eq!(inbox[0]["lastMessage"], "Can I visit on Friday?");

        let messages_uri = format!("/api/conversations/{conversation_id}/messages");
        let (status, reply) = app
            .call(
                Method::POST,
                &messages_uri,
                Some(&seller_token),
                Some(json!({ "content": "Yes, Friday works" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(reply["isMine"], true);

        let (status, read) = app
            .call(
                Method::POST,
                &format!("/api/conversations/{conversation_id}/read"),
                Some(&seller_token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(read["markedRead"], 2);

        let (status, thread) = app.call(Method::GET, &messages_uri, Some(&buyer_token), None).await;
        assert_eq!(status, StatusCode::OK);
        let thread = thread.as_array().unwrap();
        assert_eq!(thread.len(), 3);
        assert_eq!(thread[0]["isMine"], true);
        assert_eq!(thread[0]["isRead"], true);
        assert_eq!(thread[2]["isMine"], false);
        assert_eq!(thread[2]["isRead"], false);
    }

    #[tokio::test]
    async fn test_outsiders_and_owners_are_turned_away() {
        let app = TestApp::new();
        let category = app.category("Apartments").await;
        let (seller, seller_token) = app.user("seller@example.com", Role::Agent).await;
        let (_, buyer_token) = app.user("buyer@example.com", Role::User).await;
        let (_, admin_token) = app.user("admin@example.com", Role::Admin).await;
        let listing = app.listing(&seller, &category, "Kraków").await;

        let (status, _) = app
            .call(
                Method::POST,
                "/api/conversations",
                Some(&seller_token),
                Some(json!({ "listingId": listing.id, "content": "Talking to myself" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, started) = app
            .call(
                Method::POST,
                "/api/conversations",
                Some(&buyer_token),
                Some(json!({ "listingId": listing.id, "content": "Hello" })),
            )
            .await;
        let messages_uri = format!("/api/conversations/{}/messages", started["id"].as_str().unwrap());

        let (status, body) = app.call(Method::GET, &messages_uri, Some(&admin_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Access denied");

        let (status, _) = app
            .call(Method::POST, &messages_uri, Some(&admin_token), Some(json!({ "content": "hi" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.call(Method::GET, &messages_uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
