mod support;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;
use support::{token_for, DownStore, TestApp, TestUser};
use uuid::Uuid;

#[tokio::test]
async fn health_needs_no_token_but_api_does() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.send(Method::GET, "/api/v1/contacts", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let forged = TestUser {
        id: Uuid::new_v4(),
        token: format!("{}x", token_for(Uuid::new_v4())),
    };
    let (status, _) = app
        .send(Method::GET, "/api/v1/contacts", Some(&forged), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn private_message_round_trip_over_http() {
    let app = TestApp::new();
    let alice = app.user("Alice").await;
    let bob = app.user("Bob").await;

    let (status, sent) = app
        .send(
            Method::POST,
            "/api/v1/messages/private",
            Some(&alice),
            Some(json!({ "receiverId": bob.id, "text": "hi bob" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["sender"]["fullName"], "Alice");

    let (status, page) = app
        .send(
            Method::GET,
            &format!("/api/v1/conversations/{}/messages?page=1&limit=20", alice.id),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["totalCount"], 1);
    assert_eq!(page["hasMore"], false);
    assert_eq!(page["messages"][0]["id"], sent["id"]);

    let (status, partners) = app
        .send(Method::GET, "/api/v1/chat-partners", Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(partners[0]["fullName"], "Alice");
}

#[tokio::test]
async fn empty_message_and_self_message_are_bad_requests() {
    let app = TestApp::new();
    let alice = app.user("Alice").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/messages/private",
            Some(&alice),
            Some(json!({ "receiverId": alice.id, "text": "me" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/groups",
            Some(&alice),
            Some(json!({ "name": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_reaction_is_conflict() {
    let app = TestApp::new();
    let alice = app.user("Alice").await;
    let bob = app.user("Bob").await;
    let (_, sent) = app
        .send(
            Method::POST,
            "/api/v1/messages/private",
            Some(&alice),
            Some(json!({ "receiverId": bob.id, "text": "react" })),
        )
        .await;

    let reaction = json!({
        "targetMessageId": sent["id"],
        "targetKind": "private",
        "emoji": "🎉",
    });
    let (status, _) = app
        .send(Method::POST, "/api/v1/reactions", Some(&bob), Some(reaction.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(Method::POST, "/api/v1/reactions", Some(&bob), Some(reaction))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_REACTION");

    let message_id = sent["id"].as_str().unwrap_or_default().to_string();
    let (status, groups) = app
        .send(
            Method::GET,
            &format!("/api/v1/messages/{message_id}/reactions?targetKind=private"),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(groups["🎉"][0]["fullName"], "Bob");
}

#[tokio::test]
async fn bulk_reactions_drop_optimistic_ids() {
    let app = TestApp::new();
    let alice = app.user("Alice").await;
    let bob = app.user("Bob").await;
    let (_, sent) = app
        .send(
            Method::POST,
            "/api/v1/messages/private",
            Some(&alice),
            Some(json!({ "receiverId": bob.id, "text": "bulk" })),
        )
        .await;
    let message_id = sent["id"].as_str().unwrap_or_default().to_string();

    let (status, bulk) = app
        .send(
            Method::POST,
            "/api/v1/reactions/bulk",
            Some(&alice),
            Some(json!({
                "messageIds": [message_id, "temp-1700000000", "not-a-uuid"],
                "targetKind": "private",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<_> = bulk
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    assert_eq!(keys, vec![message_id]);
}

#[tokio::test]
async fn group_history_is_hidden_from_outsiders() {
    let app = TestApp::new();
    let admin = app.user("Admin").await;
    let member = app.user("Member").await;
    let outsider = app.user("Outsider").await;

    let (status, group) = app
        .send(
            Method::POST,
            "/api/v1/groups",
            Some(&admin),
            Some(json!({ "name": "team", "memberIds": [member.id] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_str().unwrap_or_default().to_string();

    let (status, sent) = app
        .send(
            Method::POST,
            &format!("/api/v1/groups/{group_id}/messages"),
            Some(&member),
            Some(json!({ "text": "hello", "clientMessageId": "temp-7" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["clientMessageId"], "temp-7");

    let uri = format!("/api/v1/groups/{group_id}/messages");
    let (status, page) = app.send(Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["messages"][0]["text"], "hello");
    assert!(page["messages"][0].get("clientMessageId").is_none());

    let (status, body) = app.send(Method::GET, &uri, Some(&outsider), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_GROUP_MEMBER");

    // 非管理员不能移除成员
    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/v1/groups/{group_id}/members/{}", admin.id),
            Some(&member),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn inline_upload_without_upload_service_is_unavailable() {
    let app = TestApp::new();
    let alice = app.user("Alice").await;
    let bob = app.user("Bob").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/messages/private",
            Some(&alice),
            Some(json!({
                "receiverId": bob.id,
                "attachment": { "data": "data:image/png;base64,aGVsbG8=", "fileName": "a.png" },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "UPLOAD_UNAVAILABLE");

    let (status, sent) = app
        .send(
            Method::POST,
            "/api/v1/messages/private",
            Some(&alice),
            Some(json!({
                "receiverId": bob.id,
                "attachment": { "url": "https://cdn.test/clip.mp4" },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["attachmentUrl"], "https://cdn.test/clip.mp4");
}

#[tokio::test]
async fn health_reports_unreachable_store() {
    let app = TestApp::with_store_health(Arc::new(DownStore));
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unavailable");
}

#[tokio::test]
async fn bulk_conversations_return_first_pages() {
    let app = TestApp::new();
    let alice = app.user("Alice").await;
    let bob = app.user("Bob").await;
    let carol = app.user("Carol").await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/messages/private",
            Some(&bob),
            Some(json!({ "receiverId": alice.id, "text": "ping" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/messages/bulk",
            Some(&alice),
            Some(json!({ "conversationIds": [format!("{}_{}", bob.id, alice.id)] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let conversations = body["conversations"].as_object().unwrap();
    assert_eq!(conversations.len(), 1);
    let page = conversations.values().next().unwrap();
    assert_eq!(page["messages"][0]["text"], "ping");
    assert_eq!(page["hasMore"], false);

    // 不能借批量接口读取别人的会话
    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/messages/bulk",
            Some(&carol),
            Some(json!({ "conversationIds": [format!("{}_{}", alice.id, bob.id)] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/messages/bulk",
            Some(&alice),
            Some(json!({ "conversationIds": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
