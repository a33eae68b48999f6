//! 读写交错与并发成员变更

mod support;

use std::sync::Arc;
use std::time::Duration;

use application::{
    CacheKey, CacheStore, CreateGroupRequest, FetchMessagesRequest, MemberChangeRequest,
    MessageScope, MessagesPage, SendGroupMessageRequest, SendPrivateMessageRequest,
};
use domain::{ConversationKey, GroupId, GroupRepository, Pagination, UserId};
use support::Harness;

const READ_DELAY: Duration = Duration::from_millis(50);

fn private_text(sender: UserId, receiver: UserId, text: &str) -> SendPrivateMessageRequest {
    SendPrivateMessageRequest {
        sender_id: sender,
        receiver_id: receiver,
        text: Some(text.to_string()),
        attachment: None,
    }
}

fn group_text(sender: UserId, group_id: GroupId, text: &str) -> SendGroupMessageRequest {
    SendGroupMessageRequest {
        sender_id: sender,
        group_id,
        text: Some(text.to_string()),
        attachment: None,
        client_message_id: None,
    }
}

fn first_page(viewer: UserId, scope: MessageScope) -> FetchMessagesRequest {
    FetchMessagesRequest {
        viewer,
        scope,
        pagination: Pagination::first(),
    }
}

fn message_count(page: MessagesPage) -> usize {
    match page {
        MessagesPage::Conversation(page) => page.messages.len(),
        MessagesPage::Group(page) => page.messages.len(),
    }
}

#[tokio::test(start_paused = true)]
async fn conversation_read_racing_a_send_leaves_no_stale_page() {
    let h = Harness::with_slow_reads(READ_DELAY);
    let alice = h.user("Alice").await;
    let bob = h.user("Bob").await;
    h.message_service
        .send_private_message(private_text(alice, bob, "first"))
        .await
        .unwrap();

    // 读取在存储返回后停顿，发送落在读取与回填之间
    let (stale, sent) = tokio::join!(
        h.message_service
            .fetch_messages_page(first_page(bob, MessageScope::Conversation { peer: alice })),
        async {
            tokio::time::sleep(READ_DELAY / 2).await;
            h.message_service
                .send_private_message(private_text(alice, bob, "second"))
                .await
        }
    );
    assert_eq!(message_count(stale.unwrap()), 1);
    sent.unwrap();

    let key = CacheKey::conversation_messages(&ConversationKey::between(alice, bob));
    assert!(h.cache_store.get(key.as_str()).await.unwrap().is_none());

    let fresh = h
        .message_service
        .fetch_messages_page(first_page(alice, MessageScope::Conversation { peer: bob }))
        .await
        .unwrap();
    assert_eq!(message_count(fresh), 2);
    assert!(h.cache_store.get(key.as_str()).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn group_read_racing_a_send_leaves_no_stale_page() {
    let h = Harness::with_slow_reads(READ_DELAY);
    let admin = h.user("Admin").await;
    let member = h.user("Member").await;
    let group = h
        .group_service
        .create_group(CreateGroupRequest {
            creator_id: admin,
            name: "race".to_string(),
            member_ids: vec![member],
        })
        .await
        .unwrap();
    h.message_service
        .send_group_message(group_text(admin, group.id, "first"))
        .await
        .unwrap();

    // 读取方先做成员校验再读分页；发送方的成员校验在分页读取之后、回填之前结束
    let (stale, sent) = tokio::join!(
        h.message_service.fetch_messages_page(first_page(
            member,
            MessageScope::Group { group_id: group.id }
        )),
        async {
            tokio::time::sleep(READ_DELAY / 2).await;
            h.message_service
                .send_group_message(group_text(admin, group.id, "second"))
                .await
        }
    );
    assert_eq!(message_count(stale.unwrap()), 1);
    sent.unwrap();

    let key = CacheKey::group_page(group.id, 1);
    assert!(h.cache_store.get(key.as_str()).await.unwrap().is_none());

    let fresh = h
        .message_service
        .fetch_messages_page(first_page(
            member,
            MessageScope::Group { group_id: group.id },
        ))
        .await
        .unwrap();
    assert_eq!(message_count(fresh), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_add_and_remove_both_take_effect() {
    let h = Harness::with_slow_reads(Duration::from_millis(20));
    let admin = h.user("Admin").await;
    let leaving = h.user("Leaving").await;
    let joining = h.user("Joining").await;
    let group = h
        .group_service
        .create_group(CreateGroupRequest {
            creator_id: admin,
            name: "churn".to_string(),
            member_ids: vec![leaving],
        })
        .await
        .unwrap();

    let change = |target_user_id| MemberChangeRequest {
        group_id: group.id,
        operator_id: admin,
        target_user_id,
    };
    let (removed, added) = tokio::join!(
        h.group_service.remove_member(change(leaving)),
        h.group_service.add_member(change(joining)),
    );
    removed.unwrap();
    added.unwrap();

    let stored = h.groups.find_by_id(group.id).await.unwrap().unwrap();
    assert!(!stored.is_member(leaving));
    assert!(stored.is_member(joining));
    assert!(stored.is_member(admin));
    assert_eq!(stored.version, 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_additions_are_all_kept() {
    let h = Arc::new(Harness::with_slow_reads(Duration::from_millis(20)));
    let admin = h.user("Admin").await;
    let group = h
        .group_service
        .create_group(CreateGroupRequest {
            creator_id: admin,
            name: "crowd".to_string(),
            member_ids: Vec::new(),
        })
        .await
        .unwrap();

    let mut joiners = Vec::new();
    for i in 0..4 {
        joiners.push(h.user(&format!("Joiner{i}")).await);
    }
    let tasks: Vec<_> = joiners
        .iter()
        .map(|&user| {
            let h = h.clone();
            tokio::spawn(async move {
                h.group_service
                    .add_member(MemberChangeRequest {
                        group_id: group.id,
                        operator_id: admin,
                        target_user_id: user,
                    })
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = h.groups.find_by_id(group.id).await.unwrap().unwrap();
    for user in joiners {
        assert!(stored.is_member(user));
    }
    assert_eq!(stored.members.len(), 5);
}
