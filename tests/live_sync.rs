use std::{net::SocketAddr, sync::Arc, time::Duration};

use comment_sync::{
    client::{HttpCommentApi, SyncClient, SyncHandle, SyncOptions, SyncState, WsChannel},
    config::Config,
    models::user::{Blog, UserProfile},
    state::AppState,
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

async fn start_server() -> (SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::from_config(&Config::default()).await.unwrap());
    for (id, name) in [("alice", "Alice"), ("bob", "Bob")] {
        state
            .directory
            .save_user(&UserProfile::new(id, name))
            .await
            .unwrap();
    }
    state
        .directory
        .save_blog(&Blog::new("blog-1", "alice", "Rust notes"))
        .await
        .unwrap();

    let app = comment_sync::app(state.clone());
    let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(app.into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);

    (addr, state)
}

fn attach(addr: SocketAddr) -> SyncHandle {
    let api = HttpCommentApi::new(&format!("http://{}", addr)).unwrap();
    let (link, signals, _feed) = WsChannel::spawn(
        format!("ws://{}/api/blog/channel", addr),
        Duration::from_millis(100),
    );
    SyncClient::attach("blog-1", SyncOptions::default(), Arc::new(api), link, signals)
}

async fn wait_for_room(state: &AppState, members: usize) {
    timeout(WAIT, async {
        while state.websocket_service.hub().room_size("blog-1") != members {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("viewers never joined the room");
}

#[tokio::test]
async fn comments_and_replies_reach_every_viewer_once() {
    let (addr, state) = start_server().await;
    let alice = attach(addr);
    let bob = attach(addr);

    for handle in [&alice, &bob] {
        timeout(WAIT, handle.wait_until(|s| s.state == SyncState::Live))
            .await
            .unwrap();
    }
    wait_for_room(&state, 2).await;

    let comment = alice.post_comment("alice", "hello from alice").await.unwrap();

    let seen = timeout(WAIT, bob.wait_until(|s| s.cache.find(&comment.id).is_some()))
        .await
        .unwrap();
    assert_eq!(seen.cache.comments[0].text, "hello from alice");

    let reply = bob
        .post_reply(&comment.id, "bob", "alice", "hi alice")
        .await
        .unwrap();

    let seen = timeout(
        WAIT,
        alice.wait_until(|s| {
            s.cache
                .find(&comment.id)
                .map_or(false, |c| c.replies.iter().any(|r| r.id == reply.id))
        }),
    )
    .await
    .unwrap();

    // Alice's optimistic insert and her echo collapse into one row.
    assert_eq!(seen.cache.len(), 1);
    assert_eq!(seen.cache.total, 1);
    assert_eq!(seen.cache.comments[0].replies.len(), 1);

    alice.detach().await;
    wait_for_room(&state, 1).await;
    bob.detach().await;
}

#[tokio::test]
async fn late_viewer_loads_history_over_rest() {
    let (addr, state) = start_server().await;
    let early = attach(addr);
    timeout(WAIT, early.wait_until(|s| s.state == SyncState::Live))
        .await
        .unwrap();
    wait_for_room(&state, 1).await;

    early.post_comment("bob", "before you came").await.unwrap();

    let late = attach(addr);
    let snapshot = timeout(WAIT, late.wait_until(|s| s.state == SyncState::Live))
        .await
        .unwrap();
    assert_eq!(snapshot.cache.len(), 1);
    assert_eq!(snapshot.cache.comments[0].text, "before you came");

    early.detach().await;
    late.detach().await;
}
