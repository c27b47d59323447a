//! Pub/sub fan-out across connections.

mod support;

use support::*;

#[tokio::test]
async fn subscribe_confirmations_count_up() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let frame = array_of(client.run(cmd![b"SUBSCRIBE", b"news"]).await);
    assert_str(&frame[0], "subscribe");
    assert_str(&frame[1], "news");
    assert_int(&frame[2], 1);

    client.send(cmd![b"SUBSCRIBE", b"tech", b"sports"]).await;
    let frame = array_of(client.read().await);
    assert_str(&frame[1], "tech");
    assert_int(&frame[2], 2);
    let frame = array_of(client.read().await);
    assert_str(&frame[1], "sports");
    assert_int(&frame[2], 3);
}

#[tokio::test]
async fn publish_reaches_every_subscriber() {
    let server = TestServer::start().await;
    let mut alice = server.client().await;
    let mut bob = server.client().await;
    let mut carol = server.client().await;

    alice.run(cmd![b"SUBSCRIBE", b"c"]).await;
    bob.run(cmd![b"SUBSCRIBE", b"c"]).await;

    assert_int(&carol.run(cmd![b"PUBLISH", b"c", b"hi"]).await, 2);

    for subscriber in [&mut alice, &mut bob] {
        let frame = array_of(subscriber.read().await);
        assert_str(&frame[0], "message");
        assert_str(&frame[1], "c");
        assert_str(&frame[2], "hi");
    }
}

#[tokio::test]
async fn patterns_deliver_pmessage_frames() {
    let server = TestServer::start().await;
    let mut subscriber = server.client().await;
    let mut publisher = server.client().await;

    subscriber.run(cmd![b"PSUBSCRIBE", b"news.*"]).await;

    assert_int(&publisher.run(cmd![b"PUBLISH", b"news.tech", b"story"]).await, 1);
    assert_int(&publisher.run(cmd![b"PUBLISH", b"sports", b"nope"]).await, 0);

    let frame = array_of(subscriber.read().await);
    assert_str(&frame[0], "pmessage");
    assert_str(&frame[1], "news.*");
    assert_str(&frame[2], "news.tech");
    assert_str(&frame[3], "story");
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let server = TestServer::start().await;
    let mut subscriber = server.client().await;
    let mut publisher = server.client().await;

    subscriber.run(cmd![b"SUBSCRIBE", b"c"]).await;
    let frame = array_of(subscriber.run(cmd![b"UNSUBSCRIBE", b"c"]).await);
    assert_str(&frame[0], "unsubscribe");
    assert_int(&frame[2], 0);

    assert_int(&publisher.run(cmd![b"PUBLISH", b"c", b"hi"]).await, 0);
}

#[tokio::test]
async fn subscriber_mode_rejects_other_commands() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"SUBSCRIBE", b"c"]).await;
    let error = error_of(&client.run(cmd![b"GET", b"k"]).await);
    assert!(error.contains("only (P)SUBSCRIBE"), "{error}");

    // PING still works.
    assert_str(&client.run(cmd![b"PING"]).await, "PONG");
}

#[tokio::test]
async fn pubsub_introspection() {
    let server = TestServer::start().await;
    let mut alice = server.client().await;
    let mut bob = server.client().await;

    alice.run(cmd![b"SUBSCRIBE", b"news"]).await;
    bob.run(cmd![b"SUBSCRIBE", b"news"]).await;
    alice.run(cmd![b"PSUBSCRIBE", b"n*"]).await;

    let mut other = server.client().await;
    let channels = array_of(other.run(cmd![b"PUBSUB", b"CHANNELS"]).await);
    assert_eq!(channels.len(), 1);
    assert_str(&channels[0], "news");

    let numsub = array_of(other.run(cmd![b"PUBSUB", b"NUMSUB", b"news", b"ghost"]).await);
    assert_str(&numsub[0], "news");
    assert_int(&numsub[1], 2);
    assert_int(&numsub[3], 0);

    assert_int(&other.run(cmd![b"PUBSUB", b"NUMPAT"]).await, 1);
}
