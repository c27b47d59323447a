//! TTL semantics over the wire.

mod support;

use std::time::Duration;
use support::*;

#[tokio::test]
async fn set_with_ttl_expires() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_str(&client.run(cmd![b"SET", b"foo", b"bar", b"PX", b"80"]).await, "OK");
    assert_str(&client.run(cmd![b"GET", b"foo"]).await, "bar");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_nil(&client.run(cmd![b"GET", b"foo"]).await);
    assert_int(&client.run(cmd![b"EXISTS", b"foo"]).await, 0);
    assert_int(&client.run(cmd![b"TTL", b"foo"]).await, -2);
}

#[tokio::test]
async fn ttl_reports_state() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_int(&client.run(cmd![b"TTL", b"missing"]).await, -2);

    client.run(cmd![b"SET", b"k", b"v"]).await;
    assert_int(&client.run(cmd![b"TTL", b"k"]).await, -1);

    assert_int(&client.run(cmd![b"EXPIRE", b"k", b"100"]).await, 1);
    let ttl = int_of(&client.run(cmd![b"TTL", b"k"]).await);
    assert!((95..=100).contains(&ttl), "ttl {ttl}");

    let pttl = int_of(&client.run(cmd![b"PTTL", b"k"]).await);
    assert!((95_000..=100_000).contains(&pttl), "pttl {pttl}");
}

#[tokio::test]
async fn persist_clears_exactly_once() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"SET", b"k", b"v"]).await;
    client.run(cmd![b"EXPIRE", b"k", b"100"]).await;
    assert_int(&client.run(cmd![b"PERSIST", b"k"]).await, 1);
    assert_int(&client.run(cmd![b"PERSIST", b"k"]).await, 0);
    assert_int(&client.run(cmd![b"TTL", b"k"]).await, -1);
}

#[tokio::test]
async fn set_clears_ttl_keepttl_preserves() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"SET", b"k", b"v", b"EX", b"100"]).await;
    client.run(cmd![b"SET", b"k", b"w"]).await;
    assert_int(&client.run(cmd![b"TTL", b"k"]).await, -1);

    client.run(cmd![b"SET", b"k", b"v", b"EX", b"100"]).await;
    client.run(cmd![b"SET", b"k", b"w", b"KEEPTTL"]).await;
    assert!(int_of(&client.run(cmd![b"TTL", b"k"]).await) > 0);
}

#[tokio::test]
async fn expire_with_past_deadline_deletes() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"SET", b"k", b"v"]).await;
    assert_int(&client.run(cmd![b"EXPIRE", b"k", b"-1"]).await, 1);
    assert_int(&client.run(cmd![b"EXISTS", b"k"]).await, 0);

    client.run(cmd![b"SET", b"k", b"v"]).await;
    assert_int(&client.run(cmd![b"EXPIREAT", b"k", b"1"]).await, 1);
    assert_int(&client.run(cmd![b"EXISTS", b"k"]).await, 0);
}

#[tokio::test]
async fn active_expiry_removes_idle_keys() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    for i in 0..50 {
        let key = format!("volatile:{i}");
        client.run(cmd![b"SET", key.as_bytes(), b"x", b"PX", b"40"]).await;
    }

    // Without any reads, the timer sweep alone should reclaim them.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let size = int_of(&client.run(cmd![b"DBSIZE"]).await);
    assert_eq!(size, 0, "{size} keys survived the sweep");
}

#[tokio::test]
async fn setex_rejects_bad_ttls() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let error = error_of(&client.run(cmd![b"SETEX", b"k", b"0", b"v"]).await);
    assert!(error.contains("invalid expire time"), "{error}");
    let error = error_of(&client.run(cmd![b"SETEX", b"k", b"-5", b"v"]).await);
    assert!(error.contains("invalid expire time"), "{error}");

    assert_str(&client.run(cmd![b"SETEX", b"k", b"100", b"v"]).await, "OK");
    assert!(int_of(&client.run(cmd![b"TTL", b"k"]).await) > 0);
}
