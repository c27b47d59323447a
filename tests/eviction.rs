//! Memory-budget behavior over the wire.

mod support;

use cinnabar::Config;
use support::*;

fn limited(policy: &str, maxmemory: &str) -> Config {
    let mut config = Config::default();
    config.apply("maxmemory", maxmemory).expect("valid size");
    config.apply("maxmemory-policy", policy).expect("valid policy");
    config
}

#[tokio::test]
async fn noeviction_rejects_writes_over_budget() {
    let server = TestServer::with(limited("noeviction", "20kb")).await;
    let mut client = server.client().await;

    let padding = vec![b'x'; 1024];
    let mut saw_oom = false;
    for i in 0..100 {
        let key = format!("key:{i}");
        let reply = client.run(cmd![b"SET", key.as_bytes(), &padding]).await;
        if let respite::RespValue::Error(error) = reply {
            assert!(error.starts_with(b"OOM"), "{error:?}");
            saw_oom = true;
            break;
        }
    }
    assert!(saw_oom, "the budget never kicked in");

    // Reads still work in over-budget state.
    assert_str(&client.run(cmd![b"PING"]).await, "PONG");
}

#[tokio::test]
async fn allkeys_lru_evicts_instead_of_failing() {
    let server = TestServer::with(limited("allkeys-lru", "40kb")).await;
    let mut client = server.client().await;

    let padding = vec![b'x'; 1024];
    for i in 0..200 {
        let key = format!("key:{i}");
        assert_str(&client.run(cmd![b"SET", key.as_bytes(), &padding]).await, "OK");
    }

    // Evictions kept usage under the budget; some keys are gone.
    let size = int_of(&client.run(cmd![b"DBSIZE"]).await);
    assert!(size < 200, "nothing was evicted");
    assert!(size > 0, "everything was evicted");
}

#[tokio::test]
async fn volatile_ttl_prefers_expiring_keys() {
    let server = TestServer::with(limited("volatile-ttl", "40kb")).await;
    let mut client = server.client().await;

    let padding = vec![b'x'; 1024];
    client.run(cmd![b"SET", b"precious", b"keep-me"]).await;
    for i in 0..200 {
        let key = format!("key:{i}");
        client
            .run(cmd![b"SET", key.as_bytes(), &padding, b"EX", b"1000"])
            .await;
    }

    // Only volatile keys were candidates.
    assert_str(&client.run(cmd![b"GET", b"precious"]).await, "keep-me");
    assert!(int_of(&client.run(cmd![b"DBSIZE"]).await) < 201);
}
