//! EVAL/EVALSHA and the script cache.

mod support;

use support::*;

#[tokio::test]
async fn eval_returns_converted_values() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_int(&client.run(cmd![b"EVAL", b"return 1 + 2", b"0"]).await, 3);
    assert_str(&client.run(cmd![b"EVAL", b"return 'hello'", b"0"]).await, "hello");
    assert_nil(&client.run(cmd![b"EVAL", b"return nil", b"0"]).await);
    assert_int(&client.run(cmd![b"EVAL", b"return true", b"0"]).await, 1);
    assert_nil(&client.run(cmd![b"EVAL", b"return false", b"0"]).await);

    let items = array_of(client.run(cmd![b"EVAL", b"return {1, 2, 'three'}", b"0"]).await);
    assert_int(&items[0], 1);
    assert_int(&items[1], 2);
    assert_str(&items[2], "three");
}

#[tokio::test]
async fn keys_and_argv_are_bound() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_str(
        &client.run(cmd![b"EVAL", b"return KEYS[1]", b"1", b"mykey"]).await,
        "mykey",
    );
    assert_str(
        &client
            .run(cmd![b"EVAL", b"return ARGV[2]", b"0", b"first", b"second"])
            .await,
        "second",
    );
}

#[tokio::test]
async fn scripts_call_back_into_commands() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_str(
        &client
            .run(cmd![
                b"EVAL",
                b"return server.call('SET', KEYS[1], ARGV[1])",
                b"1",
                b"k",
                b"v",
            ])
            .await,
        "OK",
    );
    assert_str(&client.run(cmd![b"GET", b"k"]).await, "v");

    assert_str(
        &client
            .run(cmd![b"EVAL", b"return redis.call('GET', KEYS[1])", b"1", b"k"])
            .await,
        "v",
    );

    assert_int(
        &client
            .run(cmd![b"EVAL", b"return server.call('INCR', KEYS[1])", b"1", b"n"])
            .await,
        1,
    );
}

#[tokio::test]
async fn call_errors_become_the_reply() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"RPUSH", b"list", b"x"]).await;
    let error = error_of(
        &client
            .run(cmd![b"EVAL", b"return server.call('INCR', KEYS[1])", b"1", b"list"])
            .await,
    );
    assert!(error.starts_with("WRONGTYPE"), "{error}");

    // pcall reports the error as a value instead of failing the script.
    let error = error_of(
        &client
            .run(cmd![
                b"EVAL",
                b"local e = server.pcall('INCR', KEYS[1]) return e",
                b"1",
                b"list",
            ])
            .await,
    );
    assert!(error.starts_with("WRONGTYPE"), "{error}");
}

#[tokio::test]
async fn evalsha_uses_the_cache() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let missing = "0000000000000000000000000000000000000000";
    let error = error_of(&client.run(cmd![b"EVALSHA", missing.as_bytes(), b"0"]).await);
    assert!(error.starts_with("NOSCRIPT"), "{error}");

    let sha = string_of(&client.run(cmd![b"SCRIPT", b"LOAD", b"return 7"]).await);
    assert_eq!(sha.len(), 40);
    assert_int(&client.run(cmd![b"EVALSHA", &sha, b"0"]).await, 7);

    // EVAL also registers the script.
    client.run(cmd![b"EVAL", b"return 8", b"0"]).await;
    let flags = array_of(
        client
            .run(cmd![b"SCRIPT", b"EXISTS", &sha, missing.as_bytes()])
            .await,
    );
    assert_int(&flags[0], 1);
    assert_int(&flags[1], 0);

    let shown = string_of(&client.run(cmd![b"SCRIPT", b"SHOW", &sha]).await);
    assert_eq!(shown, b"return 7");

    assert_str(&client.run(cmd![b"SCRIPT", b"FLUSH"]).await, "OK");
    let error = error_of(&client.run(cmd![b"EVALSHA", &sha, b"0"]).await);
    assert!(error.starts_with("NOSCRIPT"), "{error}");
}

#[tokio::test]
async fn scripts_cannot_nest() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let error = error_of(
        &client
            .run(cmd![b"EVAL", b"return server.call('EVAL', 'return 1', '0')", b"0"])
            .await,
    );
    assert!(error.contains("not allowed from script"), "{error}");
}
