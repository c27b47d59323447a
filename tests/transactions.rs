//! MULTI/EXEC/WATCH behavior, including cross-connection invalidation.

mod support;

use respite::RespValue;
use support::*;

#[tokio::test]
async fn exec_runs_queued_commands_in_order() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_str(&client.run(cmd![b"MULTI"]).await, "OK");
    assert_str(&client.run(cmd![b"SET", b"a", b"1"]).await, "QUEUED");
    assert_str(&client.run(cmd![b"INCR", b"a"]).await, "QUEUED");
    let replies = array_of(client.run(cmd![b"EXEC"]).await);
    assert_eq!(replies.len(), 2);
    assert_str(&replies[0], "OK");
    assert_int(&replies[1], 2);

    assert_str(&client.run(cmd![b"GET", b"a"]).await, "2");
}

#[tokio::test]
async fn errors_inside_exec_fill_their_slot() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"RPUSH", b"list", b"x"]).await;
    client.run(cmd![b"MULTI"]).await;
    client.run(cmd![b"INCR", b"list"]).await;
    client.run(cmd![b"SET", b"ok", b"yes"]).await;

    let replies = array_of(client.run(cmd![b"EXEC"]).await);
    assert_eq!(replies.len(), 2);
    assert!(matches!(replies[0], RespValue::Error(_)));
    assert_str(&replies[1], "OK");
    assert_str(&client.run(cmd![b"GET", b"ok"]).await, "yes");
}

#[tokio::test]
async fn queueing_errors_abort_exec() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"MULTI"]).await;
    // Wrong arity is detected while queueing and poisons the transaction.
    let error = error_of(&client.run(cmd![b"GET"]).await);
    assert!(error.starts_with("ERR wrong number of arguments"), "{error}");
    assert_str(&client.run(cmd![b"SET", b"a", b"1"]).await, "QUEUED");

    let error = error_of(&client.run(cmd![b"EXEC"]).await);
    assert!(error.starts_with("EXECABORT"), "{error}");
    assert_nil(&client.run(cmd![b"GET", b"a"]).await);
}

#[tokio::test]
async fn nested_multi_and_stray_exec() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let error = error_of(&client.run(cmd![b"EXEC"]).await);
    assert_eq!(error, "ERR EXEC without MULTI");
    let error = error_of(&client.run(cmd![b"DISCARD"]).await);
    assert_eq!(error, "ERR DISCARD without MULTI");

    client.run(cmd![b"MULTI"]).await;
    let error = error_of(&client.run(cmd![b"MULTI"]).await);
    assert_eq!(error, "ERR MULTI calls can not be nested");
    let error = error_of(&client.run(cmd![b"WATCH", b"k"]).await);
    assert_eq!(error, "ERR WATCH inside MULTI is not allowed");
    client.run(cmd![b"DISCARD"]).await;
}

#[tokio::test]
async fn discard_drops_the_queue() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"MULTI"]).await;
    client.run(cmd![b"SET", b"a", b"1"]).await;
    assert_str(&client.run(cmd![b"DISCARD"]).await, "OK");
    assert_nil(&client.run(cmd![b"GET", b"a"]).await);
}

#[tokio::test]
async fn watch_aborts_after_foreign_write() {
    let server = TestServer::start().await;
    let mut alice = server.client().await;
    let mut bob = server.client().await;

    alice.run(cmd![b"SET", b"k", b"v0"]).await;
    assert_str(&alice.run(cmd![b"WATCH", b"k"]).await, "OK");
    alice.run(cmd![b"MULTI"]).await;
    alice.run(cmd![b"SET", b"k", b"v1"]).await;

    // Bob writes the watched key inside Alice's window.
    assert_str(&bob.run(cmd![b"SET", b"k", b"vX"]).await, "OK");

    assert_nil(&alice.run(cmd![b"EXEC"]).await);
    assert_str(&alice.run(cmd![b"GET", b"k"]).await, "vX");
}

#[tokio::test]
async fn watch_without_interference_commits() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"SET", b"k", b"v0"]).await;
    client.run(cmd![b"WATCH", b"k"]).await;
    client.run(cmd![b"MULTI"]).await;
    client.run(cmd![b"SET", b"k", b"v1"]).await;

    let replies = array_of(client.run(cmd![b"EXEC"]).await);
    assert_str(&replies[0], "OK");
    assert_str(&client.run(cmd![b"GET", b"k"]).await, "v1");
}

#[tokio::test]
async fn unwatch_clears_the_window() {
    let server = TestServer::start().await;
    let mut alice = server.client().await;
    let mut bob = server.client().await;

    alice.run(cmd![b"WATCH", b"k"]).await;
    bob.run(cmd![b"SET", b"k", b"dirty"]).await;
    assert_str(&alice.run(cmd![b"UNWATCH"]).await, "OK");

    // A fresh watch after the write is clean.
    alice.run(cmd![b"WATCH", b"k"]).await;
    alice.run(cmd![b"MULTI"]).await;
    alice.run(cmd![b"SET", b"k", b"mine"]).await;
    let replies = array_of(alice.run(cmd![b"EXEC"]).await);
    assert_str(&replies[0], "OK");
}

#[tokio::test]
async fn watching_an_expiring_key_aborts() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"SET", b"k", b"v"]).await;
    client.run(cmd![b"PEXPIRE", b"k", b"50"]).await;
    client.run(cmd![b"WATCH", b"k"]).await;
    client.run(cmd![b"MULTI"]).await;
    client.run(cmd![b"SET", b"k", b"new"]).await;

    tokio::time::sleep(std::time::Duration::from_millis(400)).await;

    // The active expiry cycle deleted the watched key.
    assert_nil(&client.run(cmd![b"EXEC"]).await);
}
