//! End-to-end command tests over in-memory connections.

mod support;

use support::*;

#[tokio::test]
async fn ping_and_echo() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_str(&client.run(cmd![b"PING"]).await, "PONG");
    assert_str(&client.run(cmd![b"PING", b"hello"]).await, "hello");
    assert_str(&client.run(cmd![b"ECHO", b"hi"]).await, "hi");
}

#[tokio::test]
async fn unknown_commands_and_arity() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let error = error_of(&client.run(cmd![b"FROBNICATE"]).await);
    assert!(error.starts_with("ERR unknown command 'FROBNICATE'"), "{error}");

    let error = error_of(&client.run(cmd![b"GET"]).await);
    assert_eq!(error, "ERR wrong number of arguments for 'get' command");
}

#[tokio::test]
async fn strings_roundtrip() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_str(&client.run(cmd![b"SET", b"greeting", b"hello"]).await, "OK");
    assert_str(&client.run(cmd![b"GET", b"greeting"]).await, "hello");
    assert_nil(&client.run(cmd![b"GET", b"missing"]).await);

    assert_int(&client.run(cmd![b"APPEND", b"greeting", b" world"]).await, 11);
    assert_int(&client.run(cmd![b"STRLEN", b"greeting"]).await, 11);
    assert_str(&client.run(cmd![b"GETRANGE", b"greeting", b"0", b"4"]).await, "hello");
    assert_str(&client.run(cmd![b"GETRANGE", b"greeting", b"-5", b"-1"]).await, "world");
}

#[tokio::test]
async fn set_options() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_str(&client.run(cmd![b"SET", b"k", b"1", b"NX"]).await, "OK");
    assert_nil(&client.run(cmd![b"SET", b"k", b"2", b"NX"]).await);
    assert_str(&client.run(cmd![b"GET", b"k"]).await, "1");

    assert_str(&client.run(cmd![b"SET", b"k", b"3", b"XX"]).await, "OK");
    assert_nil(&client.run(cmd![b"SET", b"absent", b"x", b"XX"]).await);

    let error = error_of(&client.run(cmd![b"SET", b"k", b"v", b"NX", b"XX"]).await);
    assert_eq!(error, "ERR syntax error");

    // SET ... GET returns the previous value.
    assert_str(&client.run(cmd![b"SET", b"k", b"4", b"GET"]).await, "3");
}

#[tokio::test]
async fn counters() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_int(&client.run(cmd![b"INCR", b"n"]).await, 1);
    assert_int(&client.run(cmd![b"INCRBY", b"n", b"9"]).await, 10);
    assert_int(&client.run(cmd![b"DECR", b"n"]).await, 9);
    assert_int(&client.run(cmd![b"DECRBY", b"n", b"4"]).await, 5);
    assert_str(&client.run(cmd![b"INCRBYFLOAT", b"n", b"0.5"]).await, "5.5");

    client.run(cmd![b"SET", b"text", b"abc"]).await;
    let error = error_of(&client.run(cmd![b"INCR", b"text"]).await);
    assert_eq!(error, "ERR value is not an integer or out of range");
}

#[tokio::test]
async fn wrong_type_is_reported() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"RPUSH", b"list", b"x"]).await;
    let error = error_of(&client.run(cmd![b"GET", b"list"]).await);
    assert!(error.starts_with("WRONGTYPE"), "{error}");
    let error = error_of(&client.run(cmd![b"INCR", b"list"]).await);
    assert!(error.starts_with("WRONGTYPE"), "{error}");
}

#[tokio::test]
async fn lists() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_int(&client.run(cmd![b"RPUSH", b"q", b"x", b"y", b"z"]).await, 3);
    let items = array_of(client.run(cmd![b"LRANGE", b"q", b"0", b"-1"]).await);
    assert_eq!(items.len(), 3);
    assert_str(&items[0], "x");
    assert_str(&items[2], "z");

    assert_int(&client.run(cmd![b"LREM", b"q", b"0", b"y"]).await, 1);
    assert_int(&client.run(cmd![b"LLEN", b"q"]).await, 2);

    assert_int(&client.run(cmd![b"LPUSH", b"q", b"a"]).await, 3);
    assert_str(&client.run(cmd![b"LPOP", b"q"]).await, "a");
    assert_str(&client.run(cmd![b"RPOP", b"q"]).await, "z");

    assert_int(
        &client.run(cmd![b"LINSERT", b"q", b"BEFORE", b"x", b"w"]).await,
        2,
    );
    assert_str(&client.run(cmd![b"LINDEX", b"q", b"0"]).await, "w");
    assert_str(&client.run(cmd![b"LSET", b"q", b"0", b"v"]).await, "OK");
    assert_str(&client.run(cmd![b"LINDEX", b"q", b"0"]).await, "v");

    // Popping the last element removes the key.
    client.run(cmd![b"RPOP", b"q"]).await;
    client.run(cmd![b"RPOP", b"q"]).await;
    assert_int(&client.run(cmd![b"EXISTS", b"q"]).await, 0);
}

#[tokio::test]
async fn hashes() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_int(
        &client.run(cmd![b"HSET", b"h", b"a", b"1", b"b", b"2"]).await,
        2,
    );
    assert_str(&client.run(cmd![b"HGET", b"h", b"a"]).await, "1");
    assert_nil(&client.run(cmd![b"HGET", b"h", b"zz"]).await);
    assert_int(&client.run(cmd![b"HLEN", b"h"]).await, 2);
    assert_int(&client.run(cmd![b"HEXISTS", b"h", b"b"]).await, 1);
    assert_int(&client.run(cmd![b"HINCRBY", b"h", b"a", b"9"]).await, 10);
    assert_int(&client.run(cmd![b"HSETNX", b"h", b"a", b"0"]).await, 0);
    assert_int(&client.run(cmd![b"HDEL", b"h", b"a", b"b"]).await, 2);
    assert_int(&client.run(cmd![b"EXISTS", b"h"]).await, 0);
}

#[tokio::test]
async fn sets() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_int(&client.run(cmd![b"SADD", b"s", b"a", b"b", b"c", b"a"]).await, 3);
    assert_int(&client.run(cmd![b"SCARD", b"s"]).await, 3);
    assert_int(&client.run(cmd![b"SISMEMBER", b"s", b"a"]).await, 1);

    client.run(cmd![b"SADD", b"t", b"b", b"c", b"d"]).await;
    let inter = array_of(client.run(cmd![b"SINTER", b"s", b"t"]).await);
    assert_eq!(inter.len(), 2);
    let diff = array_of(client.run(cmd![b"SDIFF", b"s", b"t"]).await);
    assert_eq!(diff.len(), 1);
    assert_str(&diff[0], "a");
    let union = array_of(client.run(cmd![b"SUNION", b"s", b"t"]).await);
    assert_eq!(union.len(), 4);

    assert_int(&client.run(cmd![b"SINTERSTORE", b"dst", b"s", b"t"]).await, 2);
    assert_int(&client.run(cmd![b"SCARD", b"dst"]).await, 2);

    assert_int(&client.run(cmd![b"SMOVE", b"s", b"t", b"a"]).await, 1);
    assert_int(&client.run(cmd![b"SISMEMBER", b"t", b"a"]).await, 1);
}

#[tokio::test]
async fn sorted_sets() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_int(
        &client
            .run(cmd![b"ZADD", b"s", b"1", b"a", b"2", b"b", b"3", b"c"])
            .await,
        3,
    );

    let members = array_of(client.run(cmd![b"ZRANGE", b"s", b"0", b"-1"]).await);
    assert_eq!(members.len(), 3);
    assert_str(&members[0], "a");
    assert_str(&members[2], "c");

    assert_int(&client.run(cmd![b"ZRANK", b"s", b"b"]).await, 1);
    assert_int(&client.run(cmd![b"ZREVRANK", b"s", b"b"]).await, 1);
    assert_str(&client.run(cmd![b"ZSCORE", b"s", b"b"]).await, "2");
    assert_int(&client.run(cmd![b"ZCOUNT", b"s", b"2", b"3"]).await, 2);

    // Strict lower bound.
    let members = array_of(
        client
            .run(cmd![b"ZRANGEBYSCORE", b"s", b"(1", b"+inf"])
            .await,
    );
    assert_eq!(members.len(), 2);
    assert_str(&members[0], "b");
    assert_str(&members[1], "c");

    let popped = array_of(client.run(cmd![b"ZPOPMAX", b"s"]).await);
    assert_str(&popped[0], "c");
    assert_str(&popped[1], "3");

    assert_int(&client.run(cmd![b"ZREM", b"s", b"a", b"b"]).await, 2);
    assert_int(&client.run(cmd![b"EXISTS", b"s"]).await, 0);
}

#[tokio::test]
async fn zset_tie_break_is_lexicographic() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client
        .run(cmd![b"ZADD", b"s", b"1", b"bb", b"1", b"aa", b"1", b"cc"])
        .await;
    let members = array_of(client.run(cmd![b"ZRANGE", b"s", b"0", b"-1"]).await);
    assert_str(&members[0], "aa");
    assert_str(&members[1], "bb");
    assert_str(&members[2], "cc");
}

#[tokio::test]
async fn key_management() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"MSET", b"a", b"1", b"b", b"2", b"c", b"3"]).await;
    assert_int(&client.run(cmd![b"EXISTS", b"a", b"b", b"zz"]).await, 2);
    assert_int(&client.run(cmd![b"DBSIZE"]).await, 3);
    assert_str(&client.run(cmd![b"TYPE", b"a"]).await, "string");
    assert_str(&client.run(cmd![b"TYPE", b"zz"]).await, "none");

    let keys = array_of(client.run(cmd![b"KEYS", b"*"]).await);
    assert_eq!(keys.len(), 3);

    assert_str(&client.run(cmd![b"RENAME", b"a", b"z"]).await, "OK");
    assert_int(&client.run(cmd![b"EXISTS", b"a"]).await, 0);
    assert_int(&client.run(cmd![b"RENAMENX", b"z", b"b"]).await, 0);
    let error = error_of(&client.run(cmd![b"RENAME", b"nope", b"x"]).await);
    assert_eq!(error, "ERR no such key");

    assert_int(&client.run(cmd![b"DEL", b"z", b"b", b"zz"]).await, 2);
}

#[tokio::test]
async fn scan_covers_the_keyspace() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    for i in 0..200 {
        let key = format!("key:{i}");
        client.run(cmd![b"SET", key.as_bytes(), b"x"]).await;
    }

    let mut seen = std::collections::HashSet::new();
    let mut cursor = b"0".to_vec();
    loop {
        let mut reply = array_of(
            client
                .run(cmd![b"SCAN", &cursor, b"COUNT", b"50"])
                .await,
        );
        let keys = array_of(reply.pop().expect("keys element"));
        cursor = string_of(&reply.pop().expect("cursor element"));
        for key in &keys {
            seen.insert(string_of(key));
        }
        if cursor == b"0" {
            break;
        }
    }
    assert_eq!(seen.len(), 200);
}

#[tokio::test]
async fn select_isolates_databases() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"SET", b"k", b"zero"]).await;
    assert_str(&client.run(cmd![b"SELECT", b"1"]).await, "OK");
    assert_nil(&client.run(cmd![b"GET", b"k"]).await);
    client.run(cmd![b"SET", b"k", b"one"]).await;
    assert_str(&client.run(cmd![b"SELECT", b"0"]).await, "OK");
    assert_str(&client.run(cmd![b"GET", b"k"]).await, "zero");

    let error = error_of(&client.run(cmd![b"SELECT", b"99"]).await);
    assert_eq!(error, "ERR DB index is out of range");
}

#[tokio::test]
async fn bitmaps() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_int(&client.run(cmd![b"SETBIT", b"bits", b"7", b"1"]).await, 0);
    assert_int(&client.run(cmd![b"GETBIT", b"bits", b"7"]).await, 1);
    assert_int(&client.run(cmd![b"GETBIT", b"bits", b"6"]).await, 0);
    assert_int(&client.run(cmd![b"BITCOUNT", b"bits"]).await, 1);

    client.run(cmd![b"SET", b"word", b"foobar"]).await;
    assert_int(&client.run(cmd![b"BITCOUNT", b"word"]).await, 26);
    assert_int(&client.run(cmd![b"BITCOUNT", b"word", b"1", b"1"]).await, 6);
    assert_int(&client.run(cmd![b"BITPOS", b"word", b"1"]).await, 1);

    client.run(cmd![b"SET", b"x", b"\xff"]).await;
    client.run(cmd![b"SET", b"y", b"\x0f"]).await;
    assert_int(&client.run(cmd![b"BITOP", b"AND", b"dst", b"x", b"y"]).await, 1);
    assert_str(&client.run(cmd![b"GET", b"dst"]).await, "\x0f");

    let error = error_of(&client.run(cmd![b"BITOP", b"AND", b"dst", b"x"]).await);
    assert!(error.contains("at least two source keys"), "{error}");

    let replies = array_of(
        client
            .run(cmd![b"BITFIELD", b"bf", b"SET", b"u8", b"0", b"255", b"INCRBY", b"u8", b"0", b"10"])
            .await,
    );
    assert_int(&replies[0], 0);
    // 255 + 10 wraps under the default overflow.
    assert_int(&replies[1], 9);
}

#[tokio::test]
async fn hyperloglog_estimates() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_int(&client.run(cmd![b"PFADD", b"hll", b"a", b"b", b"c"]).await, 1);
    assert_int(&client.run(cmd![b"PFADD", b"hll", b"a"]).await, 0);
    assert_int(&client.run(cmd![b"PFCOUNT", b"hll"]).await, 3);

    client.run(cmd![b"PFADD", b"other", b"c", b"d"]).await;
    assert_int(&client.run(cmd![b"PFCOUNT", b"hll", b"other"]).await, 4);

    assert_str(&client.run(cmd![b"PFMERGE", b"merged", b"hll", b"other"]).await, "OK");
    assert_int(&client.run(cmd![b"PFCOUNT", b"merged"]).await, 4);

    client.run(cmd![b"SET", b"plain", b"text"]).await;
    let error = error_of(&client.run(cmd![b"PFADD", b"plain", b"x"]).await);
    assert!(error.starts_with("WRONGTYPE"), "{error}");
}

#[tokio::test]
async fn geo_commands() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_int(
        &client
            .run(cmd![
                b"GEOADD",
                b"sicily",
                b"13.361389",
                b"38.115556",
                b"Palermo",
                b"15.087269",
                b"37.502669",
                b"Catania",
            ])
            .await,
        2,
    );

    let distance = string_of(&client.run(cmd![b"GEODIST", b"sicily", b"Palermo", b"Catania"]).await);
    let meters: f64 = String::from_utf8_lossy(&distance).parse().unwrap();
    assert!((meters - 166_274.0).abs() < 200.0, "distance {meters}");

    let hashes = array_of(client.run(cmd![b"GEOHASH", b"sicily", b"Palermo"]).await);
    let hash = string_of(&hashes[0]);
    assert!(hash.starts_with(b"sqc8b49"), "{hash:?}");

    let near = array_of(
        client
            .run(cmd![b"GEORADIUS", b"sicily", b"15", b"37", b"200", b"km"])
            .await,
    );
    assert_eq!(near.len(), 1);
    assert_str(&near[0], "Catania");

    // Re-adding an existing member with the same position changes nothing.
    assert_int(
        &client
            .run(cmd![b"GEOADD", b"sicily", b"NX", b"CH", b"13.361389", b"38.115556", b"Palermo"])
            .await,
        0,
    );
}

#[tokio::test]
async fn streams() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let first = string_of(&client.run(cmd![b"XADD", b"log", b"*", b"a", b"1"]).await);
    let second = string_of(&client.run(cmd![b"XADD", b"log", b"*", b"a", b"2"]).await);
    assert!(first < second, "{first:?} < {second:?}");
    assert_int(&client.run(cmd![b"XLEN", b"log"]).await, 2);

    // Explicit ids must exceed the last one.
    let error = error_of(&client.run(cmd![b"XADD", b"log", b"1-1", b"a", b"3"]).await);
    assert!(error.contains("equal or smaller"), "{error}");

    let entries = array_of(client.run(cmd![b"XRANGE", b"log", b"-", b"+"]).await);
    assert_eq!(entries.len(), 2);

    client.run(cmd![b"XADD", b"log", b"*", b"a", b"3"]).await;
    assert_int(&client.run(cmd![b"XTRIM", b"log", b"MAXLEN", b"2"]).await, 1);
    assert_int(&client.run(cmd![b"XLEN", b"log"]).await, 2);
}

#[tokio::test]
async fn consumer_groups() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"XADD", b"jobs", b"1-0", b"task", b"a"]).await;
    client.run(cmd![b"XADD", b"jobs", b"2-0", b"task", b"b"]).await;
    assert_str(
        &client.run(cmd![b"XGROUP", b"CREATE", b"jobs", b"workers", b"0"]).await,
        "OK",
    );

    // New deliveries go to the pending list.
    let reply = array_of(
        client
            .run(cmd![
                b"XREADGROUP", b"GROUP", b"workers", b"alice", b"COUNT", b"10", b"STREAMS",
                b"jobs", b">",
            ])
            .await,
    );
    assert_eq!(reply.len(), 1);
    let stream = array_of(reply.into_iter().next().unwrap());
    let entries = array_of(stream.into_iter().nth(1).unwrap());
    assert_eq!(entries.len(), 2);

    let pending = array_of(client.run(cmd![b"XPENDING", b"jobs", b"workers"]).await);
    assert_int(&pending[0], 2);

    assert_int(&client.run(cmd![b"XACK", b"jobs", b"workers", b"1-0"]).await, 1);
    let pending = array_of(client.run(cmd![b"XPENDING", b"jobs", b"workers"]).await);
    assert_int(&pending[0], 1);

    // Claim the remaining entry for another consumer.
    let claimed = array_of(
        client
            .run(cmd![b"XCLAIM", b"jobs", b"workers", b"bob", b"0", b"2-0"])
            .await,
    );
    assert_eq!(claimed.len(), 1);

    let error = error_of(
        &client
            .run(cmd![b"XREADGROUP", b"GROUP", b"nope", b"x", b"STREAMS", b"jobs", b">"])
            .await,
    );
    assert!(error.starts_with("NOGROUP"), "{error}");
}

#[tokio::test]
async fn object_introspection() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.run(cmd![b"SET", b"n", b"123"]).await;
    assert_str(&client.run(cmd![b"OBJECT", b"ENCODING", b"n"]).await, "int");
    client.run(cmd![b"SET", b"s", b"hello"]).await;
    assert_str(&client.run(cmd![b"OBJECT", b"ENCODING", b"s"]).await, "embstr");
    client.run(cmd![b"RPUSH", b"l", b"x"]).await;
    assert_str(&client.run(cmd![b"OBJECT", b"ENCODING", b"l"]).await, "linkedlist");
    client.run(cmd![b"ZADD", b"z", b"1", b"m"]).await;
    assert_str(&client.run(cmd![b"OBJECT", b"ENCODING", b"z"]).await, "skiplist");
}
