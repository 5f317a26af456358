//! End-to-end tests over real TCP connections
//!
//! Each test binds its own server on an ephemeral port and talks RESP to it
//! with a plain TcpStream, asserting on exact wire bytes.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use cuprous::config::Config;
use cuprous::network::Server;

/// Bind a server on an ephemeral port and serve it from a background thread
fn start_server(replicaof: Option<(String, u16)>) -> SocketAddr {
    let mut config = Config::default();
    config.network.port = 0;
    config.replicaof = replicaof;

    let server = Server::from_config(&config).expect("bind server");
    let addr = server.local_addr().expect("local addr");
    thread::spawn(move || {
        let _ = server.run();
    });
    addr
}

struct Client {
    stream: TcpStream,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        Client { stream }
    }

    /// Send a command as a RESP array of bulk strings
    fn send(&mut self, parts: &[&str]) {
        let mut buf = format!("*{}\r\n", parts.len()).into_bytes();
        for part in parts {
            buf.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
            buf.extend_from_slice(part.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        self.stream.write_all(&buf).expect("send");
    }

    /// Read exactly `n` reply bytes
    fn recv(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.stream.read_exact(&mut buf).expect("recv");
        buf
    }

    /// Assert the next reply bytes are exactly `expected`
    fn expect(&mut self, expected: &str) {
        let got = self.recv(expected.len());
        assert_eq!(
            String::from_utf8_lossy(&got),
            expected,
            "unexpected reply bytes"
        );
    }

    /// Read one CRLF-terminated line (including the terminator)
    fn read_line(&mut self) -> String {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.stream.read_exact(&mut byte).expect("read line");
            line.push(byte[0]);
            if line.ends_with(b"\r\n") {
                return String::from_utf8_lossy(&line).to_string();
            }
        }
    }

    /// Round-trip helper for commands with fixed-size replies
    fn roundtrip(&mut self, parts: &[&str], expected: &str) {
        self.send(parts);
        self.expect(expected);
    }
}

#[test]
fn test_ping_and_echo() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["PING"], "+PONG\r\n");
    client.roundtrip(&["ECHO", "hello"], "$5\r\nhello\r\n");
}

#[test]
fn test_set_get_missing() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["SET", "foo", "bar"], "+OK\r\n");
    client.roundtrip(&["GET", "foo"], "$3\r\nbar\r\n");
    client.roundtrip(&["GET", "missing"], "$-1\r\n");
}

#[test]
fn test_set_px_expires() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["SET", "s", "v", "PX", "100"], "+OK\r\n");
    client.roundtrip(&["GET", "s"], "$1\r\nv\r\n");
    thread::sleep(Duration::from_millis(150));
    client.roundtrip(&["GET", "s"], "$-1\r\n");
    client.roundtrip(&["TYPE", "s"], "+none\r\n");
}

#[test]
fn test_incr() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["INCR", "counter"], ":1\r\n");
    client.roundtrip(&["INCR", "counter"], ":2\r\n");
    client.roundtrip(&["SET", "text", "abc"], "+OK\r\n");
    client.roundtrip(
        &["INCR", "text"],
        "-ERR value is not an integer or out of range\r\n",
    );
}

#[test]
fn test_del_and_type() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["SET", "a", "1"], "+OK\r\n");
    client.roundtrip(&["RPUSH", "l", "x"], ":1\r\n");
    client.roundtrip(&["XADD", "st", "1-1", "f", "v"], "$3\r\n1-1\r\n");

    client.roundtrip(&["TYPE", "a"], "+string\r\n");
    client.roundtrip(&["TYPE", "l"], "+list\r\n");
    client.roundtrip(&["TYPE", "st"], "+stream\r\n");
    client.roundtrip(&["TYPE", "nope"], "+none\r\n");

    client.roundtrip(&["DEL", "a", "l", "nope"], ":2\r\n");
    client.roundtrip(&["TYPE", "a"], "+none\r\n");
}

#[test]
fn test_wrong_type_errors() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["RPUSH", "l", "x"], ":1\r\n");
    client.roundtrip(
        &["GET", "l"],
        "-WRONGTYPE Operation against a key holding the wrong kind of value\r\n",
    );
    client.roundtrip(
        &["SET", "l", "v"],
        "-WRONGTYPE Operation against a key holding the wrong kind of value\r\n",
    );
}

#[test]
fn test_rpush_lrange() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["RPUSH", "l", "a", "b", "c"], ":3\r\n");
    client.roundtrip(
        &["LRANGE", "l", "0", "-1"],
        "*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n",
    );
    client.roundtrip(&["LRANGE", "l", "-2", "-1"], "*2\r\n$1\r\nb\r\n$1\r\nc\r\n");
    client.roundtrip(&["LLEN", "l"], ":3\r\n");
}

#[test]
fn test_lpush_is_reversed() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["LPUSH", "l", "a", "b", "c"], ":3\r\n");
    client.roundtrip(
        &["LRANGE", "l", "0", "-1"],
        "*3\r\n$1\r\nc\r\n$1\r\nb\r\n$1\r\na\r\n",
    );
}

#[test]
fn test_lpop_reply_shapes() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["RPUSH", "l", "a", "b", "c"], ":3\r\n");
    // No count argument: bulk reply
    client.roundtrip(&["LPOP", "l"], "$1\r\na\r\n");
    // Count argument present: array reply even for one element
    client.roundtrip(&["LPOP", "l", "1"], "*1\r\n$1\r\nb\r\n");
    client.roundtrip(&["LPOP", "l", "5"], "*1\r\n$1\r\nc\r\n");
    client.roundtrip(&["LPOP", "l"], "$-1\r\n");
}

#[test]
fn test_blpop_wakes_on_push() {
    let addr = start_server(None);

    let waiter = thread::spawn(move || {
        let mut blocked = Client::connect(addr);
        blocked.send(&["BLPOP", "q", "0"]);
        blocked.expect("*2\r\n$1\r\nq\r\n$5\r\nhello\r\n");
    });

    // Give the waiter time to block
    thread::sleep(Duration::from_millis(100));
    let mut pusher = Client::connect(addr);
    pusher.roundtrip(&["RPUSH", "q", "hello"], ":1\r\n");

    waiter.join().unwrap();
}

#[test]
fn test_blpop_abandoned_on_disconnect() {
    let addr = start_server(None);

    {
        let mut doomed = Client::connect(addr);
        doomed.send(&["BLPOP", "q", "0"]);
        // Dropped here: the socket closes while the waiter is parked
    }

    // Give the server time to notice the disconnect and free the slot
    thread::sleep(Duration::from_millis(300));

    let mut pusher = Client::connect(addr);
    pusher.roundtrip(&["RPUSH", "q", "hello"], ":1\r\n");
    // The value must not vanish into the dead waiter
    pusher.roundtrip(&["LPOP", "q"], "$5\r\nhello\r\n");
}

#[test]
fn test_blpop_timeout_is_null() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    let start = Instant::now();
    client.roundtrip(&["BLPOP", "q", "0.1"], "$-1\r\n");
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_xadd_id_rules() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["XADD", "s", "0-1", "t", "93"], "$3\r\n0-1\r\n");
    client.roundtrip(
        &["XADD", "s", "0-1", "t", "93"],
        "-ERR The ID specified in XADD is equal or smaller than the target stream top item\r\n",
    );
    client.roundtrip(&["XADD", "s", "0-*", "t", "94"], "$3\r\n0-2\r\n");
    client.roundtrip(
        &["XADD", "s", "0-0", "t", "95"],
        "-ERR The ID specified in XADD must be greater than 0-0\r\n",
    );
}

#[test]
fn test_xrange_and_xread() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["XADD", "s", "1-1", "a", "1"], "$3\r\n1-1\r\n");
    client.roundtrip(&["XADD", "s", "2-1", "b", "2"], "$3\r\n2-1\r\n");

    client.roundtrip(
        &["XRANGE", "s", "-", "+"],
        "*2\r\n\
         *2\r\n$3\r\n1-1\r\n*2\r\n$1\r\na\r\n$1\r\n1\r\n\
         *2\r\n$3\r\n2-1\r\n*2\r\n$1\r\nb\r\n$1\r\n2\r\n",
    );
    client.roundtrip(
        &["XRANGE", "s", "2", "+"],
        "*1\r\n*2\r\n$3\r\n2-1\r\n*2\r\n$1\r\nb\r\n$1\r\n2\r\n",
    );

    // XREAD is exclusive of the given ID
    client.roundtrip(
        &["XREAD", "STREAMS", "s", "1-1"],
        "*1\r\n*2\r\n$1\r\ns\r\n*1\r\n\
         *2\r\n$3\r\n2-1\r\n*2\r\n$1\r\nb\r\n$1\r\n2\r\n",
    );
    client.roundtrip(&["XREAD", "STREAMS", "s", "2-1"], "$-1\r\n");
}

#[test]
fn test_xread_block_wakes_on_xadd() {
    let addr = start_server(None);
    let mut setup = Client::connect(addr);
    setup.roundtrip(&["XADD", "s", "5-1", "seed", "1"], "$3\r\n5-1\r\n");

    let reader = thread::spawn(move || {
        let mut blocked = Client::connect(addr);
        blocked.send(&["XREAD", "BLOCK", "0", "STREAMS", "s", "$"]);
        blocked.expect(
            "*1\r\n*2\r\n$1\r\ns\r\n*1\r\n\
             *2\r\n$3\r\n5-2\r\n*2\r\n$1\r\nk\r\n$1\r\nv\r\n",
        );
    });

    thread::sleep(Duration::from_millis(100));
    let mut writer = Client::connect(addr);
    writer.roundtrip(&["XADD", "s", "5-2", "k", "v"], "$3\r\n5-2\r\n");

    reader.join().unwrap();
}

#[test]
fn test_xread_block_timeout_is_null() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    let start = Instant::now();
    client.roundtrip(&["XREAD", "BLOCK", "100", "STREAMS", "s", "$"], "$-1\r\n");
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_multi_exec() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["MULTI"], "+OK\r\n");
    client.roundtrip(&["SET", "a", "1"], "+QUEUED\r\n");
    client.roundtrip(&["INCR", "a"], "+QUEUED\r\n");
    client.roundtrip(&["EXEC"], "*2\r\n+OK\r\n:2\r\n");
    client.roundtrip(&["GET", "a"], "$1\r\n2\r\n");
}

#[test]
fn test_transaction_errors() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["EXEC"], "-ERR EXEC without MULTI\r\n");
    client.roundtrip(&["DISCARD"], "-ERR DISCARD without MULTI\r\n");

    client.roundtrip(&["MULTI"], "+OK\r\n");
    client.roundtrip(&["MULTI"], "-ERR MULTI calls can not be nested\r\n");
    client.roundtrip(
        &["BLPOP", "q", "0"],
        "-ERR command not allowed in transaction\r\n",
    );
    client.roundtrip(
        &["XREAD", "BLOCK", "0", "STREAMS", "s", "$"],
        "-ERR command not allowed in transaction\r\n",
    );
    // Rejected commands were not queued; the transaction is still open
    client.roundtrip(&["SET", "k", "v"], "+QUEUED\r\n");
    client.roundtrip(&["DISCARD"], "+OK\r\n");
    client.roundtrip(&["GET", "k"], "$-1\r\n");
}

#[test]
fn test_queued_commands_are_isolated_until_exec() {
    let addr = start_server(None);
    let mut tx_client = Client::connect(addr);
    let mut observer = Client::connect(addr);

    tx_client.roundtrip(&["MULTI"], "+OK\r\n");
    tx_client.roundtrip(&["SET", "txkey", "v"], "+QUEUED\r\n");
    observer.roundtrip(&["GET", "txkey"], "$-1\r\n");
    tx_client.roundtrip(&["EXEC"], "*1\r\n+OK\r\n");
    observer.roundtrip(&["GET", "txkey"], "$1\r\nv\r\n");
}

#[test]
fn test_unknown_command() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.roundtrip(&["FROBNICATE", "x"], "-ERR unknown command 'FROBNICATE'\r\n");
}

#[test]
fn test_info_master() {
    let addr = start_server(None);
    let mut client = Client::connect(addr);
    client.send(&["INFO", "replication"]);

    let header = client.read_line();
    assert!(header.starts_with('$'));
    let len: usize = header[1..header.len() - 2].parse().unwrap();
    let body = client.recv(len + 2);
    let text = String::from_utf8_lossy(&body);

    assert!(text.contains("role:master"));
    assert!(text.contains("connected_slaves:0"));
    assert!(text.contains("master_replid:"));
    assert!(text.contains("master_repl_offset:0"));
    assert!(text.contains("second_repl_offset:0"));
    assert!(text.contains("repl_backlog_histlen:0"));
}

/// Drive the master side of the replication handshake by hand and verify
/// the FULLRESYNC framing plus command fan-out.
#[test]
fn test_psync_handshake_and_fanout() {
    let addr = start_server(None);
    let mut replica = Client::connect(addr);

    replica.roundtrip(&["PING"], "+PONG\r\n");
    replica.roundtrip(&["REPLCONF", "listening-port", "6380"], "+OK\r\n");
    replica.roundtrip(&["REPLCONF", "capa", "psync2"], "+OK\r\n");

    replica.send(&["PSYNC", "?", "-1"]);
    let line = replica.read_line();
    assert!(line.starts_with("+FULLRESYNC "));
    let words: Vec<&str> = line.trim_end().trim_start_matches('+').split(' ').collect();
    assert_eq!(words.len(), 3);
    assert_eq!(words[1].len(), 40);
    assert_eq!(words[2], "0");

    // RDB bulk: $<n>\r\n then exactly n bytes, no trailing CRLF
    let header = replica.read_line();
    assert!(header.starts_with('$'));
    let rdb_len: usize = header[1..header.len() - 2].parse().unwrap();
    let rdb = replica.recv(rdb_len);
    assert_eq!(&rdb[..9], b"REDIS0011");

    // The master registers the link right after the snapshot is on the
    // wire; poll briefly until it counts us
    let mut master_client = Client::connect(addr);
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        master_client.send(&["INFO"]);
        let header = master_client.read_line();
        let len: usize = header[1..header.len() - 2].parse().unwrap();
        let body = master_client.recv(len + 2);
        if String::from_utf8_lossy(&body).contains("connected_slaves:1") {
            break;
        }
        assert!(Instant::now() < deadline, "replica link never registered");
        thread::sleep(Duration::from_millis(20));
    }

    // Applied writes are propagated verbatim as command arrays; reads are not
    master_client.roundtrip(&["SET", "foo", "bar"], "+OK\r\n");
    master_client.roundtrip(&["GET", "foo"], "$3\r\nbar\r\n");
    master_client.roundtrip(&["INCR", "n"], ":1\r\n");

    replica.expect("*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
    replica.expect("*2\r\n$4\r\nINCR\r\n$1\r\nn\r\n");
}

/// Full topology: a replica server replicates a master server in-process.
#[test]
fn test_master_replica_end_to_end() {
    let master_addr = start_server(None);
    let replica_addr = start_server(Some((
        master_addr.ip().to_string(),
        master_addr.port(),
    )));

    // Wait for the replica link to attach
    let mut master = Client::connect(master_addr);
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        master.send(&["INFO"]);
        let header = master.read_line();
        let len: usize = header[1..header.len() - 2].parse().unwrap();
        let body = master.recv(len + 2);
        if String::from_utf8_lossy(&body).contains("connected_slaves:1") {
            break;
        }
        assert!(Instant::now() < deadline, "replica never attached");
        thread::sleep(Duration::from_millis(50));
    }

    // SET goes last: once it is visible on the replica, the FIFO stream
    // guarantees the earlier RPUSH has been applied too
    master.roundtrip(&["RPUSH", "list", "a", "b"], ":2\r\n");
    master.roundtrip(&["SET", "shared", "value"], "+OK\r\n");

    // The replica applies the stream asynchronously; poll until visible
    let mut replica = Client::connect(replica_addr);
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        replica.send(&["GET", "shared"]);
        let header = replica.read_line();
        if header == "$5\r\n" {
            replica.expect("value\r\n");
            break;
        }
        assert_eq!(header, "$-1\r\n");
        assert!(Instant::now() < deadline, "write never reached the replica");
        thread::sleep(Duration::from_millis(50));
    }

    replica.roundtrip(
        &["LRANGE", "list", "0", "-1"],
        "*2\r\n$1\r\na\r\n$1\r\nb\r\n",
    );

    // Replica-side INFO reports its role and consumed offset
    replica.send(&["INFO", "replication"]);
    let header = replica.read_line();
    let len: usize = header[1..header.len() - 2].parse().unwrap();
    let body = replica.recv(len + 2);
    let text = String::from_utf8_lossy(&body).to_string();
    assert!(text.contains("role:slave"));
    assert!(text.contains(&format!("master_port:{}", master_addr.port())));
}
