use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use hkv_pool::{Command, HkvError, PoolManager, PoolStats, Role, RouterConfig, ServiceAddress};

const PASSWORD: &[u8] = b"cloris520";

type Store = Arc<Mutex<HashMap<(usize, Vec<u8>), Vec<u8>>>>;

/// Minimal RESP store: one thread per session, `readonly` mimics a replica.
struct FakeStore {
    addr: ServiceAddress,
    accepted: Arc<AtomicUsize>,
}

impl FakeStore {
    fn spawn(store: Store, readonly: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                counter.fetch_add(1, Ordering::SeqCst);
                let store = Arc::clone(&store);
                thread::spawn(move || serve(stream, store, readonly));
            }
        });

        FakeStore {
            addr: ServiceAddress::new("127.0.0.1", port),
            accepted,
        }
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

fn serve(mut stream: TcpStream, store: Store, readonly: bool) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut reader = BufReader::new(stream.try_clone().expect("clone"));
    let mut authed = false;
    let mut db = 0usize;

    while let Ok(args) = read_command(&mut reader) {
        let name = args[0].to_ascii_uppercase();
        match name.as_slice() {
            b"AUTH" if args.get(1).map(Vec::as_slice) == Some(PASSWORD) => {
                authed = true;
                write_raw(&mut stream, b"+OK\r\n");
            }
            b"AUTH" => {
                write_raw(&mut stream, b"-WRONGPASS invalid username-password pair\r\n");
            }
            _ if !authed => write_raw(&mut stream, b"-NOAUTH Authentication required.\r\n"),
            b"SELECT" => {
                db = std::str::from_utf8(&args[1]).expect("utf8").parse().expect("db");
                write_raw(&mut stream, b"+OK\r\n");
            }
            b"PING" => write_raw(&mut stream, b"+PONG\r\n"),
            b"SET" if readonly => write_raw(
                &mut stream,
                b"-READONLY You can't write against a read only replica.\r\n",
            ),
            b"SET" => {
                store.lock().insert((db, args[1].clone()), args[2].clone());
                write_raw(&mut stream, b"+OK\r\n");
            }
            b"GET" => match store.lock().get(&(db, args[1].clone())) {
                Some(value) => {
                    let mut out = format!("${}\r\n", value.len()).into_bytes();
                    out.extend_from_slice(value);
                    out.extend_from_slice(b"\r\n");
                    write_raw(&mut stream, &out);
                }
                None => write_raw(&mut stream, b"$-1\r\n"),
            },
            // Hang up without replying.
            b"QUIT" => return,
            _ => write_raw(&mut stream, b"-ERR unknown command\r\n"),
        }
    }
}

fn read_command(reader: &mut BufReader<TcpStream>) -> std::io::Result<Vec<Vec<u8>>> {
    let mut line = Vec::new();
    read_line(reader, &mut line)?;
    if line.first() != Some(&b'*') {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "expected array"));
    }
    let count = parse_usize(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        read_line(reader, &mut line)?;
        if line.first() != Some(&b'$') {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "expected bulk"));
        }
        let len = parse_usize(&line[1..])?;
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data)?;
        data.truncate(len);
        args.push(data);
    }
    if args.is_empty() {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "empty command"));
    }
    Ok(args)
}

fn read_line(reader: &mut BufReader<TcpStream>, buf: &mut Vec<u8>) -> std::io::Result<()> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "digit"))
}

fn write_raw(stream: &mut TcpStream, data: &[u8]) {
    let _ = stream.write_all(data);
    let _ = stream.flush();
}

/// Master plus one replica sharing a keyspace, as after replication.
fn cluster() -> (FakeStore, FakeStore, PoolManager) {
    let store = Store::default();
    let master = FakeStore::spawn(Arc::clone(&store), false);
    let replica = FakeStore::spawn(store, true);

    let manager = PoolManager::tcp();
    let config = RouterConfig::master(&master.addr.to_string())
        .with_replicas(&replica.addr.to_string())
        .with_credential("cloris520")
        .with_timeout(Duration::from_secs(2));
    manager.configure(config).expect("configure");
    (master, replica, manager)
}

#[test]
fn sessions_are_reused_across_leases() {
    let (master, _replica, manager) = cluster();

    let first = {
        let mut conn = manager.master(3).expect("lease");
        let reply = conn.execute(&Command::new("SET").arg("k1").arg(10)).expect("set");
        assert!(reply.is_ok());
        assert_eq!(conn.operation_count(), 1);
        conn.id()
    };
    for _ in 0..5 {
        let mut conn = manager.master(3).expect("lease");
        assert_eq!(conn.id(), first);
        let reply = conn.execute(&Command::new("GET").arg("k1")).expect("get");
        assert_eq!(reply.as_i64(), Some(10));
    }

    assert_eq!(master.accepted(), 1);
    assert_eq!(
        manager.stats(Role::Master),
        PoolStats { active: 1, idle: 1, in_use: 0 }
    );
}

#[test]
fn partitions_select_separate_keyspaces() {
    let (master, _replica, manager) = cluster();

    let mut one = manager.master(1).expect("lease");
    assert!(one.execute(&Command::new("SET").arg("k1").arg("v1")).expect("set").is_ok());
    let mut two = manager.master(2).expect("lease");
    assert!(two.execute(&Command::new("GET").arg("k1")).expect("get").is_nil());
    assert_eq!(
        one.execute(&Command::new("GET").arg("k1")).expect("get").to_text().as_deref(),
        Some("v1")
    );
    assert_eq!(master.accepted(), 2);
}

#[test]
fn replica_reads_and_refuses_writes() {
    let (_master, replica, manager) = cluster();
    {
        let mut conn = manager.master(0).expect("lease");
        conn.execute(&Command::new("SET").arg("k1").arg(10)).expect("set");
    }

    let id = {
        let mut conn = manager.get(0, Role::Replica, Some(0)).expect("lease");
        let reply = conn.execute(&Command::new("SET").arg("k1").arg(11)).expect("set");
        assert!(reply.is_error());
        assert!(reply.error_message().unwrap_or_default().starts_with("READONLY"));
        let reply = conn.execute(&Command::new("GET").arg("k1")).expect("get");
        assert_eq!(reply.as_i64(), Some(10));
        conn.id()
    };

    let conn = manager.get(0, Role::Replica, None).expect("lease");
    assert_eq!(conn.id(), id);
    assert_eq!(replica.accepted(), 1);
}

#[test]
fn rejected_credential_fails_handshake() {
    let master = FakeStore::spawn(Store::default(), false);
    let manager = PoolManager::tcp();
    let config = RouterConfig::master(&master.addr.to_string())
        .with_credential("not-the-password")
        .with_timeout(Duration::from_secs(2));
    manager.configure(config).expect("configure");

    let err = manager.master(0).expect_err("bad credential");
    match err {
        HkvError::Handshake { source, .. } => {
            assert!(matches!(*source, HkvError::Command(ref msg) if msg.starts_with("WRONGPASS")));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(manager.stats(Role::Master), PoolStats::default());
}

#[test]
fn hung_up_session_is_replaced() {
    let (master, _replica, manager) = cluster();

    let broken = {
        let mut conn = manager.master(0).expect("lease");
        assert!(conn.execute(&Command::new("QUIT")).is_err());
        conn.id()
    };
    assert_eq!(manager.active_count(Role::Master), 0);

    let mut conn = manager.master(0).expect("lease");
    assert_ne!(conn.id(), broken);
    assert!(conn.execute(&Command::new("PING")).expect("ping").is_ok());
    assert_eq!(master.accepted(), 2);
}
