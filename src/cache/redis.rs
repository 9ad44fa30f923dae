//! Redis cache backend speaking RESP over a plain TCP connection.
//!
//! Only the three commands the result cache needs are implemented:
//! `PING`, `GET` and `SET key value PX ttl`. The connection is opened lazily
//! and dropped after any I/O or protocol error, so the next probe reconnects
//! when the server comes back.

use super::{CacheBackend, CacheError};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Largest bulk reply accepted. Cached values are short JSON lists.
const MAX_BULK_LEN: i64 = 16 * 1024 * 1024;

/// A parsed RESP reply.
#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Simple(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
}

pub struct RedisCacheBackend {
    address: String,
    timeout: Duration,
    connection: Mutex<Option<BufReader<TcpStream>>>,
}

impl std::fmt::Debug for RedisCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheBackend")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .field("connected", &self.connection.lock().is_some())
            .finish()
    }
}

impl RedisCacheBackend {
    /// `timeout` bounds connecting as well as every read and write.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            connection: Mutex::new(None),
        }
    }

    fn connect(&self) -> Result<BufReader<TcpStream>, CacheError> {
        let unavailable = |e: std::io::Error| {
            CacheError::Unavailable(format!("cannot connect to {}: {e}", self.address))
        };

        let addrs: Vec<SocketAddr> = self
            .address
            .to_socket_addrs()
            .map_err(unavailable)?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout)).map_err(unavailable)?;
                    stream.set_write_timeout(Some(self.timeout)).map_err(unavailable)?;
                    stream.set_nodelay(true).map_err(unavailable)?;
                    return Ok(BufReader::new(stream));
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(match last_err {
            Some(e) => unavailable(e),
            None => CacheError::Unavailable(format!("{} did not resolve", self.address)),
        })
    }

    /// Send one command and read its reply, reconnecting if needed.
    fn command(&self, args: &[&[u8]]) -> Result<Reply, CacheError> {
        let mut guard = self.connection.lock();
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(CacheError::Unavailable("no connection".to_string()));
        };

        let result = send_command(connection, args);
        if result.is_err() {
            *guard = None;
        }
        result
    }
}

fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

fn send_command(connection: &mut BufReader<TcpStream>, args: &[&[u8]]) -> Result<Reply, CacheError> {
    let io_err = |e: std::io::Error| CacheError::Unavailable(e.to_string());

    let stream = connection.get_mut();
    stream.write_all(&encode_command(args)).map_err(io_err)?;
    stream.flush().map_err(io_err)?;

    read_reply(connection)
}

fn read_line(reader: &mut impl BufRead) -> Result<String, CacheError> {
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| CacheError::Unavailable(e.to_string()))?;
    if read == 0 {
        return Err(CacheError::Unavailable("connection closed".to_string()));
    }
    match line.strip_suffix("\r\n") {
        Some(stripped) => Ok(stripped.to_string()),
        None => Err(CacheError::Protocol(format!("unterminated line {line:?}"))),
    }
}

fn read_reply(reader: &mut impl BufRead) -> Result<Reply, CacheError> {
    let line = read_line(reader)?;
    let Some(kind) = line.chars().next() else {
        return Err(CacheError::Protocol("empty reply".to_string()));
    };
    let body = &line[kind.len_utf8()..];

    match kind {
        '+' => Ok(Reply::Simple(body.to_string())),
        '-' => Err(CacheError::Protocol(format!("server error: {body}"))),
        ':' => body
            .parse()
            .map(Reply::Integer)
            .map_err(|_| CacheError::Protocol(format!("bad integer {body:?}"))),
        '$' => {
            let len: i64 = body
                .parse()
                .map_err(|_| CacheError::Protocol(format!("bad bulk length {body:?}")))?;
            if len < 0 {
                return Ok(Reply::Bulk(None));
            }
            if len > MAX_BULK_LEN {
                return Err(CacheError::Protocol(format!(
                    "bulk length {len} exceeds the {MAX_BULK_LEN} byte limit"
                )));
            }
            let mut data = vec![0u8; len as usize + 2];
            reader
                .read_exact(&mut data)
                .map_err(|e| CacheError::Unavailable(e.to_string()))?;
            if !data.ends_with(b"\r\n") {
                return Err(CacheError::Protocol("bulk string not terminated".to_string()));
            }
            data.truncate(len as usize);
            Ok(Reply::Bulk(Some(data)))
        }
        other => Err(CacheError::Protocol(format!(
            "unsupported reply type {other:?}"
        ))),
    }
}

impl CacheBackend for RedisCacheBackend {
    fn probe(&self) -> Result<(), CacheError> {
        match self.command(&[b"PING"])? {
            Reply::Simple(pong) if pong == "PONG" => Ok(()),
            other => Err(CacheError::Protocol(format!("PING returned {other:?}"))),
        }
    }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.command(&[b"GET", key.as_bytes()])? {
            Reply::Bulk(None) => Ok(None),
            Reply::Bulk(Some(bytes)) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| CacheError::Protocol(format!("value for {key} is not UTF-8"))),
            other => Err(CacheError::Protocol(format!("GET returned {other:?}"))),
        }
    }

    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let millis = ttl.as_millis().max(1).to_string();
        match self.command(&[b"SET", key.as_bytes(), value.as_bytes(), b"PX", millis.as_bytes()])? {
            Reply::Simple(ok) if ok == "OK" => Ok(()),
            other => Err(CacheError::Protocol(format!("SET returned {other:?}"))),
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Read;
    use std::net::TcpListener;

    /// Minimal RESP server understanding PING, GET and SET (expiry ignored).
    fn spawn_fake_redis() -> (String, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let handle = std::thread::spawn(move || {
            let mut store: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
            // One client is enough for these tests.
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;

            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).unwrap_or(0) == 0 {
                    return;
                }
                let count: usize = header.trim_start_matches('*').trim().parse().unwrap();
                let mut args = Vec::with_capacity(count);
                for _ in 0..count {
                    let mut len_line = String::new();
                    reader.read_line(&mut len_line).unwrap();
                    let len: usize = len_line.trim_start_matches('$').trim().parse().unwrap();
                    let mut data = vec![0u8; len + 2];
                    reader.read_exact(&mut data).unwrap();
                    data.truncate(len);
                    args.push(data);
                }

                let reply: Vec<u8> = match args[0].as_slice() {
                    b"PING" => b"+PONG\r\n".to_vec(),
                    b"GET" => match store.get(&args[1]) {
                        Some(value) => {
                            let mut out = format!("${}\r\n", value.len()).into_bytes();
                            out.extend_from_slice(value);
                            out.extend_from_slice(b"\r\n");
                            out
                        }
                        None => b"$-1\r\n".to_vec(),
                    },
                    b"SET" => {
                        store.insert(args[1].clone(), args[2].clone());
                        b"+OK\r\n".to_vec()
                    }
                    _ => b"-ERR unknown command\r\n".to_vec(),
                };
                writer.write_all(&reply).unwrap();
            }
        });

        (address, handle)
    }

    #[test]
    fn test_encode_command() {
        assert_eq!(
            encode_command(&[b"GET", b"similarity:abc"]),
            b"*2\r\n$3\r\nGET\r\n$14\r\nsimilarity:abc\r\n".to_vec()
        );
    }

    #[test]
    fn test_read_reply_variants() {
        let mut input: &[u8] = b"+OK\r\n:42\r\n$5\r\nhello\r\n$-1\r\n-ERR nope\r\n";
        assert_eq!(read_reply(&mut input).unwrap(), Reply::Simple("OK".into()));
        assert_eq!(read_reply(&mut input).unwrap(), Reply::Integer(42));
        assert_eq!(
            read_reply(&mut input).unwrap(),
            Reply::Bulk(Some(b"hello".to_vec()))
        );
        assert_eq!(read_reply(&mut input).unwrap(), Reply::Bulk(None));
        assert!(matches!(
            read_reply(&mut input),
            Err(CacheError::Protocol(_))
        ));
        assert!(matches!(
            read_reply(&mut input),
            Err(CacheError::Unavailable(_))
        ));
    }

    #[test]
    fn test_oversized_bulk_length_is_rejected() {
        let mut input: &[u8] = b"$999999999999\r\n";
        assert!(matches!(
            read_reply(&mut input),
            Err(CacheError::Protocol(_))
        ));

        let header = format!("${}\r\n", MAX_BULK_LEN + 1);
        let mut input = header.as_bytes();
        assert!(matches!(
            read_reply(&mut input),
            Err(CacheError::Protocol(_))
        ));
    }

    #[test]
    fn test_round_trip_against_fake_server() {
        let (address, server) = spawn_fake_redis();
        let backend = RedisCacheBackend::new(address, Duration::from_secs(2));

        backend.probe().unwrap();
        assert_eq!(backend.get("similarity:x").unwrap(), None);
        backend
            .set_ex("similarity:x", r#"[{"id":1,"similarity":50.0}]"#, Duration::from_secs(3600))
            .unwrap();
        assert_eq!(
            backend.get("similarity:x").unwrap().as_deref(),
            Some(r#"[{"id":1,"similarity":50.0}]"#)
        );

        drop(backend);
        server.join().unwrap();
    }

    #[test]
    fn test_unreachable_server_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let backend = RedisCacheBackend::new(address, Duration::from_millis(200));
        assert!(matches!(backend.probe(), Err(CacheError::Unavailable(_))));
        assert!(matches!(
            backend.get("similarity:x"),
            Err(CacheError::Unavailable(_))
        ));
    }
}
