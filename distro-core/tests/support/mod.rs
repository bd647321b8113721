//! In-process MQTT 3.1.1 broker stand-in that records CONNECT and PUBLISH packets.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

const CONNECT: u8 = 1;
const PUBLISH: u8 = 3;
const PINGREQ: u8 = 12;
const DISCONNECT: u8 = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRecord {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
}

/// How the broker treats each client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Accept and keep the connection open
    Accept,
    /// Answer CONNECT with "not authorized" and close
    Refuse,
    /// Close the first connection right after its first PUBLISH;
    /// later connections are kept open
    DropFirstAfterPublish,
}

pub struct FakeBroker {
    pub port: u16,
    connections: Arc<AtomicUsize>,
    connects: Arc<Mutex<Vec<ConnectRecord>>>,
    publishes: mpsc::UnboundedReceiver<PublishRecord>,
}

impl FakeBroker {
    /// Broker accepting every connection
    pub async fn start() -> Self {
        Self::start_with(Behavior::Accept).await
    }

    /// Broker answering CONNECT with "not authorized"
    pub async fn start_refusing() -> Self {
        Self::start_with(Behavior::Refuse).await
    }

    pub async fn start_with(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let connects = Arc::new(Mutex::new(Vec::new()));
        let (tx, publishes) = mpsc::unbounded_channel();

        let accepted = Arc::clone(&connections);
        let recorded = Arc::clone(&connects);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let previous = accepted.fetch_add(1, Ordering::SeqCst);
                let drop_after_publish =
                    behavior == Behavior::DropFirstAfterPublish && previous == 0;
                tokio::spawn(serve(
                    socket,
                    behavior == Behavior::Refuse,
                    drop_after_publish,
                    Arc::clone(&recorded),
                    tx.clone(),
                ));
            }
        });

        Self {
            port,
            connections,
            connects,
            publishes,
        }
    }

    /// Number of TCP connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn connects(&self) -> Vec<ConnectRecord> {
        self.connects.lock().await.clone()
    }

    /// Next PUBLISH received, waiting up to five seconds
    pub async fn next_publish(&mut self) -> PublishRecord {
        tokio::time::timeout(Duration::from_secs(5), self.publishes.recv())
            .await
            .expect("timed out waiting for publish")
            .expect("broker stopped")
    }

    /// True when no further PUBLISH arrives within `wait`
    pub async fn no_more_publishes(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.publishes.recv()).await.is_err()
    }
}

async fn serve(
    mut socket: TcpStream,
    refuse: bool,
    drop_after_publish: bool,
    connects: Arc<Mutex<Vec<ConnectRecord>>>,
    publishes: mpsc::UnboundedSender<PublishRecord>,
) {
    while let Some((header, body)) = read_packet(&mut socket).await {
        match header >> 4 {
            CONNECT => {
                if let Some(record) = parse_connect(&body) {
                    connects.lock().await.push(record);
                }
                let return_code = if refuse { 5 } else { 0 };
                if socket.write_all(&[0x20, 0x02, 0x00, return_code]).await.is_err() {
                    return;
                }
                if refuse {
                    return;
                }
            }
            PUBLISH => {
                if let Some(record) = parse_publish(header, &body) {
                    let _ = publishes.send(record);
                }
                if drop_after_publish {
                    return;
                }
            }
            PINGREQ => {
                if socket.write_all(&[0xD0, 0x00]).await.is_err() {
                    return;
                }
            }
            DISCONNECT => return,
            _ => {}
        }
    }
}

async fn read_packet(socket: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let header = socket.read_u8().await.ok()?;
    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = socket.read_u8().await.ok()?;
        len |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0u8; len];
    socket.read_exact(&mut body).await.ok()?;
    Some((header, body))
}

fn read_string(body: &[u8], pos: &mut usize) -> Option<String> {
    let bytes = read_bytes(body, pos)?;
    String::from_utf8(bytes).ok()
}

fn read_bytes(body: &[u8], pos: &mut usize) -> Option<Vec<u8>> {
    let len = u16::from_be_bytes([*body.get(*pos)?, *body.get(*pos + 1)?]) as usize;
    let start = *pos + 2;
    let bytes = body.get(start..start + len)?.to_vec();
    *pos = start + len;
    Some(bytes)
}

fn parse_connect(body: &[u8]) -> Option<ConnectRecord> {
    let mut pos = 0;
    let _protocol = read_string(body, &mut pos)?;
    let _level = *body.get(pos)?;
    let flags = *body.get(pos + 1)?;
    pos += 4; // level, flags, keep alive

    let client_id = read_string(body, &mut pos)?;
    if flags & 0x04 != 0 {
        read_bytes(body, &mut pos)?; // will topic
        read_bytes(body, &mut pos)?; // will payload
    }
    let username = if flags & 0x80 != 0 {
        Some(read_string(body, &mut pos)?)
    } else {
        None
    };
    let password = if flags & 0x40 != 0 {
        Some(read_string(body, &mut pos)?)
    } else {
        None
    };

    Some(ConnectRecord {
        client_id,
        username,
        password,
    })
}

fn parse_publish(header: u8, body: &[u8]) -> Option<PublishRecord> {
    let qos = (header >> 1) & 0x03;
    let retain = header & 0x01 != 0;
    let mut pos = 0;
    let topic = read_string(body, &mut pos)?;
    if qos > 0 {
        pos += 2; // packet identifier
    }
    Some(PublishRecord {
        topic,
        payload: body.get(pos..)?.to_vec(),
        qos,
        retain,
    })
}
