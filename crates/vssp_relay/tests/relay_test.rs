use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use vssp_core::envelope::{EnvelopeHeader, ENVELOPE_HEADER_LEN};
use vssp_core::fragment::{FrameDescriptor, Fragmenter};
use vssp_core::{AssemblyConfig, CompletionMode, FragmentHeader};
use vssp_relay::sender::{self, SendOptions};
use vssp_relay::server::{self, ServerState};
use bytes::Bytes;
use vssp_relay::{bind_ingest_socket, Relay, SharedStats, ViewerChannel, ViewerEvent};

struct Harness {
    udp: SocketAddr,
    events: mpsc::Sender<ViewerEvent>,
    stats: SharedStats,
    shutdown: oneshot::Sender<()>,
    relay: JoinHandle<()>,
}

async fn start_relay(config: AssemblyConfig) -> Harness {
    let socket = bind_ingest_socket("127.0.0.1:0".parse().unwrap(), 256 * 1024).unwrap();
    let udp = socket.local_addr().unwrap();
    let stats = SharedStats::default();
    let relay: Relay = Relay::new(&config, stats.clone()).unwrap();
    let (events, events_rx) = mpsc::channel(16);
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let relay = tokio::spawn(relay.run(socket, events_rx, 2048, async move {
        let _ = shutdown_rx.await;
    }));
    Harness {
        udp,
        events,
        stats,
        shutdown,
        relay,
    }
}

/// Keep sending single-fragment frames with fresh ids until `deadline`, so a
/// viewer that registers late still sees one of them.
fn spawn_hello_sender(target: SocketAddr, deadline: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let fragmenter = Fragmenter::default();
        let started = tokio::time::Instant::now();
        let mut frame_id = 0;
        while started.elapsed() < deadline {
            let descriptor = FrameDescriptor {
                frame_id,
                codec: 1,
                ..Default::default()
            };
            for datagram in fragmenter.split(b"hello", &descriptor).unwrap() {
                socket.send_to(&datagram, target).await.unwrap();
            }
            frame_id += 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
}

/// Wait for the next envelope, skipping over any the viewer lagged past.
async fn next_envelope(envelopes: &mut broadcast::Receiver<Bytes>) -> Bytes {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match envelopes.recv().await {
                Ok(envelope) => return envelope,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("viewer channel closed"),
            }
        }
    })
    .await
    .expect("frame within timeout")
}

/// True once the relay has dropped the viewer's sending half.
async fn drain_until_closed(envelopes: &mut broadcast::Receiver<Bytes>) -> bool {
    loop {
        match envelopes.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return true,
        }
    }
}

#[tokio::test]
async fn test_udp_to_viewer_channel() {
    let harness = start_relay(AssemblyConfig::default()).await;
    let (channel, mut envelopes) = ViewerChannel::new(4);
    harness
        .events
        .send(ViewerEvent::Joined { id: 1, channel })
        .await
        .unwrap();

    let sender = spawn_hello_sender(harness.udp, Duration::from_secs(5));
    let envelope = next_envelope(&mut envelopes).await;
    sender.abort();

    let header = EnvelopeHeader::parse(&envelope).unwrap();
    assert_eq!(header.size, 5);
    assert_eq!(header.mode, 0);
    assert_eq!(header.eye, 0);
    assert_eq!(header.codec, 1);
    assert_eq!(&envelope[ENVELOPE_HEADER_LEN..], b"hello");

    harness.shutdown.send(()).unwrap();
    harness.relay.await.unwrap();
    assert!(drain_until_closed(&mut envelopes).await);
    assert_eq!(harness.stats.read().await.viewers_connected, 0);
}

#[tokio::test]
async fn test_foreign_and_garbage_do_not_stop_relay() {
    let harness = start_relay(AssemblyConfig::default()).await;
    let (channel, mut envelopes) = ViewerChannel::new(4);
    harness
        .events
        .send(ViewerEvent::Joined { id: 1, channel })
        .await
        .unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&[0u8; 40], harness.udp).await.unwrap();
    socket.send_to(b"VSSP", harness.udp).await.unwrap();
    let mut overrun = FragmentHeader {
        frame_id: 900,
        fragment_count: 1,
        payload_size: 100,
        ..Default::default()
    }
    .encode_with(b"short");
    overrun.truncate(30);
    socket.send_to(&overrun, harness.udp).await.unwrap();

    let sender = spawn_hello_sender(harness.udp, Duration::from_secs(5));
    let envelope = next_envelope(&mut envelopes).await;
    sender.abort();
    assert_eq!(&envelope[ENVELOPE_HEADER_LEN..], b"hello");

    harness.shutdown.send(()).unwrap();
    harness.relay.await.unwrap();
    let stats = harness.stats.read().await.clone();
    assert_eq!(stats.foreign, 1);
    assert_eq!(stats.malformed, 2);
}

#[tokio::test]
async fn test_threshold_relay_with_lossy_sender() {
    let harness = start_relay(AssemblyConfig {
        completion: CompletionMode::Threshold,
        threshold: 0.5,
        ..Default::default()
    })
    .await;
    let (channel, mut envelopes) = ViewerChannel::new(64);
    harness
        .events
        .send(ViewerEvent::Joined { id: 1, channel })
        .await
        .unwrap();
    // Let the join land before any frame is sent.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let frame = sender::test_pattern(20 * 100);
    let mut options = SendOptions::new(harness.udp);
    options.fps = 200.0;
    options.frames = 20;
    options.max_payload = 100;
    options.loss = 0.1;
    options.codec = 2;
    sender::send_frames(&frame, &options).await.unwrap();

    let first = next_envelope(&mut envelopes).await;
    let header = EnvelopeHeader::parse(&first).unwrap();
    assert_eq!(header.codec, 2);
    // Missing slots contribute nothing, so partial frames are shorter.
    assert!(header.size as usize <= frame.len());
    assert_eq!(first.len(), ENVELOPE_HEADER_LEN + header.size as usize);

    harness.shutdown.send(()).unwrap();
    harness.relay.await.unwrap();
}

async fn read_http_head(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed during handshake");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let rest = buf.split_off(end + 4);
            return (String::from_utf8_lossy(&buf).into_owned(), rest);
        }
    }
}

/// Read one unmasked server frame with a payload under 126 bytes.
async fn read_small_ws_frame(stream: &mut TcpStream, mut pending: Vec<u8>) -> (u8, Vec<u8>) {
    let mut chunk = [0u8; 256];
    loop {
        if pending.len() >= 2 {
            let len = (pending[1] & 0x7F) as usize;
            assert!(len < 126);
            if pending.len() >= 2 + len {
                return (pending[0] & 0x0F, pending[2..2 + len].to_vec());
            }
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before frame");
        pending.extend_from_slice(&chunk[..n]);
    }
}

#[tokio::test]
async fn test_websocket_viewer_receives_envelope() {
    let harness = start_relay(AssemblyConfig::default()).await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = listener.local_addr().unwrap();
    let state = ServerState::new(harness.events.clone(), 4, harness.stats.clone());
    tokio::spawn(server::serve(listener, state));

    let mut stream = TcpStream::connect(ws_addr).await.unwrap();
    let request = format!(
        "GET / HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n",
        ws_addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let (head, rest) = read_http_head(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 101"), "{}", head);

    let sender = spawn_hello_sender(harness.udp, Duration::from_secs(5));
    let (opcode, payload) = tokio::time::timeout(
        Duration::from_secs(5),
        read_small_ws_frame(&mut stream, rest),
    )
    .await
    .expect("frame within timeout");
    sender.abort();

    assert_eq!(opcode, 0x2, "binary message");
    assert_eq!(payload, b"\x05\x00\x00\x00\x00\x00\x01hello");

    harness.shutdown.send(()).unwrap();
    harness.relay.await.unwrap();
}
