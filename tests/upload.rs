use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use broker_release::ReleaseError;
use broker_release::upload::{API_KEY_HEADER, CHECKSUM_HEADER, HttpUploader, UploadRequest, Uploader};

/// A request as it arrived on the socket.
struct Received {
    head: String,
    body: Vec<u8>,
}

impl Received {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// Accepts one connection on a loopback port, answers it with `status` and
/// hands back what was received.
fn serve_once(status: &'static str) -> (String, JoinHandle<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed before headers were complete");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        let received = Received {
            head,
            body: Vec::new(),
        };
        let length: usize = received
            .header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        while buf.len() < head_end + length {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed before body was complete");
            buf.extend_from_slice(&chunk[..n]);
        }
        stream
            .write_all(
                format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .as_bytes(),
            )
            .unwrap();
        Received {
            body: buf[head_end..head_end + length].to_vec(),
            ..received
        }
    });
    (format!("http://{addr}"), handle)
}

fn request<'a>(url: &'a str, body: &[u8]) -> UploadRequest<'a> {
    UploadRequest {
        artifact: "RDMnetBroker.pkg",
        url,
        api_key: "secret-key",
        sha256: "ab12",
        body: body.to_vec(),
    }
}

#[test]
fn put_sends_authenticated_raw_body_and_returns_created() {
    let (base, server) = serve_once("201 Created");
    let url = format!(
        "{base}/NET/dev/RDMnetBroker/1.2.3/RDMnetBroker_v1.2.3.4.pkg;project=RDMnetBroker;version=1.2.3.4"
    );
    let payload = b"\x00\x01installer bytes\xff";

    let status = HttpUploader::new()
        .unwrap()
        .put(request(&url, payload))
        .unwrap();

    assert_eq!(status, 201);
    let received = server.join().unwrap();
    assert_eq!(
        received.request_line(),
        "PUT /NET/dev/RDMnetBroker/1.2.3/RDMnetBroker_v1.2.3.4.pkg;project=RDMnetBroker;version=1.2.3.4 HTTP/1.1"
    );
    assert_eq!(received.header(API_KEY_HEADER), Some("secret-key"));
    assert_eq!(received.header(CHECKSUM_HEADER), Some("ab12"));
    assert_eq!(received.body, payload);
}

#[test]
fn put_passes_rejection_status_through() {
    let (base, server) = serve_once("403 Forbidden");
    let url = format!("{base}/upload");

    let status = HttpUploader::new()
        .unwrap()
        .put(request(&url, b"payload"))
        .unwrap();

    assert_eq!(status, 403);
    assert_eq!(server.join().unwrap().body, b"payload");
}

#[test]
fn unreachable_host_is_a_transport_error() {
    // Bind then drop so the port is very likely closed.
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let url = format!("http://{addr}/upload");

    let err = HttpUploader::new()
        .unwrap()
        .put(request(&url, b"payload"))
        .unwrap_err();

    match err {
        ReleaseError::Transport { artifact, .. } => assert_eq!(artifact, "RDMnetBroker.pkg"),
        other => panic!("unexpected error: {other}"),
    }
}
