//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cmp_client::{protect, ProtectedMessage, ProtectionParameters, RequestBuilder};
use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
use rsa::{RsaPrivateKey, RsaPublicKey};

/// A request as seen by the mock responder.
#[derive(Debug)]
pub struct Captured {
    pub head: String,
    pub body: Vec<u8>,
}

impl Captured {
    /// Request line, e.g. `POST /cmp HTTP/1.1`.
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// Value of the first header called `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }
}

/// Single-shot HTTP responder bound to a loopback port.
pub struct MockResponder {
    addr: SocketAddr,
    handle: JoinHandle<Captured>,
}

impl MockResponder {
    /// Accept one connection and answer it with `respond(&request)`, written
    /// verbatim after `delay`.
    pub fn serve<F>(delay: Duration, respond: F) -> Self
    where
        F: FnOnce(&Captured) -> Vec<u8> + Send + 'static,
    {
        Self::spawn(delay, Duration::ZERO, respond)
    }

    /// Answer with `response` and keep the connection open for `hold`
    /// without sending anything more.
    pub fn stalled(response: impl Into<Vec<u8>>, hold: Duration) -> Self {
        let response = response.into();
        Self::spawn(Duration::ZERO, hold, move |_| response)
    }

    fn spawn<F>(delay: Duration, hold: Duration, respond: F) -> Self
    where
        F: FnOnce(&Captured) -> Vec<u8> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let captured = read_request(&mut stream);
            let response = respond(&captured);

            thread::sleep(delay);
            // the client may have given up already
            let _ = stream.write_all(&response);
            let _ = stream.flush();
            thread::sleep(hold);
            captured
        });

        Self { addr, handle }
    }

    /// Answer with a fixed response.
    pub fn canned(response: impl Into<Vec<u8>>) -> Self {
        let response = response.into();
        Self::serve(Duration::ZERO, move |_| response)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for the exchange to finish and return the request.
    pub fn join(self) -> Captured {
        self.handle.join().unwrap()
    }
}

/// `HTTP/1.1 200 OK` with a `Content-Length` matching `body`.
pub fn ok_response(body: &[u8]) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/pkixcmp\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

/// A loopback port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn read_request(stream: &mut TcpStream) -> Captured {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "connection closed inside request head");
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8(data[..head_end].to_vec()).unwrap();
    let mut captured = Captured {
        head,
        body: data[head_end..].to_vec(),
    };

    let len = captured
        .header("Content-Length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    while captured.body.len() < len {
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "connection closed inside request body");
        captured.body.extend_from_slice(&buf[..n]);
    }

    captured
}

/// WARNING: 512-bit RSA keeps the tests fast; never use such keys elsewhere.
pub fn public_key(seed: u8) -> RsaPublicKey {
    let mut rng = ChaCha8Rng::from_seed([seed; 32]);
    RsaPublicKey::from(&RsaPrivateKey::new(&mut rng, 512).unwrap())
}

pub fn protection_parameters() -> ProtectionParameters {
    ProtectionParameters::new("password", [1, 1, 1, 1, 1, 1], [0], "1").unwrap()
}

pub fn protected_message() -> ProtectedMessage<'static> {
    let request = RequestBuilder::new("CN=test,O=Org", "CN=CA,O=Org", 1)
        .build(&public_key(42))
        .unwrap();
    let mut rng = ChaCha8Rng::from_seed([7; 32]);
    protect(&mut rng, request, &protection_parameters()).unwrap()
}
