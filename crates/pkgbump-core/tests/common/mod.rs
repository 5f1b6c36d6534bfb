#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

/// Serves the given `(status, body)` responses in order, one per connection,
/// then stops. Joining yields the request lines that were received.
pub struct Responder {
    pub base_url: String,
    handle: JoinHandle<Vec<String>>,
}

impl Responder {
    pub fn start(responses: Vec<(u16, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let base_url = format!(
            "http://{}",
            listener.local_addr().expect("listener should have an address")
        );

        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().expect("connection should be accepted");
                requests.push(read_request_line(&mut stream));
                write_response(&mut stream, status, &body);
            }
            requests
        });

        Self { base_url, handle }
    }

    pub fn text(responses: &[(u16, &str)]) -> Self {
        Self::start(
            responses
                .iter()
                .map(|(status, body)| (*status, body.as_bytes().to_vec()))
                .collect(),
        )
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn requests(self) -> Vec<String> {
        self.handle.join().expect("responder thread should not panic")
    }
}

/// A URL nothing is listening on.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    drop(listener);
    format!("http://{addr}/PKGBUILD")
}

fn read_request_line(stream: &mut TcpStream) -> String {
    let mut received = Vec::new();
    let mut chunk = [0_u8; 1024];
    while !received.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut chunk).expect("request should be readable");
        if read == 0 {
            break;
        }
        received.extend_from_slice(&chunk[..read]);
    }

    String::from_utf8_lossy(&received)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string()
}

fn write_response(stream: &mut TcpStream, status: u16, body: &[u8]) {
    let reason = if status == 200 { "OK" } else { "Error" };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream
        .write_all(head.as_bytes())
        .and_then(|()| stream.write_all(body))
        .and_then(|()| stream.flush())
        .expect("response should be written");
}
