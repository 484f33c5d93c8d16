//! End-to-end handshake scenarios against a loopback TCP fake server.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use pg_wire::error::{Error, Severity};
use pg_wire::handshake;
use pg_wire::transport::Transport;

fn framed(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn cstr(s: &str) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.push(0);
    out
}

fn parameter_status(name: &str, value: &str) -> Vec<u8> {
    let mut body = cstr(name);
    body.extend_from_slice(&cstr(value));
    framed(b'S', &body)
}

fn spawn_fake_server(script: Vec<u8>, expect_password: Option<Vec<u8>>) -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");

        // Consume the StartupMessage.
        read_one_message(&mut stream, true);

        stream.write_all(&script).expect("write auth challenge");

        if let Some(expected_password) = expect_password {
            let password_message = read_one_message(&mut stream, false);
            assert_eq!(password_message, expected_password);

            let mut reply = framed(b'R', &0i32.to_be_bytes());
            reply.extend_from_slice(&parameter_status("server_version", "9.6.3"));
            reply.extend_from_slice(&parameter_status("server_encoding", "UTF8"));
            reply.extend_from_slice(&parameter_status("integer_datetimes", "on"));
            reply.extend_from_slice(&framed(b'Z', b"I"));
            stream.write_all(&reply).expect("write post-auth");
        }
    });

    (port, handle)
}

/// Read exactly one framed message (header + body) off the stream, returning the raw
/// bytes consumed. When `is_startup` is set there is no leading tag byte.
fn read_one_message(stream: &mut TcpStream, is_startup: bool) -> Vec<u8> {
    let mut header = vec![0u8; if is_startup { 4 } else { 5 }];
    stream.read_exact(&mut header).expect("read header");
    let len_bytes: [u8; 4] = if is_startup {
        [header[0], header[1], header[2], header[3]]
    } else {
        [header[1], header[2], header[3], header[4]]
    };
    let len = i32::from_be_bytes(len_bytes) as usize;
    let mut rest = vec![0u8; len - 4];
    stream.read_exact(&mut rest).expect("read body");
    header.extend_from_slice(&rest);
    header
}

#[test]
fn startup_and_cleartext_auth() {
    let script = framed(b'R', &3i32.to_be_bytes());
    let expected_password = framed(b'p', &cstr("p"));
    let (port, server) = spawn_fake_server(script, Some(expected_password));

    let mut transport = Transport::connect("127.0.0.1", port).expect("connect");
    let params = handshake::handshake(&mut transport, "u", "p", "d").expect("handshake");

    assert_eq!(params.server_version.major, 9);
    assert_eq!(params.server_version.minor, 6);
    assert_eq!(params.server_version.revision, 3);
    assert_eq!(params.server_encoding, "UTF8");
    assert!(params.integer_datetimes);

    server.join().expect("server thread");
}

#[test]
fn startup_and_md5_auth() {
    let salt = [0x11, 0x22, 0x33, 0x44];
    let mut auth_body = 5i32.to_be_bytes().to_vec();
    auth_body.extend_from_slice(&salt);
    let script = framed(b'R', &auth_body);

    let hashed = pg_wire::message::frontend::md5_password("a", "b", &salt);
    let expected_password = framed(b'p', &cstr(&hashed));

    let (port, server) = spawn_fake_server(script, Some(expected_password));

    let mut transport = Transport::connect("127.0.0.1", port).expect("connect");
    let params = handshake::handshake(&mut transport, "a", "b", "d").expect("handshake");
    assert_eq!(params.server_encoding, "UTF8");

    server.join().expect("server thread");
}

#[test]
fn error_at_startup_closes_transport() {
    let mut body = Vec::new();
    body.push(b'S');
    body.extend_from_slice(&cstr("FATAL"));
    body.push(b'C');
    body.extend_from_slice(&cstr("28P01"));
    body.push(b'M');
    body.extend_from_slice(&cstr("password authentication failed"));
    body.push(0);
    let script = framed(b'E', &body);

    let (port, server) = spawn_fake_server(script, None);

    let mut transport = Transport::connect("127.0.0.1", port).expect("connect");
    let err = handshake::handshake(&mut transport, "u", "wrong", "d").expect_err("should fail");

    match err {
        Error::PostgresError(desc) => {
            assert_eq!(desc.severity(), Severity::Fatal);
            assert_eq!(desc.code, "28P01");
            assert_eq!(desc.message, "password authentication failed");
        }
        other => panic!("unexpected error variant: {other:?}"),
    }

    server.join().expect("server thread");
}
