//! Integration tests for requests sent through an HTTP proxy

mod common;

use common::{ok, Server, Wire};
use h1pool::http::tls::TlsConfig;
use h1pool::http::{Client, ClientConfig, Error, ErrorKind, Request};
use std::io::Read;
use std::time::Duration;

fn client_via(proxy: &Server) -> Client {
    common::init_logging();
    let config = ClientConfig::default()
        .timeout(Duration::from_secs(5))
        .proxy(&format!("http://pu:pp@{}", proxy.addr))
        .unwrap()
        .tls(TlsConfig::client().verify_peer(false).build().unwrap());
    Client::new(config)
}

#[test]
fn test_plain_http_uses_absolute_uri() {
    let proxy = Server::start(1, |_, stream| {
        let mut wire = Wire::new(stream);
        let request = wire.next_request().unwrap();

        assert_eq!(request.line, "GET http://example.test/path?x=1 HTTP/1.1");
        assert_eq!(request.header("host"), Some("example.test"));
        assert_eq!(request.header("proxy-authorization"), Some("Basic cHU6cHA="));

        wire.send(&ok("proxied"));
        assert!(wire.next_request().is_none());
    });

    let client = client_via(&proxy);
    let (response, body) = client.get("http://example.test/path?x=1#top").unwrap();
    assert_eq!(response.status().code(), 200);
    assert_eq!(body, b"proxied");
    assert!(client.pool().contains("http://example.test:80"));

    client.close_all();
    proxy.join();
}

#[test]
fn test_connect_refused_skips_tls() {
    let proxy = Server::start(1, |_, stream| {
        let mut wire = Wire::new(stream);
        let request = wire.next_request().unwrap();

        assert_eq!(request.line, "CONNECT example.test:443 HTTP/1.1");
        assert_eq!(request.header("host"), Some("example.test:443"));
        assert_eq!(request.header("proxy-connection"), Some("keep-alive"));
        assert!(request.header("user-agent").is_some());
        assert_eq!(request.header("proxy-authorization"), Some("Basic cHU6cHA="));

        wire.send(b"HTTP/1.1 407 Proxy Authentication Required\r\nProxy-Authenticate: Basic\r\nContent-Length: 0\r\n\r\n");

        // No TLS handshake may follow a refused tunnel
        let mut rest = Vec::new();
        wire.into_inner().read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty(), "client sent {} bytes after 407", rest.len());
    });

    let client = client_via(&proxy);
    let err = client.get("https://example.test/").unwrap_err();

    match err {
        Error::ProxyRefused { status, ref reason } => {
            assert_eq!(status, 407);
            assert_eq!(reason, "Proxy Authentication Required");
        }
        ref other => panic!("unexpected {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Establish);
    assert!(client.pool().is_empty());

    proxy.join();
}

#[test]
fn test_connect_tunnel_then_tls() {
    let acceptor = common::tls_acceptor();
    let proxy = Server::start(1, move |_, stream| {
        let mut wire = Wire::new(stream);
        let request = wire.next_request().unwrap();
        assert_eq!(request.line, "CONNECT localhost:8443 HTTP/1.1");
        wire.send(b"HTTP/1.1 200 Connection established\r\n\r\n");

        // The proxy plays the origin on the far end of the tunnel
        let tls = acceptor.accept(wire.into_inner()).unwrap();
        let mut wire = Wire::new(tls);
        let request = wire.next_request().unwrap();
        assert_eq!(request.line, "GET /secure HTTP/1.1");
        assert_eq!(request.header("host"), Some("localhost:8443"));
        assert!(request.header("proxy-authorization").is_none());

        wire.send(&ok("secret"));
        assert!(wire.next_request().is_none());
    });

    let client = client_via(&proxy);
    let mut body = Vec::new();
    let response = client
        .request(Request::get("https://localhost:8443/secure").unwrap().sink(&mut body))
        .unwrap();

    assert_eq!(response.status().code(), 200);
    assert_eq!(body, b"secret");
    {
        let conn = client.pool().get("https://localhost:8443").unwrap();
        assert!(conn.lock().unwrap().is_tls());
    }

    client.close_all();
    proxy.join();
}
