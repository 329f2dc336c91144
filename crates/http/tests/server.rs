use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use http::StatusCode;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use webconfig_http::handler::{Handler, make_handler};
use webconfig_http::server::{HttpServer, ServerConfig};

fn panel_server(file: PathBuf) -> HttpServer<impl Handler + 'static> {
    let handler = make_handler(move |request, response| match request.path() {
        "/" => {
            let a = request.query_param("a").unwrap_or("-");
            let b = request.query_param("b").unwrap_or("-");
            response.set_body(format!("a={a} b={b}"));
        }
        "/save" => {
            let form = request.form();
            let mut pairs: Vec<_> = form.iter().map(|(k, v)| format!("{k}={v}")).collect();
            pairs.sort();
            response.set_body(pairs.join(","));
        }
        "/file" => {
            response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
            response.set_file(std::fs::File::open(&file).unwrap());
        }
        _ => response.set_status(StatusCode::NOT_FOUND),
    });

    let config = ServerConfig::builder().address(Ipv4Addr::LOCALHOST).poll_timeout(Duration::from_millis(5)).build().unwrap();
    HttpServer::with_config(handler, config).unwrap()
}

/// Sends `parts` from a client thread, pausing between them, while the
/// server is updated on this thread. Returns the raw response.
fn exchange<H: Handler + 'static>(server: &mut HttpServer<H>, address: SocketAddr, parts: Vec<Vec<u8>>) -> String {
    let (tx, rx) = mpsc::channel();
    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(address).unwrap();
        for part in parts {
            stream.write_all(&part).unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        tx.send(response).unwrap();
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    let response = loop {
        assert!(Instant::now() < deadline, "no response in time");
        server.update().unwrap();
        if let Ok(response) = rx.try_recv() {
            break response;
        }
    };
    client.join().unwrap();
    response
}

fn temp_file(name: &str, content: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("webconfig-http-{name}-{}", std::process::id()));
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn get_with_query() {
    let mut server = panel_server(PathBuf::new());
    let address = server.start(0).unwrap();

    let request = b"GET /?a=1&b=two+words HTTP/1.1\r\nHost: h\r\nDate: Tue, 15 Nov 1994 08:12:31 GMT\r\n\r\n".to_vec();
    let response = exchange(&mut server, address, vec![request]);

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.contains("server: webconfig-http/"));
    assert!(response.contains("date: Tue, 15 Nov 1994 08:12:31 GMT\r\n"));
    assert!(response.contains("connection: close\r\n"));
    assert!(response.ends_with("\r\n\r\na=1 b=two words"));
}

#[test]
fn head_split_inside_terminator() {
    let mut server = panel_server(PathBuf::new());
    let address = server.start(0).unwrap();

    let parts = vec![b"GET /?a=x HTTP/1.1\r\nHost: h\r".to_vec(), b"\n\r".to_vec(), b"\n".to_vec()];
    let response = exchange(&mut server, address, parts);
    assert!(response.ends_with("a=x b=-"), "{response}");
}

#[test]
fn malformed_request_gets_400() {
    let mut server = panel_server(PathBuf::new());
    let address = server.start(0).unwrap();

    let response = exchange(&mut server, address, vec![b"GET\r\nHost: h\r\n\r\n".to_vec()]);
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
}

#[test]
fn unknown_path_gets_404() {
    let mut server = panel_server(PathBuf::new());
    let address = server.start(0).unwrap();

    let response = exchange(&mut server, address, vec![b"GET /missing HTTP/1.1\r\n\r\n".to_vec()]);
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{response}");
}

#[test]
fn post_body_across_writes() {
    let mut server = panel_server(PathBuf::new());
    let address = server.start(0).unwrap();

    let parts = vec![
        b"POST /save HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\n".to_vec(),
        b"Content-Length: 21\r\n\r\nspeed=2.5&na".to_vec(),
        b"me=a+b%21".to_vec(),
    ];
    let response = exchange(&mut server, address, parts);
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.ends_with("\r\n\r\nname=a b!,speed=2.5"), "{response}");
}

#[test]
fn file_is_streamed() {
    let content: Vec<u8> = (b'a'..=b'z').cycle().take(5000).collect();
    let path = temp_file("stream", &content);

    let mut server = panel_server(path.clone());
    let address = server.start(0).unwrap();

    let response = exchange(&mut server, address, vec![b"GET /file HTTP/1.1\r\n\r\n".to_vec()]);
    assert!(response.contains("content-length: 5000\r\n"), "{response}");
    assert!(response.ends_with(std::str::from_utf8(&content).unwrap()));

    std::fs::remove_file(path).unwrap();
}

#[test]
fn connections_are_closed_after_response() {
    let mut server = panel_server(PathBuf::new());
    let address = server.start(0).unwrap();

    for _ in 0..3 {
        exchange(&mut server, address, vec![b"GET / HTTP/1.1\r\n\r\n".to_vec()]);
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while server.connections() > 0 {
        assert!(Instant::now() < deadline, "connections left open");
        server.update().unwrap();
    }
}

#[test]
fn stop_releases_the_port() {
    let mut server = panel_server(PathBuf::new());
    let address = server.start(0).unwrap();
    assert!(server.is_running());

    server.stop();
    assert!(!server.is_running());
    assert_eq!(server.local_addr(), None);

    TcpListener::bind(address).unwrap();
}
