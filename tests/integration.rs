//! Integration tests driving the server over real TCP sockets: the text
//! handshake (OPTIONS/ANNOUNCE/SETUP/RECORD) and the boundary behaviors
//! around CSeq, content type, double SETUP, and cross-connection session
//! access.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rtsp_core::handler::Handler;
use rtsp_core::protocol::{RtspResponse, TrackDescriptor};
use rtsp_core::stream::ServerStream;
use rtsp_core::{Server, ServerConfig};

struct RecordTestHandler {
    stream: Mutex<Option<ServerStream>>,
}

impl Handler for RecordTestHandler {
    fn on_describe(&self, _path: &str) -> (RtspResponse, Option<Vec<TrackDescriptor>>) {
        (RtspResponse::not_found(), None)
    }

    fn on_announce(&self, _session_id: &str, _path: &str, tracks: &[TrackDescriptor]) -> RtspResponse {
        *self.stream.lock().unwrap() = Some(ServerStream::new(tracks.to_vec()));
        RtspResponse::ok()
    }

    fn on_setup(&self, _session_id: &str, _path: &str, _track_id: usize) -> (RtspResponse, Option<ServerStream>) {
        (RtspResponse::ok(), self.stream.lock().unwrap().clone())
    }
}

fn start_server() -> (Arc<Server>, std::net::SocketAddr) {
    let handler = Arc::new(RecordTestHandler {
        stream: Mutex::new(None),
    });
    let server = Arc::new(Server::new(ServerConfig::new("127.0.0.1:0"), handler));
    server.start().expect("server start");
    let addr = server.local_addr().expect("bound address");
    (server, addr)
}

fn connect(addr: std::net::SocketAddr) -> TcpStream {
    let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.set_write_timeout(Some(Duration::from_secs(2))).unwrap();
    stream
}

fn request(stream: &mut TcpStream, text: &str) -> String {
    stream.write_all(text.as_bytes()).unwrap();
    stream.flush().unwrap();
    read_response(stream)
}

fn read_response(stream: &mut TcpStream) -> String {
    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        response.push_str(&line);
        if line == "\r\n" || line == "\n" {
            break;
        }
    }
    if let Some(len) = response
        .lines()
        .find(|l| l.to_lowercase().starts_with("content-length:"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        if len > 0 {
            let mut body = vec![0u8; len];
            let _ = reader.read_exact(&mut body);
            response.push_str(&String::from_utf8_lossy(&body));
        }
    }
    response
}

fn status_line(response: &str) -> &str {
    response.lines().next().unwrap_or("")
}

fn session_id_of(response: &str) -> String {
    response
        .lines()
        .find(|l| l.to_lowercase().starts_with("session:"))
        .and_then(|l| l.split(':').nth(1))
        .map(|v| v.trim().split(';').next().unwrap_or("").trim().to_string())
        .unwrap_or_default()
}

const SDP_BODY: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
m=video 0 RTP/AVP 96\r\na=control:trackID=0\r\na=rtpmap:96 H264/90000\r\n\
m=audio 0 RTP/AVP 97\r\na=control:trackID=1\r\na=rtpmap:97 MPEG4-GENERIC/48000\r\n";

#[test]
fn options_reports_cseq_and_public_methods() {
    let (_server, addr) = start_server();
    let mut stream = connect(addr);

    let response = request(
        &mut stream,
        "OPTIONS rtsp://127.0.0.1/cam RTSP/1.0\r\nCSeq: 1\r\n\r\n",
    );
    assert_eq!(status_line(&response), "RTSP/1.0 200 OK");
    assert!(response.contains("CSeq: 1"));
    assert!(response.contains("Public: DESCRIBE, ANNOUNCE, SETUP, PLAY, RECORD, TEARDOWN"));
}

#[test]
fn missing_cseq_closes_the_connection() {
    let (_server, addr) = start_server();
    let mut stream = connect(addr);

    stream
        .write_all(b"OPTIONS rtsp://127.0.0.1/cam RTSP/1.0\r\n\r\n")
        .unwrap();
    stream.flush().unwrap();
    let response = read_response(&mut stream);
    assert_eq!(status_line(&response), "RTSP/1.0 400 Bad Request");

    // The connection is fatally closed after a CSeq-less request; a further
    // write eventually surfaces as a reset or EOF rather than a response.
    let mut probe = [0u8; 1];
    let _ = stream.write_all(b"x");
    let read_result = stream.read(&mut probe);
    assert!(matches!(read_result, Ok(0) | Err(_)));
}

#[test]
fn announce_requires_sdp_content_type() {
    let (_server, addr) = start_server();
    let mut stream = connect(addr);

    let body = "not sdp";
    let req = format!(
        "ANNOUNCE rtsp://127.0.0.1/cam RTSP/1.0\r\nCSeq: 1\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let response = request(&mut stream, &req);
    assert!(status_line(&response).starts_with("RTSP/1.0 400 "));
    assert!(response.contains("unsupported Content-Type header '[text/plain]'"));

    // A bad Content-Type on ANNOUNCE is fatal; the connection closes after
    // the response is written.
    let mut probe = [0u8; 1];
    let _ = stream.write_all(b"x");
    let read_result = stream.read(&mut probe);
    assert!(matches!(read_result, Ok(0) | Err(_)));
}

#[test]
fn double_setup_of_same_track_is_rejected_over_the_wire() {
    let (_server, addr) = start_server();
    let mut stream = connect(addr);

    let announce = format!(
        "ANNOUNCE rtsp://127.0.0.1/cam RTSP/1.0\r\nCSeq: 1\r\nContent-Type: application/sdp\r\nContent-Length: {}\r\n\r\n{}",
        SDP_BODY.len(),
        SDP_BODY
    );
    let response = request(&mut stream, &announce);
    assert_eq!(status_line(&response), "RTSP/1.0 200 OK");

    let setup1 = "SETUP rtsp://127.0.0.1/cam/trackID=0 RTSP/1.0\r\nCSeq: 2\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1;mode=record\r\n\r\n";
    let response1 = request(&mut stream, setup1);
    assert_eq!(status_line(&response1), "RTSP/1.0 200 OK");
    let session_id = session_id_of(&response1);
    assert!(!session_id.is_empty());

    let setup2 = format!(
        "SETUP rtsp://127.0.0.1/cam/trackID=0 RTSP/1.0\r\nCSeq: 3\r\nSession: {}\r\nTransport: RTP/AVP/TCP;unicast;interleaved=2-3;mode=record\r\n\r\n",
        session_id
    );
    let response2 = request(&mut stream, &setup2);
    assert!(status_line(&response2).starts_with("RTSP/1.0 400 "));
    assert!(response2.contains("track 0 has already been setup"));
}

#[test]
fn record_rejects_until_every_announced_track_is_setup() {
    let (_server, addr) = start_server();
    let mut stream = connect(addr);

    let announce = format!(
        "ANNOUNCE rtsp://127.0.0.1/cam RTSP/1.0\r\nCSeq: 1\r\nContent-Type: application/sdp\r\nContent-Length: {}\r\n\r\n{}",
        SDP_BODY.len(),
        SDP_BODY
    );
    request(&mut stream, &announce);

    let setup0 = "SETUP rtsp://127.0.0.1/cam/trackID=0 RTSP/1.0\r\nCSeq: 2\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1;mode=record\r\n\r\n";
    let response = request(&mut stream, setup0);
    let session_id = session_id_of(&response);

    let record_req = format!(
        "RECORD rtsp://127.0.0.1/cam RTSP/1.0\r\nCSeq: 3\r\nSession: {}\r\n\r\n",
        session_id
    );
    let response = request(&mut stream, &record_req);
    assert!(status_line(&response).starts_with("RTSP/1.0 400 "));
    assert!(response.contains("not all announced tracks have been setup"));

    let setup1 = format!(
        "SETUP rtsp://127.0.0.1/cam/trackID=1 RTSP/1.0\r\nCSeq: 4\r\nSession: {}\r\nTransport: RTP/AVP/TCP;unicast;interleaved=2-3;mode=record\r\n\r\n",
        session_id
    );
    request(&mut stream, &setup1);

    let response = request(&mut stream, &record_req.replace("CSeq: 3", "CSeq: 5"));
    assert_eq!(status_line(&response), "RTSP/1.0 200 OK");
}

#[test]
fn session_bound_to_one_connection_rejects_another() {
    let (_server, addr) = start_server();
    let mut stream1 = connect(addr);

    let announce = format!(
        "ANNOUNCE rtsp://127.0.0.1/cam RTSP/1.0\r\nCSeq: 1\r\nContent-Type: application/sdp\r\nContent-Length: {}\r\n\r\n{}",
        SDP_BODY.len(),
        SDP_BODY
    );
    request(&mut stream1, &announce);
    let setup0 = "SETUP rtsp://127.0.0.1/cam/trackID=0 RTSP/1.0\r\nCSeq: 2\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1;mode=record\r\n\r\n";
    let response = request(&mut stream1, setup0);
    let session_id = session_id_of(&response);
    let setup1 = format!(
        "SETUP rtsp://127.0.0.1/cam/trackID=1 RTSP/1.0\r\nCSeq: 3\r\nSession: {}\r\nTransport: RTP/AVP/TCP;unicast;interleaved=2-3;mode=record\r\n\r\n",
        session_id
    );
    request(&mut stream1, &setup1);

    let record_req = format!(
        "RECORD rtsp://127.0.0.1/cam RTSP/1.0\r\nCSeq: 4\r\nSession: {}\r\n\r\n",
        session_id
    );
    let response = request(&mut stream1, &record_req);
    assert_eq!(status_line(&response), "RTSP/1.0 200 OK");

    // A second connection trying to operate on the now record-bound session
    // is rejected, while the first connection's session is unaffected.
    let mut stream2 = connect(addr);
    let teardown_req = format!(
        "TEARDOWN rtsp://127.0.0.1/cam RTSP/1.0\r\nCSeq: 1\r\nSession: {}\r\n\r\n",
        session_id
    );
    let response = request(&mut stream2, &teardown_req);
    assert!(status_line(&response).starts_with("RTSP/1.0 400 "));

    let options_req = format!(
        "OPTIONS rtsp://127.0.0.1/cam RTSP/1.0\r\nCSeq: 5\r\nSession: {}\r\n\r\n",
        session_id
    );
    let response = request(&mut stream1, &options_req);
    assert_eq!(status_line(&response), "RTSP/1.0 200 OK");
}
