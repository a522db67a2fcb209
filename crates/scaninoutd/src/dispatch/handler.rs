//! Connection handler that serves one request line at a time.
//!
//! Each connection owns a [`Session`] and runs a sequential loop: read a line,
//! dispatch it, write exactly one response line. The loop ends when the peer
//! closes the connection or the transport fails.

use std::io::BufReader;
use std::sync::Arc;

use scaninout_proto::{CommandError, RpcResponse, WireError, wire};
use tracing::{debug, warn};

use crate::transport::{ConnectionHandler, ConnectionStream};

use super::dispatcher::Dispatcher;
use super::response::ResponseWriter;
use super::router::DISPATCH_TARGET;
use super::session::Session;

/// Connection handler that feeds request lines to a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchConnectionHandler {
    dispatcher: Arc<Dispatcher>,
}

impl DispatchConnectionHandler {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    fn serve(&self, stream: ConnectionStream) {
        let peer = stream.peer();
        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, %peer, "failed to clone connection");
                return;
            }
        };
        let mut reader = BufReader::new(reader);
        let mut writer = ResponseWriter::new(stream);
        let mut session = Session::new();

        loop {
            let response = match wire::read_line(&mut reader) {
                Ok(Some(line)) => self.dispatcher.dispatch(&mut session, &line),
                Ok(None) => {
                    debug!(target: DISPATCH_TARGET, %peer, "client disconnected");
                    return;
                }
                Err(error @ WireError::TooLarge { .. }) => {
                    warn!(target: DISPATCH_TARGET, %error, %peer, "oversized request");
                    let response = RpcResponse::failure(CommandError::format_error(&error));
                    if !send(&mut writer, &response, &peer) {
                        return;
                    }
                    match wire::discard_line(&mut reader) {
                        Ok(true) => continue,
                        Ok(false) => return,
                        Err(error) => {
                            warn!(target: DISPATCH_TARGET, %error, %peer, "failed to read request");
                            return;
                        }
                    }
                }
                Err(error) => {
                    warn!(target: DISPATCH_TARGET, %error, %peer, "failed to read request");
                    return;
                }
            };
            if !send(&mut writer, &response, &peer) {
                return;
            }
        }
    }
}

fn send(writer: &mut ResponseWriter<ConnectionStream>, response: &RpcResponse, peer: &str) -> bool {
    match writer.write(response) {
        Ok(()) => true,
        Err(error) => {
            warn!(target: DISPATCH_TARGET, %error, %peer, "failed to write response");
            false
        }
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.serve(stream);
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::{Shutdown, TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    use rstest::{fixture, rstest};
    use serde_json::{Value as Json, json};

    use crate::dispatch::test_utils::dispatcher;

    use super::*;

    struct HandlerTestHarness {
        client: BufReader<TcpStream>,
        server_handle: JoinHandle<()>,
    }

    impl HandlerTestHarness {
        fn send(&mut self, request: &[u8]) {
            let stream = self.client.get_mut();
            stream.write_all(request).expect("write request");
            stream.flush().expect("flush");
        }

        fn receive(&mut self) -> Json {
            let mut line = String::new();
            self.client.read_line(&mut line).expect("read");
            serde_json::from_str(&line).expect("response json")
        }

        fn round_trip(&mut self, request: &[u8]) -> Json {
            self.send(request);
            self.receive()
        }

        fn finish(self) {
            self.client
                .get_ref()
                .shutdown(Shutdown::Write)
                .expect("shutdown");
            self.server_handle.join().expect("server join");
        }
    }

    #[fixture]
    fn harness() -> HandlerTestHarness {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handler = DispatchConnectionHandler::new(dispatcher());

        let server_handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            handler.handle(ConnectionStream::Tcp(stream));
        });

        let client = TcpStream::connect(addr).expect("connect");
        HandlerTestHarness {
            client: BufReader::new(client),
            server_handle,
        }
    }

    #[rstest]
    fn serves_several_requests_per_connection(mut harness: HandlerTestHarness) {
        for _ in 0..3 {
            let response = harness.round_trip(b"{\"command\":\"Ping\",\"fields\":{}}\n");
            assert_eq!(response, json!({"success": true, "fields": {}}));
        }
        harness.finish();
    }

    #[rstest]
    fn malformed_json_keeps_the_connection_open(mut harness: HandlerTestHarness) {
        let response = harness.round_trip(b"not valid json\n");
        assert_eq!(response["error"]["id"], "json-error");

        let response = harness.round_trip(b"{\"command\":\"Ping\",\"fields\":{}}\r\n");
        assert_eq!(response["success"], true);
        harness.finish();
    }

    #[rstest]
    fn oversized_lines_are_skipped(mut harness: HandlerTestHarness) {
        let mut request = vec![b'x'; wire::MAX_LINE_BYTES + 10];
        request.push(b'\n');
        request.extend_from_slice(b"{\"command\":\"Ping\",\"fields\":{}}\n");
        harness.send(&request);

        assert_eq!(harness.receive()["error"]["id"], "format-error");
        assert_eq!(harness.receive()["success"], true);
        harness.finish();
    }
}
