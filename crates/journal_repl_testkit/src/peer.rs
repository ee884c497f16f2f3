//! Loopback server playing the peer side of the replication protocol.

use crate::script::{
    commit_response, reject_response, CommitReply, Exchange, HandshakeReply, RecordedTransaction,
};
use journal_repl_protocol::{
    header_map, read_chunked_body, read_head, HeadLimits, HeaderMap, ProtocolError,
    ProtocolResult,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// How long the peer waits for body bytes sent ahead of its interim answer.
const EARLY_BODY_WAIT: Duration = Duration::from_millis(20);

#[derive(Default)]
struct PeerState {
    script: Mutex<VecDeque<Exchange>>,
    records: Mutex<Vec<RecordedTransaction>>,
    accepted: AtomicUsize,
    stopping: AtomicBool,
    /// Live connections by accept index; removed when their thread ends.
    open: Mutex<HashMap<usize, TcpStream>>,
}

impl PeerState {
    fn next_exchange(&self) -> Exchange {
        self.script.lock().pop_front().unwrap_or_default()
    }
}

/// A scripted replication peer on `127.0.0.1`.
///
/// Transactions follow the queued [`Exchange`]s in order; once the script
/// runs out every transaction is accepted. Each accepted connection is
/// served on its own thread and may carry many transactions.
pub struct SimulatedPeer {
    addr: SocketAddr,
    state: Arc<PeerState>,
    acceptor: Option<JoinHandle<()>>,
}

impl SimulatedPeer {
    /// Binds an ephemeral port and starts accepting.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind simulated peer");
        let addr = listener.local_addr().expect("simulated peer address");
        let state = Arc::new(PeerState::default());

        let acceptor = {
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name("simulated-peer".into())
                .spawn(move || accept_loop(listener, state))
                .expect("spawn simulated peer")
        };

        Self {
            addr,
            state,
            acceptor: Some(acceptor),
        }
    }

    /// Listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://127.0.0.1:<port>/`.
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).expect("peer url")
    }

    /// Queues the reply for the next transaction.
    pub fn push(&self, exchange: Exchange) {
        self.state.script.lock().push_back(exchange);
    }

    /// Connections accepted so far.
    pub fn connections_accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Transactions recorded so far.
    pub fn transactions(&self) -> Vec<RecordedTransaction> {
        self.state.records.lock().clone()
    }

    /// Waits until at least `count` transactions are recorded.
    pub fn wait_for_transactions(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Vec<RecordedTransaction> {
        let deadline = Instant::now() + timeout;
        loop {
            let records = self.transactions();
            if records.len() >= count || Instant::now() >= deadline {
                return records;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Stops accepting and closes every open connection.
    pub fn shutdown(&mut self) {
        if self.state.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        // Unblock accept().
        let _ = TcpStream::connect(self.addr);
        for (_, stream) in self.state.open.lock().drain() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
    }
}

impl Drop for SimulatedPeer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(listener: TcpListener, state: Arc<PeerState>) {
    for stream in listener.incoming() {
        if state.stopping.load(Ordering::SeqCst) {
            break;
        }
        let Ok(stream) = stream else { continue };
        let index = state.accepted.fetch_add(1, Ordering::SeqCst);
        if let Ok(handle) = stream.try_clone() {
            state.open.lock().insert(index, handle);
        }

        let conn_state = Arc::clone(&state);
        let spawned = thread::Builder::new()
            .name(format!("simulated-peer-conn-{index}"))
            .spawn(move || {
                if let Err(err) = serve_connection(stream, index, &conn_state) {
                    debug!(connection = index, %err, "simulated peer connection ended");
                }
                conn_state.open.lock().remove(&index);
            });
        if spawned.is_err() {
            state.open.lock().remove(&index);
        }
    }
}

fn serve_connection(stream: TcpStream, index: usize, state: &PeerState) -> ProtocolResult<()> {
    let limits = HeadLimits::default();
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    loop {
        if reader.fill_buf()?.is_empty() {
            return Ok(());
        }
        let head = read_head(&mut reader, &limits)?;
        let mut storage = [httparse::EMPTY_HEADER; 64];
        let mut request = httparse::Request::new(&mut storage);
        if request.parse(&head)?.is_partial() {
            return Err(ProtocolError::UnexpectedEof("request head"));
        }
        let method = request.method.unwrap_or_default().to_string();
        let target = request.path.unwrap_or_default().to_string();
        let headers = header_map(request.headers)?;
        let early_body_bytes = count_early_body(&mut reader, &writer)?;

        let mut record = RecordedTransaction {
            connection: index,
            method,
            target,
            headers,
            early_body_bytes,
            payload: Vec::new(),
            trailers: HeaderMap::new(),
        };
        let exchange = state.next_exchange();
        debug!(
            connection = index,
            target = %record.target,
            handshake = ?exchange.handshake,
            "simulated peer handshake"
        );

        match exchange.handshake {
            HandshakeReply::Continue => {
                writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n")?;
                writer.flush()?;

                let (payload, trailers) = read_chunked_body(&mut reader, &limits)?;
                record.payload = payload;
                record.trailers = trailers;
                state.records.lock().push(record);

                let Some(response) = commit_response(&exchange) else {
                    return hold_open(&mut reader);
                };
                writer.write_all(&response)?;
                writer.flush()?;
                if is_closing(&exchange.commit) {
                    return Ok(());
                }
            }
            HandshakeReply::Reject { close, .. } => {
                if let Some(response) = reject_response(&exchange) {
                    writer.write_all(&response)?;
                    writer.flush()?;
                }
                if close {
                    state.records.lock().push(record);
                    return Ok(());
                }
                // The client terminates the body it never started.
                let (payload, trailers) = read_chunked_body(&mut reader, &limits)?;
                record.payload = payload;
                record.trailers = trailers;
                state.records.lock().push(record);
            }
            HandshakeReply::Silent => {
                state.records.lock().push(record);
                return hold_open(&mut reader);
            }
            HandshakeReply::HangUp => {
                state.records.lock().push(record);
                writer.shutdown(Shutdown::Both)?;
                return Ok(());
            }
            HandshakeReply::Garbage => {
                state.records.lock().push(record);
                writer.write_all(b"not a response\r\n\r\n")?;
                writer.flush()?;
                return hold_open(&mut reader);
            }
        }
    }
}

fn is_closing(reply: &CommitReply) -> bool {
    matches!(
        reply,
        CommitReply::NoContent { close: true } | CommitReply::Fail { close: true, .. }
    )
}

/// Counts body bytes the client sent before the peer answered the head.
fn count_early_body(
    reader: &mut BufReader<TcpStream>,
    stream: &TcpStream,
) -> ProtocolResult<usize> {
    if !reader.buffer().is_empty() {
        return Ok(reader.buffer().len());
    }
    stream.set_read_timeout(Some(EARLY_BODY_WAIT))?;
    let counted = match reader.fill_buf() {
        Ok(buf) => Ok(buf.len()),
        Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            Ok(0)
        }
        Err(err) => Err(ProtocolError::Io(err)),
    };
    stream.set_read_timeout(None)?;
    counted
}

/// Drains the connection until the client goes away.
fn hold_open(reader: &mut BufReader<TcpStream>) -> ProtocolResult<()> {
    io::copy(reader, &mut io::sink())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use journal_repl_protocol::{read_response, StatusCode};

    fn send(stream: &mut TcpStream, bytes: &[u8]) {
        stream.write_all(bytes).unwrap();
        stream.flush().unwrap();
    }

    const HEAD: &[u8] = b"REPLICATE /j?writeHead=0 HTTP/1.1\r\nHost: peer\r\n\
        Transfer-Encoding: chunked\r\nExpect: 100-continue\r\n\r\n";

    #[test]
    fn accepts_and_records_by_default() {
        let peer = SimulatedPeer::start();
        let mut stream = TcpStream::connect(peer.addr()).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let limits = HeadLimits::default();

        send(&mut stream, HEAD);
        assert!(read_response(&mut reader, &limits).unwrap().is_continue());

        send(&mut stream, b"3\r\nabc\r\n0\r\nX-Commit-Delta: 3\r\n\r\n");
        let response = read_response(&mut reader, &limits).unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);

        let records = peer.wait_for_transactions(1, Duration::from_secs(5));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path(), "/j");
        assert_eq!(records[0].payload, b"abc");
        assert_eq!(records[0].commit_delta(), Some("3"));
        assert_eq!(records[0].early_body_bytes, 0);
        assert_eq!(peer.connections_accepted(), 1);
    }

    #[test]
    fn counts_body_sent_before_continue() {
        let peer = SimulatedPeer::start();
        let mut stream = TcpStream::connect(peer.addr()).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut eager = HEAD.to_vec();
        eager.extend_from_slice(b"3\r\nabc\r\n0\r\n\r\n");
        send(&mut stream, &eager);

        let limits = HeadLimits::default();
        assert!(read_response(&mut reader, &limits).unwrap().is_continue());
        assert_eq!(
            read_response(&mut reader, &limits).unwrap().status,
            StatusCode::NO_CONTENT
        );

        let records = peer.wait_for_transactions(1, Duration::from_secs(5));
        assert!(records[0].early_body_bytes > 0);
    }

    #[test]
    fn scripted_rejection() {
        let peer = SimulatedPeer::start();
        peer.push(Exchange::reject(409, "behind").with_write_head("2a"));
        let mut stream = TcpStream::connect(peer.addr()).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        send(&mut stream, HEAD);
        let response = read_response(&mut reader, &HeadLimits::default()).unwrap();
        assert_eq!(response.status, StatusCode::CONFLICT);
        assert_eq!(response.headers.get("X-Write-Head").unwrap(), "2a");
        assert_eq!(response.body_text(), "behind");

        send(&mut stream, b"0\r\n\r\n");
        let records = peer.wait_for_transactions(1, Duration::from_secs(5));
        assert_eq!(records.len(), 1);
        assert!(records[0].payload.is_empty());
    }

    #[test]
    fn hang_up_closes_before_answering() {
        let peer = SimulatedPeer::start();
        peer.push(Exchange::hang_up());
        let mut stream = TcpStream::connect(peer.addr()).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        send(&mut stream, HEAD);
        let result = read_response(&mut reader, &HeadLimits::default());
        assert!(matches!(result, Err(ProtocolError::UnexpectedEof(_))));
        assert_eq!(peer.wait_for_transactions(1, Duration::from_secs(5)).len(), 1);
    }

    #[test]
    fn finished_connections_leave_the_registry() {
        let peer = SimulatedPeer::start();
        let limits = HeadLimits::default();
        for _ in 0..3 {
            let mut stream = TcpStream::connect(peer.addr()).unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            send(&mut stream, HEAD);
            assert!(read_response(&mut reader, &limits).unwrap().is_continue());
            send(&mut stream, b"0\r\n\r\n");
            let response = read_response(&mut reader, &limits).unwrap();
            assert_eq!(response.status, StatusCode::NO_CONTENT);
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while !peer.state.open.lock().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(peer.connections_accepted(), 3);
        assert!(peer.state.open.lock().is_empty());
    }
}
