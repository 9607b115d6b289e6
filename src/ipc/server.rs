//! IPC server: Unix socket listener and per-client connections.
//!
//! Tracker and depth producers connect here, authenticate with `hello`,
//! then stream frames. Controller events queued during a tick are
//! broadcast to every authenticated client.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction};
use tracing::{debug, error, info, warn};

use super::dispatch;
use super::framing::{self, FrameReader};
use crate::state::ControllerState;

/// Queued outgoing bytes above which events are dropped (256 KiB).
const MAX_WRITE_BUFFER: usize = 262_144;

/// Messages per second per client. Hand frames arrive at camera rate,
/// depth frames alongside them.
const DEFAULT_RATE_LIMIT: u32 = 200;

const RATE_WINDOW: Duration = Duration::from_secs(1);

// ── Rate limiting ──────────────────────────────────────────

/// Fixed-window message counter.
pub struct RateLimiter {
    window_start: Instant,
    seen: u32,
    pub max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self {
            window_start: Instant::now(),
            seen: 0,
            max_per_second,
        }
    }

    /// Count one message; false once the window's budget is spent.
    fn allow(&mut self) -> bool {
        if self.window_start.elapsed() >= RATE_WINDOW {
            self.window_start = Instant::now();
            self.seen = 0;
        }
        self.seen = self.seen.saturating_add(1);
        self.seen <= self.max_per_second
    }
}

// ── Peer credentials ───────────────────────────────────────

/// Identity of the process on the other end of the socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerCred {
    pub uid: Option<u32>,
    pub pid: Option<i32>,
}

impl PeerCred {
    #[cfg(target_os = "linux")]
    fn of(stream: &UnixStream) -> Option<Self> {
        use std::os::unix::io::AsRawFd;

        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut cred as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        (ret == 0).then_some(Self {
            uid: Some(cred.uid),
            pid: Some(cred.pid),
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn of(_stream: &UnixStream) -> Option<Self> {
        Some(Self::default())
    }
}

// ── Client ─────────────────────────────────────────────────

/// One producer or subscriber connection.
pub struct IpcClient {
    pub id: u64,
    stream: UnixStream,
    reader: FrameReader,
    outgoing: Vec<u8>,
    pub authenticated: bool,
    pub peer: PeerCred,
    pub rate_limiter: RateLimiter,
    /// Set after a framing violation; the client is dropped on the next poll.
    pub closing: bool,
}

impl IpcClient {
    pub fn new(stream: UnixStream, id: u64) -> Self {
        if let Err(e) = stream.set_nonblocking(true) {
            warn!(id, "set_nonblocking failed: {}", e);
        }
        let peer = PeerCred::of(&stream).unwrap_or_else(|| {
            warn!(id, "failed to read peer credentials");
            PeerCred::default()
        });
        debug!(id, peer_uid = ?peer.uid, peer_pid = ?peer.pid, "peer credentials");

        Self {
            id,
            stream,
            reader: FrameReader::new(),
            outgoing: Vec::new(),
            authenticated: false,
            peer,
            rate_limiter: RateLimiter::new(DEFAULT_RATE_LIMIT),
            closing: false,
        }
    }

    /// Read everything available. `Err` means the peer is gone.
    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; 65_536];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(io::ErrorKind::ConnectionReset.into()),
                Ok(n) => self.reader.push(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Complete messages read so far. A framing error marks the client
    /// for removal.
    fn take_messages(&mut self) -> Vec<String> {
        let (messages, err) = self.reader.drain_messages();
        if let Some(e) = err {
            error!(client_id = self.id, "{}", e);
            self.closing = true;
        }
        messages
    }

    /// Write as much queued output as the socket accepts.
    pub fn flush(&mut self) -> io::Result<()> {
        while !self.outgoing.is_empty() {
            match self.stream.write(&self.outgoing) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.outgoing.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Queue a response. Responses are never dropped.
    pub fn send(&mut self, payload: &str) {
        framing::encode(payload, &mut self.outgoing);
    }

    /// Queue an event unless the client has fallen too far behind.
    pub fn send_event(&mut self, payload: &str) {
        if self.outgoing.len() > MAX_WRITE_BUFFER {
            warn!(client_id = self.id, "write buffer overflow, dropping event");
            return;
        }
        self.send(payload);
    }
}

// ── Server ─────────────────────────────────────────────────

/// Listener socket plus all connected clients.
pub struct IpcServer {
    pub socket_path: PathBuf,
    pub clients: HashMap<u64, IpcClient>,
    next_client_id: u64,
    pub ipc_trace: bool,
}

impl IpcServer {
    /// Create the server. The socket is bound separately by `bind`.
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            clients: HashMap::new(),
            next_client_id: 1,
            ipc_trace: false,
        }
    }

    /// `$XDG_RUNTIME_DIR/handlight-ipc.sock`, or a per-user directory in /tmp.
    pub fn default_socket_path() -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .unwrap_or_else(|_| format!("/tmp/handlight-{}", unsafe { libc::getuid() }));
        PathBuf::from(runtime_dir).join("handlight-ipc.sock")
    }

    /// Register an already-connected stream as a client.
    pub fn add_client(&mut self, stream: UnixStream) -> u64 {
        let client_id = self.next_client_id;
        self.next_client_id += 1;
        info!(client_id, "IPC client connected");
        self.clients.insert(client_id, IpcClient::new(stream, client_id));
        client_id
    }

    /// Bind the listener (owner-only permissions) and accept clients from
    /// the event loop.
    pub fn bind(
        socket_path: &Path,
        loop_handle: &LoopHandle<'static, ControllerState>,
    ) -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        listener.set_nonblocking(true)?;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o700))?;
        info!(?socket_path, "IPC server listening");

        let source = Generic::new(listener, Interest::READ, Mode::Level);
        loop_handle.insert_source(source, |_event, listener, state| {
            loop {
                match listener.accept() {
                    Ok((stream, _addr)) => {
                        state.ipc_server.add_client(stream);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        error!("accept error: {}", e);
                        break;
                    }
                }
            }
            Ok(PostAction::Continue)
        })?;
        Ok(())
    }

    /// Read, dispatch and answer every client, drop dead ones, then
    /// broadcast the events the messages produced.
    pub fn poll_clients(state: &mut ControllerState) {
        let client_ids: Vec<u64> = state.ipc_server.clients.keys().copied().collect();
        let mut disconnected = Vec::new();

        for client_id in client_ids {
            let Some(client) = state.ipc_server.clients.get_mut(&client_id) else {
                continue;
            };
            let read = client.fill();
            let messages = client.take_messages();

            // Messages that arrived before EOF are still answered
            for msg in messages {
                Self::handle_client_message(state, client_id, &msg);
            }

            let Some(client) = state.ipc_server.clients.get_mut(&client_id) else {
                continue;
            };
            let alive = match read {
                Err(e) => {
                    debug!(client_id, "client disconnected: {}", e);
                    false
                }
                Ok(()) if client.closing => false,
                Ok(()) => match client.flush() {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(client_id, "write error: {}", e);
                        false
                    }
                },
            };
            if !alive {
                disconnected.push(client_id);
            }
        }

        for id in disconnected {
            info!(client_id = id, "removing disconnected IPC client");
            state.ipc_server.clients.remove(&id);
        }

        Self::broadcast_pending(state);
    }

    fn handle_client_message(state: &mut ControllerState, client_id: u64, msg: &str) {
        let allowed = state
            .ipc_server
            .clients
            .get_mut(&client_id)
            .is_some_and(|c| c.rate_limiter.allow());
        if !allowed {
            warn!(client_id, "rate limit exceeded, dropping message");
            if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
                client.send(&dispatch::error_response(0, "rate limit exceeded"));
            }
            return;
        }

        let trace = state.ipc_server.ipc_trace;
        if trace {
            info!(client_id, "<< {}", msg);
        }
        let Some(response) = dispatch::handle_message(state, client_id, msg) else {
            return;
        };
        if trace {
            info!(client_id, ">> {}", response);
        }
        if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
            client.send(&response);
        }
    }

    /// Send every queued controller event to authenticated clients.
    pub fn broadcast_pending(state: &mut ControllerState) {
        let events = state.drain_events();
        if events.is_empty() {
            return;
        }
        let server = &mut state.ipc_server;
        if server.ipc_trace {
            for event in &events {
                info!("broadcast >> {}", event);
            }
        }
        for client in server.clients.values_mut().filter(|c| c.authenticated) {
            for event in &events {
                client.send_event(event);
            }
            if let Err(e) = client.flush() {
                debug!(client_id = client.id, "write error: {}", e);
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(payload: &str) -> Vec<u8> {
        let mut out = Vec::new();
        framing::encode(payload, &mut out);
        out
    }

    fn client() -> (IpcClient, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        (IpcClient::new(a, 1), b)
    }

    #[test]
    fn test_event_backpressure() {
        let (mut c, _peer) = client();
        c.outgoing = vec![0; MAX_WRITE_BUFFER + 1];
        c.send_event("dropped");
        assert_eq!(c.outgoing.len(), MAX_WRITE_BUFFER + 1);
        // Responses still go through
        c.send("kept");
        assert_eq!(c.outgoing.len(), MAX_WRITE_BUFFER + 1 + 8);
    }

    #[test]
    fn test_rate_limiter() {
        let mut limiter = RateLimiter::new(3);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn test_peer_cred_matches_process() {
        let (c, _peer) = client();
        assert_eq!(c.peer.uid, Some(unsafe { libc::getuid() }));
        assert_eq!(c.peer.pid, Some(std::process::id() as i32));
    }

    #[test]
    fn test_oversized_frame_drops_client() {
        let mut state = ControllerState::default();
        let (server_side, mut peer) = UnixStream::pair().unwrap();
        let id = state.ipc_server.add_client(server_side);

        peer.write_all(&(framing::MAX_MESSAGE_SIZE + 1).to_be_bytes())
            .unwrap();
        IpcServer::poll_clients(&mut state);
        assert!(!state.ipc_server.clients.contains_key(&id));
    }

    #[test]
    fn test_poll_dispatches_and_broadcasts() {
        let mut state = ControllerState::default();
        let (server_side, mut peer) = UnixStream::pair().unwrap();
        let id = state.ipc_server.add_client(server_side);

        peer.write_all(&framed("(:type :hello :id 1 :version 1 :client \"test\")"))
            .unwrap();
        IpcServer::poll_clients(&mut state);
        assert!(state.ipc_server.clients[&id].authenticated);

        state.outbox.push("(:type :event :event :test)".to_string());
        IpcServer::broadcast_pending(&mut state);

        peer.set_nonblocking(true).unwrap();
        let mut buf = vec![0u8; 4096];
        let n = peer.read(&mut buf).unwrap();
        let text = String::from_utf8_lossy(&buf[..n]);
        assert!(text.contains(":type :hello"));
        assert!(text.contains(":event :test"));
    }
}
