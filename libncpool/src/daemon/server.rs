// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    io,
    os::fd::AsFd,
    os::unix::net::{UnixListener, UnixStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread, time,
};

use anyhow::Context;
use ncpool_protocol::{Opcode, Reply, Request};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{error, info, instrument, warn};

use super::{handlers, registry::Registry};
use crate::{config, consts, error_sink, protocol};

pub struct Server {
    config: config::Config,
    /// The process-wide session table. Workers only ever reach it
    /// through the executor and handlers, which enforce the
    /// registry-then-entry lock order.
    registry: Registry,
    terminate: Arc<AtomicBool>,
}

impl Server {
    pub fn new(config: config::Config, terminate: Arc<AtomicBool>) -> Arc<Self> {
        Arc::new(Server { config, registry: Registry::new(), terminate })
    }

    /// The accept loop: non-blocking accepts, one worker thread per
    /// client, periodic idle sweeps, bounded joins on shutdown.
    #[instrument(skip_all)]
    pub fn serve(server: Arc<Self>, listener: UnixListener) -> anyhow::Result<()> {
        listener.set_nonblocking(true).context("setting nonblocking accept")?;
        info!("listening on socket");

        let mut workers: Vec<thread::JoinHandle<()>> = Vec::new();
        let mut conn_counter: usize = 0;
        let mut last_sweep = time::Instant::now();

        while !server.terminate.load(Ordering::SeqCst) {
            if last_sweep.elapsed() > consts::SWEEP_INTERVAL {
                server.registry.evict_idle(server.config.idle_timeout());
                last_sweep = time::Instant::now();
            }

            match listener.accept() {
                Ok((stream, _addr)) => {
                    info!("socket got a new connection");
                    conn_counter += 1;
                    let conn_id = conn_counter;
                    let server = Arc::clone(&server);
                    workers.push(thread::spawn(move || {
                        if let Err(err) = server.handle_conn(stream, conn_id) {
                            error!("handling connection: {:?}", err);
                        }
                    }));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(consts::ACCEPT_SLEEP);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => error!("accepting stream: {:?}", e),
            }

            reap_finished(&mut workers);
        }

        info!("terminating, waiting on {} workers", workers.len());
        let deadline = time::Instant::now() + consts::SHUTDOWN_JOIN_TIMEOUT;
        for handle in workers {
            while !handle.is_finished() && time::Instant::now() < deadline {
                thread::sleep(consts::JOIN_POLL_DURATION);
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("worker panicked");
                }
            } else {
                warn!("worker still running at shutdown deadline, abandoning it");
            }
        }

        info!("closing {} remaining sessions", server.registry.len());
        server.registry.close_all();
        Ok(())
    }

    /// The per-client worker loop: poll, decode one framed request,
    /// dispatch, write the framed reply.
    #[instrument(skip_all, fields(cid = conn_id))]
    fn handle_conn(&self, mut stream: UnixStream, conn_id: usize) -> anyhow::Result<()> {
        error_sink::reset();

        loop {
            if self.terminate.load(Ordering::SeqCst) {
                info!("worker observed termination flag, exiting");
                break;
            }

            match poll_client(&stream) {
                PollStatus::Idle => continue,
                PollStatus::Gone => {
                    info!("client hung up");
                    break;
                }
                PollStatus::Ready => {}
            }

            let body = match protocol::read_frame(&mut stream) {
                Ok(body) => body,
                Err(e) => {
                    info!("closing client after framing error: {:#}", e);
                    break;
                }
            };

            let request: Request = match serde_json::from_str(&body) {
                Ok(request) => request,
                Err(e) => {
                    warn!("dropping request that is not valid json: {}", e);
                    continue;
                }
            };

            let Some(op) = request.op else {
                if write_reply(&mut stream, &Reply::error("Missing operation type from frontend."))
                    .is_err()
                {
                    break;
                }
                continue;
            };

            if op != Opcode::Connect as i64 && request.session.is_none() {
                // a front end that can't even name a session gets cut
                // off so the socket frees up for a saner client
                let _ = write_reply(&mut stream, &Reply::error("Missing session specification."));
                break;
            }

            error_sink::reset();
            let reply = handlers::dispatch(&self.registry, self.config.rpc_timeout(), op, &request);

            if let Err(e) = write_reply(&mut stream, &reply) {
                info!("closing client after write error: {:#}", e);
                break;
            }
        }

        Ok(())
    }
}

enum PollStatus {
    Ready,
    Idle,
    Gone,
}

fn poll_client(stream: &UnixStream) -> PollStatus {
    let mut fds = [PollFd::new(stream.as_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(consts::CLIENT_POLL_TIMEOUT_MS)) {
        Ok(0) => PollStatus::Idle,
        Ok(_) => {
            let revents = fds[0].revents().unwrap_or(PollFlags::empty());
            if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR) {
                PollStatus::Gone
            } else if revents.contains(PollFlags::POLLIN) {
                PollStatus::Ready
            } else {
                PollStatus::Idle
            }
        }
        Err(nix::errno::Errno::EINTR) => PollStatus::Idle,
        Err(_) => PollStatus::Gone,
    }
}

fn write_reply(stream: &mut UnixStream, reply: &Reply) -> anyhow::Result<()> {
    protocol::encode_to(reply, stream).context("writing reply")
}

/// Join every worker that has already finished so the handle vector
/// does not grow without bound.
fn reap_finished(workers: &mut Vec<thread::JoinHandle<()>>) {
    let mut i = 0;
    while i < workers.len() {
        if workers[i].is_finished() {
            let handle = workers.swap_remove(i);
            if handle.join().is_err() {
                error!("worker panicked");
            }
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod test {
    use std::{io::Read, path::PathBuf};

    use ntest::timeout;

    use super::*;

    struct TestDaemon {
        // held for the lifetime of the test so the socket dir stays
        _dir: tempfile::TempDir,
        socket: PathBuf,
        terminate: Arc<AtomicBool>,
        serve_handle: Option<thread::JoinHandle<()>>,
    }

    impl TestDaemon {
        fn start() -> TestDaemon {
            let dir = tempfile::tempdir().expect("tempdir to be created");
            let socket = dir.path().join("ncpool-test.sock");
            let listener = UnixListener::bind(&socket).expect("socket to bind");
            let terminate = Arc::new(AtomicBool::new(false));
            let server = Server::new(config::Config::default(), Arc::clone(&terminate));
            let serve_handle = thread::spawn(move || {
                Server::serve(server, listener).expect("serve to exit cleanly");
            });
            TestDaemon { _dir: dir, socket, terminate, serve_handle: Some(serve_handle) }
        }

        fn client(&self) -> UnixStream {
            UnixStream::connect(&self.socket).expect("client to connect")
        }
    }

    impl Drop for TestDaemon {
        fn drop(&mut self) {
            self.terminate.store(true, Ordering::SeqCst);
            if let Some(h) = self.serve_handle.take() {
                h.join().expect("serve thread not to panic");
            }
        }
    }

    fn roundtrip(stream: &mut UnixStream, request: &str) -> Reply {
        protocol::write_frame(stream, request).expect("request write to succeed");
        protocol::decode_from(stream).expect("reply to decode")
    }

    #[test]
    #[timeout(30000)]
    fn missing_session_reply_and_close() {
        let daemon = TestDaemon::start();
        let mut client = daemon.client();

        let reply = roundtrip(&mut client, r#"{"type":3}"#);
        assert_eq!(reply, Reply::error("Missing session specification."));

        // the daemon hangs up after that reply
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).expect("read to eof");
        assert!(rest.is_empty());
    }

    #[test]
    #[timeout(30000)]
    fn missing_type_keeps_client_open() {
        let daemon = TestDaemon::start();
        let mut client = daemon.client();

        let reply = roundtrip(&mut client, r#"{"session":"1"}"#);
        assert_eq!(reply, Reply::error("Missing operation type from frontend."));

        // same connection keeps serving
        let reply = roundtrip(&mut client, r#"{"type":99,"session":"1"}"#);
        assert_eq!(reply, Reply::error("Operation not supported."));
    }

    #[test]
    #[timeout(30000)]
    fn unparsable_json_is_dropped_silently() {
        let daemon = TestDaemon::start();
        let mut client = daemon.client();

        protocol::write_frame(&mut client, "hello").expect("write to succeed");
        // no reply for the garbage; the next request still works
        let reply = roundtrip(&mut client, r#"{"type":4,"session":"1","source":"nonsense"}"#);
        assert_eq!(reply, Reply::error("Invalid source repository type requested."));
    }

    #[test]
    #[timeout(30000)]
    fn rpc_on_unknown_session() {
        let daemon = TestDaemon::start();
        let mut client = daemon.client();

        let reply = roundtrip(&mut client, r#"{"type":3,"session":"evicted"}"#);
        assert_eq!(reply, Reply::error("Unknown session to process."));
    }

    #[test]
    #[timeout(30000)]
    fn serves_concurrent_clients() {
        let daemon = TestDaemon::start();
        let mut a = daemon.client();
        let mut b = daemon.client();

        let reply = roundtrip(&mut a, r#"{"type":11,"session":"x"}"#);
        assert_eq!(reply, Reply::error("Invalid session identifier."));
        let reply = roundtrip(&mut b, r#"{"type":11,"session":"y"}"#);
        assert_eq!(reply, Reply::error("Invalid session identifier."));
        // the first client is still being served
        let reply = roundtrip(&mut a, r#"{"type":11,"session":"x"}"#);
        assert_eq!(reply, Reply::error("Invalid session identifier."));
    }
}
