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
    net::TcpStream,
    time::{Duration, Instant},
};

use ssh2::{KeyboardInteractivePrompt, Prompt};
use tracing::{debug, info, warn};

use super::{
    transport::{Framed, ReadError},
    xml, Error, Result, RpcOutcome,
};
use crate::{consts, error_sink};

/// One live NETCONF session: the SSH transport plus the primary
/// NETCONF channel riding on it.
pub struct Session {
    ssh: ssh2::Session,
    chan: Channel,
    requested_caps: Vec<String>,
    host: String,
    port: String,
    user: String,
}

/// One NETCONF channel. The session owns a primary channel;
/// reload-hello and notification replay open transient ones on the
/// same SSH transport.
pub struct Channel {
    framed: Framed,
    sid: String,
    base11: bool,
    capabilities: Vec<String>,
    msg_id: u64,
}

impl Session {
    /// Connect to a NETCONF server and run the hello exchange.
    ///
    /// Host keys are accepted unconditionally and public key auth is
    /// never attempted; password and keyboard-interactive prompts are
    /// both answered with the supplied password verbatim. These are
    /// deliberate daemon-wide choices; a stricter deployment would
    /// tighten them.
    pub fn connect(
        host: &str,
        port: &str,
        user: &str,
        pass: &str,
        capabilities: Option<&[String]>,
    ) -> Result<Session> {
        let port_num: u16 =
            port.parse().map_err(|_| Error::transport(format!("invalid port: {}", port)))?;

        debug!("dialing {}:{}", host, port_num);
        let tcp = TcpStream::connect((host, port_num))
            .map_err(|e| Error::transport(format!("connecting to {}:{}: {}", host, port, e)))?;

        let mut ssh = ssh2::Session::new()
            .map_err(|e| Error::transport(format!("creating ssh session: {}", e)))?;
        ssh.set_tcp_stream(tcp);
        ssh.set_timeout(consts::HELLO_TIMEOUT.as_millis() as u32);
        ssh.handshake().map_err(|e| Error::transport(format!("ssh handshake: {}", e)))?;

        authenticate(&ssh, user, pass)?;
        info!("authenticated {}@{}:{}", user, host, port);

        let requested_caps = match capabilities {
            Some(caps) if !caps.is_empty() => caps.to_vec(),
            _ => default_capabilities(),
        };
        let chan = open_netconf_channel(&ssh, &requested_caps)?;
        info!("NETCONF session {} established", chan.sid());

        Ok(Session {
            ssh,
            chan,
            requested_caps,
            host: String::from(host),
            port: String::from(port),
            user: String::from(user),
        })
    }

    pub fn sid(&self) -> &str {
        self.chan.sid()
    }

    /// "1.0" or "1.1", per the negotiated framing.
    pub fn version(&self) -> &'static str {
        self.chan.version()
    }

    pub fn capabilities(&self) -> &[String] {
        self.chan.capabilities()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Submit an RPC on the primary channel.
    pub fn rpc(&mut self, body: &str, timeout: Duration) -> RpcOutcome {
        self.chan.rpc(body, timeout)
    }

    /// Whether the primary channel still looks usable.
    pub fn healthy(&self) -> bool {
        self.chan.healthy()
    }

    /// Open a transient NETCONF channel on the existing SSH
    /// transport, with its own hello exchange.
    pub fn open_channel(&self) -> Result<Channel> {
        open_netconf_channel(&self.ssh, &self.requested_caps)
    }

    /// Best-effort close-session followed by channel teardown.
    pub fn close(&mut self) {
        self.chan.close();
    }
}

impl Channel {
    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn version(&self) -> &'static str {
        if self.base11 {
            "1.1"
        } else {
            "1.0"
        }
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn healthy(&self) -> bool {
        self.framed.healthy()
    }

    /// Send one RPC and wait for its reply. Hellos and notifications
    /// arriving on the same channel during the wait are discarded and
    /// the wait continues.
    pub fn rpc(&mut self, body: &str, timeout: Duration) -> RpcOutcome {
        self.msg_id += 1;
        let envelope = xml::rpc_envelope(self.msg_id, body);
        if let Err(e) = self.framed.write_message(&envelope) {
            return RpcOutcome::Failed(e.to_string());
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return RpcOutcome::Timeout;
            }
            match self.framed.read_message(remaining) {
                Ok(msg) => match xml::message_root(&msg).as_deref() {
                    Some("hello") => {
                        warn!("<hello> received instead of reply, it will be lost");
                        continue;
                    }
                    Some("notification") => {
                        debug!("discarding async notification while waiting for reply");
                        continue;
                    }
                    _ => {
                        return match xml::classify_reply(&msg) {
                            Ok(reply) => RpcOutcome::Reply(reply),
                            Err(e) => RpcOutcome::Failed(e.to_string()),
                        }
                    }
                },
                Err(ReadError::Timeout) => return RpcOutcome::Timeout,
                Err(ReadError::Closed(why)) => {
                    // feed the sink so the originating request sees
                    // the specific transport diagnostic
                    error_sink::record(why.clone());
                    return RpcOutcome::Failed(why);
                }
            }
        }
    }

    /// Drain replayed notifications into `sink` until the server
    /// signals the end of the replay or goes quiet.
    pub fn collect_notifications(&mut self, sink: &mut dyn FnMut(i64, String)) {
        loop {
            match self.framed.read_message(consts::NTF_READ_TIMEOUT) {
                Ok(msg) => {
                    if xml::message_root(&msg).as_deref() != Some("notification") {
                        continue;
                    }
                    if let Some((eventtime, content)) = xml::parse_notification(&msg) {
                        let done = content.contains("replayComplete")
                            || content.contains("notificationComplete");
                        sink(eventtime, content);
                        if done {
                            break;
                        }
                    }
                }
                Err(ReadError::Timeout) => break,
                Err(ReadError::Closed(why)) => {
                    debug!("notification channel closed: {}", why);
                    break;
                }
            }
        }
    }

    pub fn close(&mut self) {
        let _ = self.rpc(&xml::close_session(), consts::CLOSE_TIMEOUT);
        self.framed.close();
    }
}

fn default_capabilities() -> Vec<String> {
    vec![String::from(xml::BASE_1_0), String::from(xml::BASE_1_1)]
}

fn authenticate(ssh: &ssh2::Session, user: &str, pass: &str) -> Result<()> {
    // asking for the method list runs the "none" auth attempt, which
    // some servers accept outright
    let methods = ssh
        .auth_methods(user)
        .map_err(|e| Error::transport(format!("listing auth methods: {}", e)))?
        .to_string();
    if ssh.authenticated() {
        return Ok(());
    }
    debug!("auth methods offered: {}", methods);

    if methods.contains("password") {
        if let Err(e) = ssh.userauth_password(user, pass) {
            debug!("password auth failed: {}", e);
        }
        if ssh.authenticated() {
            return Ok(());
        }
    }

    if methods.contains("keyboard-interactive") {
        let mut prompter = PasswordPrompter { pass: String::from(pass) };
        if let Err(e) = ssh.userauth_keyboard_interactive(user, &mut prompter) {
            debug!("keyboard-interactive auth failed: {}", e);
        }
        if ssh.authenticated() {
            return Ok(());
        }
    }

    Err(Error::transport(format!("authentication for {} failed", user)))
}

/// Answers every keyboard-interactive prompt with the password the
/// front end supplied.
struct PasswordPrompter {
    pass: String,
}

impl KeyboardInteractivePrompt for PasswordPrompter {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.pass.clone()).collect()
    }
}

impl Drop for PasswordPrompter {
    fn drop(&mut self) {
        // scrub the plaintext before the buffer is reclaimed
        unsafe {
            for b in self.pass.as_mut_vec().iter_mut() {
                *b = 0;
            }
        }
    }
}

fn open_netconf_channel(ssh: &ssh2::Session, capabilities: &[String]) -> Result<Channel> {
    let mut raw = ssh
        .channel_session()
        .map_err(|e| Error::transport(format!("opening ssh channel: {}", e)))?;
    raw.subsystem("netconf")
        .map_err(|e| Error::transport(format!("requesting netconf subsystem: {}", e)))?;

    let mut framed = Framed::new(ssh.clone(), raw);
    framed.write_message(&xml::client_hello(capabilities))?;

    let server_hello = match framed.read_message(consts::HELLO_TIMEOUT) {
        Ok(msg) => msg,
        Err(ReadError::Timeout) => {
            error_sink::record("Timeout for receiving server <hello> expired.");
            return Err(Error::Timeout);
        }
        Err(ReadError::Closed(why)) => return Err(Error::transport(why)),
    };
    let (sid, server_caps) = xml::parse_hello(&server_hello)?;
    let sid =
        sid.ok_or_else(|| Error::protocol(String::from("server hello carried no session-id")))?;

    let base11 = server_caps.iter().any(|c| c.starts_with(xml::BASE_1_1))
        && capabilities.iter().any(|c| c.starts_with(xml::BASE_1_1));
    if base11 {
        framed.upgrade();
    }

    Ok(Channel { framed, sid, base11, capabilities: server_caps, msg_id: 0 })
}
