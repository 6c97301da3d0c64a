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

use std::time;

/// Where the daemon listens when no socket path is given on the
/// command line.
pub const DEFAULT_SOCKET: &str = "/var/run/mod_netconf.sock";

/// How long to wait for an rpc-reply before giving up on the RPC.
pub const RPC_TIMEOUT: time::Duration = time::Duration::from_millis(5000);

/// How long to wait for the server side of a hello exchange.
pub const HELLO_TIMEOUT: time::Duration = time::Duration::from_secs(30);

/// Poll timeout on a client socket. Bounds how stale a worker's view
/// of the termination flag can get.
pub const CLIENT_POLL_TIMEOUT_MS: u16 = 1000;

/// Sleep between accept attempts when no client is dialing in.
pub const ACCEPT_SLEEP: time::Duration = time::Duration::from_millis(200);

/// How often the accept loop sweeps the registry for idle sessions.
pub const SWEEP_INTERVAL: time::Duration = time::Duration::from_secs(10);

/// Sessions idle longer than this get evicted by the sweeper.
pub const IDLE_TIMEOUT: time::Duration = time::Duration::from_secs(60 * 60);

/// Ceiling on waiting for worker threads during shutdown.
pub const SHUTDOWN_JOIN_TIMEOUT: time::Duration = time::Duration::from_secs(5);
pub const JOIN_POLL_DURATION: time::Duration = time::Duration::from_millis(100);

/// A chunk length in the client framing may have at most this many
/// decimal digits.
pub const FRAME_LEN_MAX_DIGITS: usize = 10;

/// Read timeout while draining a notification replay. Once the server
/// goes quiet for this long we assume the window is exhausted.
pub const NTF_READ_TIMEOUT: time::Duration = time::Duration::from_millis(1000);

/// Best-effort timeout for the close-session exchange on disconnect.
pub const CLOSE_TIMEOUT: time::Duration = time::Duration::from_millis(500);
