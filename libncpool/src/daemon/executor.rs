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

//! The RPC executor: resolve a session id, run one RPC under the
//! entry lock, classify the result.

use std::time::{Duration, SystemTime};

use ncpool_protocol::Reply;
use tracing::{instrument, warn};

use super::registry::Registry;
use crate::{
    error_sink,
    netconf::{RpcOutcome, RpcReply},
};

/// What the executor hands back to a handler.
#[derive(Debug)]
pub enum ExecOutcome {
    /// The RPC went through. Carries the data body when the server
    /// returned one; `None` covers both `<ok/>` and the indeterminate
    /// cases where the error sink speaks for the result.
    Success(Option<String>),
    /// A ready-to-send error reply.
    Fail(Reply),
}

/// Resolve `sid`, run `body` on it, classify. Evicts the session when
/// the transport under it turns out to be dead.
#[instrument(skip_all, fields(s = sid))]
pub fn execute(registry: &Registry, sid: &str, body: &str, timeout: Duration) -> ExecOutcome {
    let Some(entry) = registry.get(sid) else {
        warn!("unknown session to process");
        return ExecOutcome::Fail(Reply::error("Unknown session to process."));
    };

    let (outcome, healthy) = {
        // we unwrap to propagate the poison as an unwind
        let mut inner = entry.inner.lock().unwrap();
        if inner.closed {
            return ExecOutcome::Fail(Reply::error("Unknown session to process."));
        }
        inner.last_activity = SystemTime::now();
        let Some(session) = inner.session.as_mut() else {
            return ExecOutcome::Fail(Reply::error("Unknown session to process."));
        };
        let outcome = session.rpc(body, timeout);
        let healthy = session.healthy();
        (outcome, healthy)
    };

    match classify(outcome, healthy) {
        Classified::Done(result) => result,
        Classified::Evict(reply) => {
            // the entry lock is released by now, so taking the
            // registry write lock preserves the lock order
            warn!("session {} is no longer usable, evicting", sid);
            registry.remove_and_close(sid);
            ExecOutcome::Fail(reply)
        }
    }
}

#[derive(Debug)]
enum Classified {
    Done(ExecOutcome),
    /// The session under the RPC died; evict it before replying.
    Evict(Reply),
}

fn classify(outcome: RpcOutcome, healthy: bool) -> Classified {
    match outcome {
        RpcOutcome::Reply(RpcReply::Ok) => Classified::Done(ExecOutcome::Success(None)),
        RpcOutcome::Reply(RpcReply::Data(data)) => {
            if data.is_empty() {
                Classified::Done(ExecOutcome::Fail(Reply::error(
                    "Internal: No data from reply received.",
                )))
            } else {
                Classified::Done(ExecOutcome::Success(Some(data)))
            }
        }
        RpcOutcome::Reply(RpcReply::Errors(errors)) => {
            // server-supplied diagnostics also feed the sink so the
            // handler's fold sees them
            for message in &errors {
                error_sink::record(message.clone());
            }
            Classified::Done(ExecOutcome::Fail(Reply::error_list(errors)))
        }
        RpcOutcome::Reply(RpcReply::Other) => {
            Classified::Done(ExecOutcome::Fail(Reply::error("Unknown type of NETCONF reply.")))
        }
        RpcOutcome::Timeout => Classified::Done(ExecOutcome::Fail(Reply::error(
            "Timeout for receiving RPC reply expired.",
        ))),
        RpcOutcome::Failed(why) => {
            if healthy {
                // indeterminate outcome on a live session: the sink,
                // if populated, speaks for the result
                warn!("rpc outcome indeterminate on healthy session: {}", why);
                Classified::Done(ExecOutcome::Success(None))
            } else {
                warn!("receiving rpc-reply failed: {}", why);
                Classified::Evict(Reply::error("Internal: Receiving RPC-REPLY failed."))
            }
        }
    }
}
