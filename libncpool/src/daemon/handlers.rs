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

//! One handler per request opcode. Every handler validates its
//! parameters before touching the registry, builds the RPC, runs it
//! through the executor and folds the error sink into the reply.

use std::time::Duration;

use chrono::Utc;
use ncpool_protocol::{Opcode, Reply, Request, SessionInfo};
use tracing::{debug, error, info, instrument, warn};

use super::{
    executor::{self, ExecOutcome},
    history,
    registry::Registry,
};
use crate::{
    error_sink,
    netconf::{
        self,
        xml::{self, Source, Target},
        Datastore, DefaultOperation, ErrorOption, RpcOutcome, RpcReply, TestOption,
    },
};

/// Route one request to its handler. `op` is the raw wire opcode;
/// the worker has already enforced the session-presence rule.
pub fn dispatch(registry: &Registry, rpc_timeout: Duration, op: i64, req: &Request) -> Reply {
    let Some(opcode) = Opcode::from_wire(op) else {
        debug!("unknown operation requested ({})", op);
        return Reply::error("Operation not supported.");
    };
    let sid = req.session.as_deref().unwrap_or_default();

    match opcode {
        Opcode::Connect => connect(registry, req),
        Opcode::Disconnect => disconnect(registry, sid),
        Opcode::Get => get(registry, rpc_timeout, req, sid),
        Opcode::GetConfig => get_config(registry, rpc_timeout, req, sid),
        Opcode::EditConfig => edit_config(registry, rpc_timeout, req, sid),
        Opcode::CopyConfig => copy_config(registry, rpc_timeout, req, sid),
        Opcode::DeleteConfig => delete_config(registry, rpc_timeout, req, sid),
        Opcode::Lock => lock(registry, rpc_timeout, req, sid),
        Opcode::Unlock => unlock(registry, rpc_timeout, req, sid),
        Opcode::Kill => kill(registry, rpc_timeout, req, sid),
        Opcode::Info => info(registry, sid),
        Opcode::Generic => generic(registry, rpc_timeout, req, sid),
        Opcode::GetSchema => get_schema(registry, rpc_timeout, req, sid),
        Opcode::ReloadHello => reload_hello(registry, sid),
        Opcode::NtfGetHistory => ntf_get_history(registry, rpc_timeout, req, sid),
        Opcode::Validate => validate(registry, rpc_timeout, req, sid),
    }
}

/// The sink carries the most specific diagnostic; when populated it
/// wins over whatever the executor produced.
fn sink_or(fallback: Reply) -> Reply {
    match error_sink::take() {
        Some(errors) => Reply::error_list(errors),
        None => fallback,
    }
}

/// Shape the outcome of an operation whose success is a bare `<ok/>`.
fn finish_ok_op(outcome: ExecOutcome) -> Reply {
    match outcome {
        ExecOutcome::Success(Some(data)) => Reply::data(data),
        ExecOutcome::Success(None) => sink_or(Reply::ok()),
        ExecOutcome::Fail(reply) => sink_or(reply),
    }
}

/// Shape the outcome of an operation that is expected to return data.
fn finish_data_op(outcome: ExecOutcome, fail_message: &str) -> Reply {
    match outcome {
        ExecOutcome::Success(Some(data)) => Reply::data(data),
        ExecOutcome::Success(None) => sink_or(Reply::error(fail_message)),
        ExecOutcome::Fail(reply) => sink_or(reply),
    }
}

fn required_target(req: &Request) -> Result<Datastore, Reply> {
    req.target
        .as_deref()
        .and_then(Datastore::parse)
        .ok_or_else(|| Reply::error("Invalid target repository type requested."))
}

#[instrument(skip_all)]
fn connect(registry: &Registry, req: &Request) -> Reply {
    let (Some(host), Some(user)) = (req.host.as_deref(), req.user.as_deref()) else {
        warn!("cannot connect - insufficient input");
        return Reply::error("Cannot connect - insufficient input.");
    };
    let port = req.port.as_deref().unwrap_or("830");
    let mut pass = req.pass.clone().unwrap_or_default();

    debug!("prepare to connect {}@{}:{}", user, host, port);
    let res = netconf::Session::connect(host, port, user, &pass, req.capabilities.as_deref());

    // scrub the plaintext before the buffer is reclaimed
    unsafe {
        for b in pass.as_mut_vec().iter_mut() {
            *b = 0;
        }
    }

    match res {
        Ok(session) => {
            let sid = String::from(session.sid());
            let snapshot = SessionInfo {
                sid: sid.clone(),
                version: String::from(session.version()),
                host: String::from(session.host()),
                port: String::from(session.port()),
                user: String::from(session.user()),
                capabilities: session.capabilities().to_vec(),
            };
            // the entry enters the table snapshot and all, so a
            // concurrent info or reload-hello for this sid can never
            // see a half-built session
            registry.insert(session, snapshot);
            info!("NETCONF session {} established", sid);
            Reply::connected(sid)
        }
        Err(e) => {
            error!("connection could not be established: {}", e);
            sink_or(Reply::error("Connecting NETCONF server failed."))
        }
    }
}

#[instrument(skip_all, fields(s = sid))]
fn disconnect(registry: &Registry, sid: &str) -> Reply {
    if registry.remove_and_close(sid) {
        Reply::ok()
    } else {
        error!("could not find the session \"{}\" to close", sid);
        Reply::error("Internal: Error while finding a session.")
    }
}

#[instrument(skip_all, fields(s = sid))]
fn get(registry: &Registry, rpc_timeout: Duration, req: &Request, sid: &str) -> Reply {
    let body = xml::get(req.filter.as_deref());
    finish_data_op(
        executor::execute(registry, sid, &body, rpc_timeout),
        "Get information failed.",
    )
}

#[instrument(skip_all, fields(s = sid))]
fn get_config(registry: &Registry, rpc_timeout: Duration, req: &Request, sid: &str) -> Reply {
    let Some(source) = req.source.as_deref().and_then(Datastore::parse) else {
        return Reply::error("Invalid source repository type requested.");
    };
    let Some(body) = xml::get_config(source, req.filter.as_deref()) else {
        return Reply::error("Get configuration operation failed.");
    };
    finish_data_op(
        executor::execute(registry, sid, &body, rpc_timeout),
        "Get configuration operation failed.",
    )
}

#[instrument(skip_all, fields(s = sid))]
fn edit_config(registry: &Registry, rpc_timeout: Duration, req: &Request, sid: &str) -> Reply {
    let default_operation = match req.default_operation.as_deref() {
        None => None,
        Some(s) => match DefaultOperation::parse(s) {
            Some(defop) => Some(defop),
            None => return Reply::error("Invalid default-operation parameter."),
        },
    };
    let error_option = match req.error_option.as_deref() {
        None => None,
        Some(s) => match ErrorOption::parse(s) {
            Some(erropt) => Some(erropt),
            None => return Reply::error("Invalid error-option parameter."),
        },
    };
    let target = match required_target(req) {
        Ok(ds) => ds,
        Err(reply) => return reply,
    };

    // source defaults to the inline config payload
    let source_ds = match req.source.as_deref() {
        None => Datastore::Config,
        Some(s) => match Datastore::parse(s) {
            Some(ds) => ds,
            None => return Reply::error("Invalid source repository type requested."),
        },
    };
    let source = match source_ds {
        Datastore::Config => match req.config.clone() {
            Some(config) => Source::Config(config),
            None => return Reply::error("Invalid config data parameter."),
        },
        Datastore::Url => Source::Url(req.uri_source.clone().unwrap_or_default()),
        ds => Source::Store(ds),
    };

    let test_option = match req.test_option.as_deref() {
        None => TestOption::default(),
        Some(s) => match TestOption::parse(s) {
            Some(testopt) => testopt,
            None => return Reply::error("Invalid test-option parameter."),
        },
    };

    let Some(body) = xml::edit_config(target, default_operation, error_option, test_option, &source)
    else {
        return Reply::error("Internal: Creating rpc request failed");
    };
    finish_ok_op(executor::execute(registry, sid, &body, rpc_timeout))
}

#[instrument(skip_all, fields(s = sid))]
fn copy_config(registry: &Registry, rpc_timeout: Duration, req: &Request, sid: &str) -> Reply {
    let source_ds = match req.source.as_deref() {
        // no explicit source means the inline config payload
        None => Datastore::Config,
        Some(s) => match Datastore::parse(s) {
            Some(ds) => ds,
            None => return Reply::error("Invalid source repository type requested."),
        },
    };
    let target_ds = match required_target(req) {
        Ok(ds) => ds,
        Err(reply) => return reply,
    };
    if req.source.is_none() && req.config.is_none() {
        return Reply::error("invalid input parameters - source and config is required.");
    }

    let source = match source_ds {
        Datastore::Config => match req.config.clone() {
            Some(config) => Source::Config(config),
            None => return Reply::error("Internal: Creating rpc request failed"),
        },
        Datastore::Url => Source::Url(req.uri_source.clone().unwrap_or_default()),
        ds => Source::Store(ds),
    };
    let target = match target_ds {
        Datastore::Url => Target::Url(req.uri_target.clone().unwrap_or_default()),
        Datastore::Config => return Reply::error("Invalid target repository type requested."),
        ds => Target::Store(ds),
    };

    let Some(body) = xml::copy_config(&source, &target) else {
        return Reply::error("Internal: Creating rpc request failed");
    };
    finish_ok_op(executor::execute(registry, sid, &body, rpc_timeout))
}

#[instrument(skip_all, fields(s = sid))]
fn delete_config(registry: &Registry, rpc_timeout: Duration, req: &Request, sid: &str) -> Reply {
    let target_ds = match required_target(req) {
        Ok(ds) => ds,
        Err(reply) => return reply,
    };
    let target = match target_ds {
        Datastore::Url => Target::Url(req.url.clone().unwrap_or_default()),
        Datastore::Config => return Reply::error("Invalid target repository type requested."),
        ds => Target::Store(ds),
    };
    let Some(body) = xml::delete_config(&target) else {
        return Reply::error("Internal: Creating rpc request failed");
    };
    finish_ok_op(executor::execute(registry, sid, &body, rpc_timeout))
}

#[instrument(skip_all, fields(s = sid))]
fn lock(registry: &Registry, rpc_timeout: Duration, req: &Request, sid: &str) -> Reply {
    let target = match required_target(req) {
        Ok(ds) => ds,
        Err(reply) => return reply,
    };
    let Some(body) = xml::lock(target) else {
        return Reply::error("Internal: Creating rpc request failed");
    };
    finish_ok_op(executor::execute(registry, sid, &body, rpc_timeout))
}

#[instrument(skip_all, fields(s = sid))]
fn unlock(registry: &Registry, rpc_timeout: Duration, req: &Request, sid: &str) -> Reply {
    let target = match required_target(req) {
        Ok(ds) => ds,
        Err(reply) => return reply,
    };
    let Some(body) = xml::unlock(target) else {
        return Reply::error("Internal: Creating rpc request failed");
    };
    finish_ok_op(executor::execute(registry, sid, &body, rpc_timeout))
}

#[instrument(skip_all, fields(s = sid))]
fn kill(registry: &Registry, rpc_timeout: Duration, req: &Request, sid: &str) -> Reply {
    let Some(kill_sid) = req.session_id.as_deref() else {
        return Reply::error("Missing session-id parameter.");
    };
    let body = xml::kill_session(kill_sid);
    finish_ok_op(executor::execute(registry, sid, &body, rpc_timeout))
}

#[instrument(skip_all, fields(s = sid))]
fn info(registry: &Registry, sid: &str) -> Reply {
    let Some(entry) = registry.get(sid) else {
        return Reply::error("Invalid session identifier.");
    };
    let inner = entry.inner.lock().unwrap();
    if inner.closed {
        return Reply::error("Invalid session identifier.");
    }
    match &inner.hello {
        Some(snapshot) => Reply::Info(snapshot.clone()),
        None => Reply::error("Invalid session identifier."),
    }
}

#[instrument(skip_all, fields(s = sid))]
fn generic(registry: &Registry, rpc_timeout: Duration, req: &Request, sid: &str) -> Reply {
    let Some(content) = req.content.as_deref() else {
        return Reply::error("Internal: Creating rpc request failed");
    };
    finish_ok_op(executor::execute(registry, sid, content, rpc_timeout))
}

#[instrument(skip_all, fields(s = sid))]
fn get_schema(registry: &Registry, rpc_timeout: Duration, req: &Request, sid: &str) -> Reply {
    let Some(identifier) = req.identifier.as_deref() else {
        return Reply::error("No identifier for get-schema supplied.");
    };
    debug!("get-schema(version: {:?}, format: {:?})", req.version, req.format);
    let body = xml::get_schema(identifier, req.version.as_deref(), req.format.as_deref());
    finish_data_op(
        executor::execute(registry, sid, &body, rpc_timeout),
        "Get models operation failed.",
    )
}

#[instrument(skip_all, fields(s = sid))]
fn reload_hello(registry: &Registry, sid: &str) -> Reply {
    let Some(entry) = registry.get(sid) else {
        return Reply::error("Invalid session identifier.");
    };
    let mut inner = entry.inner.lock().unwrap();
    if inner.closed {
        return Reply::error("Invalid session identifier.");
    }
    // a session that never produced a snapshot has nothing to reload
    let Some(old) = inner.hello.clone() else {
        return Reply::error("Invalid session identifier.");
    };
    let Some(session) = inner.session.as_ref() else {
        return Reply::error("Invalid session identifier.");
    };

    debug!("creating temporary NETCONF channel");
    match session.open_channel() {
        Ok(mut chan) => {
            let snapshot = SessionInfo {
                // the sid from the first hello is preserved across
                // reloads
                sid: old.sid,
                version: String::from(chan.version()),
                host: old.host,
                port: old.port,
                user: old.user,
                capabilities: chan.capabilities().to_vec(),
            };
            chan.close();
            inner.hello = Some(snapshot.clone());
            Reply::Info(snapshot)
        }
        Err(e) => {
            debug!("reload hello failed due to channel establishment: {}", e);
            sink_or(Reply::error("Reload was unsuccessful, connection failed."))
        }
    }
}

#[instrument(skip_all, fields(s = sid))]
fn ntf_get_history(registry: &Registry, rpc_timeout: Duration, req: &Request, sid: &str) -> Reply {
    let from = req.from.unwrap_or(0);
    let to = req.to.unwrap_or(0);
    let start = Utc::now() + chrono::Duration::seconds(from);
    let stop = Utc::now() + chrono::Duration::seconds(to);
    debug!("notification history interval {} {}", from, to);

    let Some(entry) = registry.get(sid) else {
        return Reply::error("Invalid session identifier.");
    };

    let mut chan = {
        let mut inner = entry.inner.lock().unwrap();
        if inner.closed {
            return Reply::error("Invalid session identifier.");
        }
        if inner.ntf_subscribed {
            return Reply::error("Notifications subscription is already active.");
        }
        let Some(session) = inner.session.as_ref() else {
            return Reply::error("Invalid session identifier.");
        };

        debug!("creating temporary NETCONF channel");
        let mut chan = match session.open_channel() {
            Ok(chan) => chan,
            Err(e) => {
                debug!("history channel establishment failed: {}", e);
                return sink_or(Reply::error(
                    "Get history of notification was unsuccessful, connection failed.",
                ));
            }
        };

        let body = xml::create_subscription(start, stop);
        match chan.rpc(&body, rpc_timeout) {
            RpcOutcome::Reply(RpcReply::Ok) => {}
            RpcOutcome::Reply(RpcReply::Errors(errors)) => {
                chan.close();
                return Reply::error_list(errors);
            }
            RpcOutcome::Reply(_) => {
                chan.close();
                return Reply::error("Unknown type of NETCONF reply.");
            }
            RpcOutcome::Timeout => {
                chan.close();
                return Reply::error("Timeout for receiving RPC reply expired.");
            }
            RpcOutcome::Failed(why) => {
                chan.close();
                return Reply::error(why);
            }
        }
        inner.ntf_subscribed = true;
        chan
        // entry lock released; the replay reads its own channel
    };

    history::reset();
    chan.collect_notifications(&mut |eventtime, content| history::record(eventtime, content));
    chan.close();

    {
        let mut inner = entry.inner.lock().unwrap();
        inner.ntf_subscribed = false;
    }

    Reply::Notifications { notifications: history::take() }
}

#[instrument(skip_all, fields(s = sid))]
fn validate(registry: &Registry, rpc_timeout: Duration, req: &Request, sid: &str) -> Reply {
    let Some(target) = req.target.as_deref() else {
        return Reply::error("Missing target parameter.");
    };
    let Some(target_ds) = Datastore::parse(target) else {
        return Reply::error("Invalid target repository type requested.");
    };
    let Some(body) = xml::validate(target_ds, req.url.as_deref()) else {
        return Reply::error("Creation of RPC request failed.");
    };
    finish_ok_op(executor::execute(registry, sid, &body, rpc_timeout))
}

#[cfg(test)]
mod test {
    use super::*;

    const T: Duration = Duration::from_millis(10);

    fn errors(reply: Reply) -> Vec<String> {
        match reply {
            Reply::Error { errors } => errors,
            other => panic!("expected an error reply, got {:?}", other),
        }
    }

    fn req(json: &str) -> Request {
        serde_json::from_str(json).expect("request json to parse")
    }

    #[test]
    fn unknown_opcode() {
        let registry = Registry::new();
        let reply = dispatch(&registry, T, 99, &req(r#"{"session":"1"}"#));
        assert_eq!(errors(reply), vec![String::from("Operation not supported.")]);
    }

    #[test]
    fn rpc_on_unknown_session() {
        let registry = Registry::new();
        let reply = dispatch(&registry, T, 3, &req(r#"{"type":3,"session":"gone"}"#));
        assert_eq!(errors(reply), vec![String::from("Unknown session to process.")]);
    }

    #[test]
    fn connect_requires_host_and_user() {
        let registry = Registry::new();
        error_sink::reset();
        let reply = dispatch(&registry, T, 1, &req(r#"{"type":1,"host":"h"}"#));
        assert_eq!(errors(reply), vec![String::from("Cannot connect - insufficient input.")]);
        let reply = dispatch(&registry, T, 1, &req(r#"{"type":1,"user":"u"}"#));
        assert_eq!(errors(reply), vec![String::from("Cannot connect - insufficient input.")]);
        assert_eq!(registry.len(), 0, "validation failures must not touch the registry");
    }

    #[test]
    fn connect_failure_surfaces_transport_diagnostics() {
        let registry = Registry::new();
        error_sink::reset();
        // the client layer records the failure in the sink, which
        // beats the generic connect error
        let reply = dispatch(
            &registry,
            T,
            1,
            &req(r#"{"type":1,"host":"h","user":"u","port":"not-a-port"}"#),
        );
        assert_eq!(errors(reply), vec![String::from("invalid port: not-a-port")]);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn get_config_validates_source() {
        let registry = Registry::new();
        let cases = vec![
            r#"{"type":4,"session":"1"}"#,
            r#"{"type":4,"session":"1","source":"nonsense"}"#,
        ];
        for json in cases {
            let reply = dispatch(&registry, T, 4, &req(json));
            assert_eq!(
                errors(reply),
                vec![String::from("Invalid source repository type requested.")],
                "case: {}",
                json
            );
        }
    }

    #[test]
    fn edit_config_validates_options() {
        let registry = Registry::new();
        let cases = vec![
            (
                r#"{"type":5,"session":"1","target":"running","default-operation":"squash"}"#,
                "Invalid default-operation parameter.",
            ),
            (
                r#"{"type":5,"session":"1","target":"running","error-option":"ignore"}"#,
                "Invalid error-option parameter.",
            ),
            (
                r#"{"type":5,"session":"1","config":"<top/>"}"#,
                "Invalid target repository type requested.",
            ),
            (
                r#"{"type":5,"session":"1","target":"running"}"#,
                "Invalid config data parameter.",
            ),
            (
                r#"{"type":5,"session":"1","target":"running","config":"<top/>","test-option":"maybe"}"#,
                "Invalid test-option parameter.",
            ),
        ];
        for (json, want) in cases {
            let reply = dispatch(&registry, T, 5, &req(json));
            assert_eq!(errors(reply), vec![String::from(want)], "case: {}", json);
        }
    }

    #[test]
    fn copy_config_requires_source_or_config() {
        let registry = Registry::new();
        let reply = dispatch(&registry, T, 6, &req(r#"{"type":6,"session":"1","target":"startup"}"#));
        assert_eq!(
            errors(reply),
            vec![String::from("invalid input parameters - source and config is required.")]
        );

        let reply = dispatch(&registry, T, 6, &req(r#"{"type":6,"session":"1","source":"running"}"#));
        assert_eq!(errors(reply), vec![String::from("Invalid target repository type requested.")]);
    }

    #[test]
    fn lock_unlock_delete_validate_target() {
        let registry = Registry::new();
        for op in [7i64, 8, 9] {
            let reply = dispatch(&registry, T, op, &req(r#"{"session":"1","target":"bogus"}"#));
            assert_eq!(
                errors(reply),
                vec![String::from("Invalid target repository type requested.")],
                "opcode {}",
                op
            );
        }
    }

    #[test]
    fn kill_requires_server_session_id() {
        let registry = Registry::new();
        let reply = dispatch(&registry, T, 10, &req(r#"{"type":10,"session":"1"}"#));
        assert_eq!(errors(reply), vec![String::from("Missing session-id parameter.")]);
    }

    #[test]
    fn get_schema_requires_identifier() {
        let registry = Registry::new();
        let reply = dispatch(&registry, T, 13, &req(r#"{"type":13,"session":"1"}"#));
        assert_eq!(errors(reply), vec![String::from("No identifier for get-schema supplied.")]);
    }

    #[test]
    fn validate_parameter_rules() {
        let registry = Registry::new();
        let cases = vec![
            (r#"{"type":16,"session":"1"}"#, "Missing target parameter."),
            (
                r#"{"type":16,"session":"1","target":"bogus"}"#,
                "Invalid target repository type requested.",
            ),
            (r#"{"type":16,"session":"1","target":"url"}"#, "Creation of RPC request failed."),
            (r#"{"type":16,"session":"1","target":"config"}"#, "Creation of RPC request failed."),
        ];
        for (json, want) in cases {
            let reply = dispatch(&registry, T, 16, &req(json));
            assert_eq!(errors(reply), vec![String::from(want)], "case: {}", json);
        }
    }

    #[test]
    fn info_and_disconnect_on_unknown_session() {
        let registry = Registry::new();
        let reply = dispatch(&registry, T, 11, &req(r#"{"type":11,"session":"gone"}"#));
        assert_eq!(errors(reply), vec![String::from("Invalid session identifier.")]);

        let reply = dispatch(&registry, T, 2, &req(r#"{"type":2,"session":"gone"}"#));
        assert_eq!(errors(reply), vec![String::from("Internal: Error while finding a session.")]);
    }

    #[test]
    fn info_serves_the_cached_snapshot() {
        let registry = Registry::new();
        let entry = registry.insert_stub("12");
        let snapshot = SessionInfo {
            sid: String::from("12"),
            version: String::from("1.1"),
            host: String::from("h"),
            port: String::from("830"),
            user: String::from("u"),
            capabilities: vec![String::from("urn:ietf:params:netconf:base:1.1")],
        };
        entry.inner.lock().unwrap().hello = Some(snapshot.clone());

        // repeated info requests return identical bodies
        for _ in 0..3 {
            let reply = dispatch(&registry, T, 11, &req(r#"{"type":11,"session":"12"}"#));
            assert_eq!(reply, Reply::Info(snapshot.clone()));
        }
    }

    #[test]
    fn generic_requires_content() {
        let registry = Registry::new();
        let reply = dispatch(&registry, T, 12, &req(r#"{"type":12,"session":"1"}"#));
        assert_eq!(errors(reply), vec![String::from("Internal: Creating rpc request failed")]);
    }

    #[test]
    fn sink_wins_over_generic_failures() {
        error_sink::reset();
        error_sink::record("server said no");
        let reply = finish_data_op(
            ExecOutcome::Fail(Reply::error("Get information failed.")),
            "Get information failed.",
        );
        assert_eq!(errors(reply), vec![String::from("server said no")]);

        // and over a bare ok
        error_sink::record("late diagnostic");
        let reply = finish_ok_op(ExecOutcome::Success(None));
        assert_eq!(errors(reply), vec![String::from("late diagnostic")]);

        // but not over a data payload
        error_sink::record("noise");
        let reply = finish_data_op(ExecOutcome::Success(Some(String::from("<d/>"))), "nope");
        assert_eq!(reply, Reply::data("<d/>"));
        error_sink::reset();
    }
}
