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

//! The NETCONF client layer: SSH connection management, hello
//! exchange, RPC building and rpc-reply classification.

use std::fmt;

use crate::error_sink;

mod session;
mod transport;
pub mod xml;

pub use session::{Channel, Session};

/// A named configuration store on the server, plus the two pseudo
/// datastores (`url`, inline `config`) that some operations accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datastore {
    Running,
    Startup,
    Candidate,
    Url,
    Config,
}

impl Datastore {
    /// Parse the datastore name used on the wire. Returns `None` for
    /// anything outside the fixed vocabulary.
    pub fn parse(s: &str) -> Option<Datastore> {
        Some(match s {
            "running" => Datastore::Running,
            "startup" => Datastore::Startup,
            "candidate" => Datastore::Candidate,
            "url" => Datastore::Url,
            "config" => Datastore::Config,
            _ => return None,
        })
    }

    /// The element name for the real datastores. `Url` and `Config`
    /// have structured encodings handled by the RPC builders.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Datastore::Running => Some("running"),
            Datastore::Startup => Some("startup"),
            Datastore::Candidate => Some("candidate"),
            Datastore::Url | Datastore::Config => None,
        }
    }
}

/// edit-config default-operation values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultOperation {
    Merge,
    Replace,
    None,
}

impl DefaultOperation {
    pub fn parse(s: &str) -> Option<DefaultOperation> {
        Some(match s {
            "merge" => DefaultOperation::Merge,
            "replace" => DefaultOperation::Replace,
            "none" => DefaultOperation::None,
            _ => return None,
        })
    }

    pub fn tag(&self) -> &'static str {
        match self {
            DefaultOperation::Merge => "merge",
            DefaultOperation::Replace => "replace",
            DefaultOperation::None => "none",
        }
    }
}

/// edit-config error-option values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOption {
    ContinueOnError,
    StopOnError,
    RollbackOnError,
}

impl ErrorOption {
    pub fn parse(s: &str) -> Option<ErrorOption> {
        Some(match s {
            "continue-on-error" => ErrorOption::ContinueOnError,
            "stop-on-error" => ErrorOption::StopOnError,
            "rollback-on-error" => ErrorOption::RollbackOnError,
            _ => return None,
        })
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ErrorOption::ContinueOnError => "continue-on-error",
            ErrorOption::StopOnError => "stop-on-error",
            ErrorOption::RollbackOnError => "rollback-on-error",
        }
    }
}

/// edit-config test-option values. `testset` is the protocol default
/// and `notset` suppresses the element entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestOption {
    NotSet,
    #[default]
    TestSet,
    Set,
    Test,
}

impl TestOption {
    pub fn parse(s: &str) -> Option<TestOption> {
        Some(match s {
            "notset" => TestOption::NotSet,
            "testset" => TestOption::TestSet,
            "set" => TestOption::Set,
            "test" => TestOption::Test,
            _ => return None,
        })
    }

    pub fn tag(&self) -> Option<&'static str> {
        match self {
            TestOption::NotSet => None,
            TestOption::TestSet => Some("test-then-set"),
            TestOption::Set => Some("set"),
            TestOption::Test => Some("test-only"),
        }
    }
}

/// A classified rpc-reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcReply {
    /// `<ok/>`
    Ok,
    /// `<data>` with the raw inner XML.
    Data(String),
    /// One message per `<rpc-error>` element.
    Errors(Vec<String>),
    /// An rpc-reply that is none of the above.
    Other,
}

/// What came of submitting one RPC to a session.
#[derive(Debug)]
pub enum RpcOutcome {
    /// The server answered with an rpc-reply.
    Reply(RpcReply),
    /// No reply arrived within the deadline.
    Timeout,
    /// Sending or receiving failed at the transport level. The
    /// session may or may not still be usable; callers check
    /// [`Session::healthy`].
    Failed(String),
}

/// Errors from the client layer.
#[derive(Debug)]
pub enum Error {
    /// The peer did not answer in time.
    Timeout,
    /// The SSH transport failed or was torn down.
    Transport(String),
    /// The peer spoke something that is not NETCONF.
    Protocol(String),
}

impl Error {
    /// Build a transport error. The message is also recorded in the
    /// per-request error sink so the handler whose request triggered
    /// the failure can fold the diagnostic into its reply.
    pub(crate) fn transport(message: String) -> Error {
        error_sink::record(message.clone());
        Error::Transport(message)
    }

    /// Build a protocol error, recorded like [`Error::transport`].
    pub(crate) fn protocol(message: String) -> Error {
        error_sink::record(message.clone());
        Error::Protocol(message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout => write!(f, "timeout expired"),
            Error::Transport(msg) => write!(f, "transport failure: {}", msg),
            Error::Protocol(msg) => write!(f, "protocol failure: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
