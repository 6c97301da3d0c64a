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

use anyhow::anyhow;
use serde_derive::{Deserialize, Serialize};

/// The reply `type` tag for an ok reply.
pub const REPLY_OK: i64 = 0;
/// The reply `type` tag for a reply carrying a data payload.
pub const REPLY_DATA: i64 = 1;
/// The reply `type` tag for an error reply.
pub const REPLY_ERROR: i64 = 2;

/// The operations a front end can ask the daemon to perform.
///
/// The wire encoding is the numeric `type` field of the request
/// object. The values are part of the protocol and must never be
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Open a new NETCONF session over SSH.
    Connect = 1,
    /// Drop the daemon-side session entry and close the connection.
    Disconnect = 2,
    /// `<get>`
    Get = 3,
    /// `<get-config>`
    GetConfig = 4,
    /// `<edit-config>`
    EditConfig = 5,
    /// `<copy-config>`
    CopyConfig = 6,
    /// `<delete-config>`
    DeleteConfig = 7,
    /// `<lock>`
    Lock = 8,
    /// `<unlock>`
    Unlock = 9,
    /// `<kill-session>` targeting another NETCONF session on the server.
    Kill = 10,
    /// Return the cached hello snapshot without touching the wire.
    Info = 11,
    /// Send an arbitrary caller-supplied RPC payload.
    Generic = 12,
    /// `<get-schema>`
    GetSchema = 13,
    /// Re-run the hello exchange on a transient channel and refresh
    /// the cached snapshot.
    ReloadHello = 14,
    /// Replay past notifications from the server's stream.
    NtfGetHistory = 15,
    /// `<validate>`
    Validate = 16,
}

impl Opcode {
    /// Decode the numeric `type` field of a request. Returns `None`
    /// for opcodes this daemon does not understand.
    pub fn from_wire(value: i64) -> Option<Opcode> {
        use Opcode::*;
        Some(match value {
            1 => Connect,
            2 => Disconnect,
            3 => Get,
            4 => GetConfig,
            5 => EditConfig,
            6 => CopyConfig,
            7 => DeleteConfig,
            8 => Lock,
            9 => Unlock,
            10 => Kill,
            11 => Info,
            12 => Generic,
            13 => GetSchema,
            14 => ReloadHello,
            15 => NtfGetHistory,
            16 => Validate,
            _ => return None,
        })
    }
}

/// One request from a front end.
///
/// Every request is a JSON object with a numeric `type` opcode. All
/// other fields are opcode-specific, so everything is optional here
/// and the daemon validates presence per operation. Unknown fields
/// are ignored so that older daemons keep working with newer front
/// ends.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Request {
    /// The numeric opcode, see [`Opcode`]. Optional so that the
    /// daemon can report its absence instead of failing the parse.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub op: Option<i64>,

    /// The daemon-side session handle. Required for every opcode
    /// except connect. This is the session id assigned by the NETCONF
    /// server at hello time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    // connect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,

    /// Subtree filter for get/get-config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Source datastore name for get-config/edit-config/copy-config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Target datastore name for the config-mutating operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Inline configuration XML.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    /// URL parameter for delete-config/validate on a url datastore.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "uri-source", skip_serializing_if = "Option::is_none")]
    pub uri_source: Option<String>,
    #[serde(rename = "uri-target", skip_serializing_if = "Option::is_none")]
    pub uri_target: Option<String>,

    // edit-config options
    #[serde(rename = "default-operation", skip_serializing_if = "Option::is_none")]
    pub default_operation: Option<String>,
    #[serde(rename = "error-option", skip_serializing_if = "Option::is_none")]
    pub error_option: Option<String>,
    #[serde(rename = "test-option", skip_serializing_if = "Option::is_none")]
    pub test_option: Option<String>,

    // get-schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The NETCONF session id to `<kill-session>` on the server.
    /// Distinct from `session`, which routes the request locally.
    #[serde(rename = "session-id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Offsets in seconds relative to now bounding the notification
    /// replay window. Negative values point into the past.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<i64>,

    /// Raw RPC payload for the generic operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// The cached hello snapshot for one session, served verbatim for
/// info requests and rebuilt by reload-hello.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session id assigned by the NETCONF server.
    pub sid: String,
    /// NETCONF version in use, "1.0" or "1.1".
    pub version: String,
    pub host: String,
    pub port: String,
    pub user: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// One replayed notification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Event time as seconds since the unix epoch.
    pub eventtime: i64,
    /// The notification content XML.
    pub content: String,
}

/// One reply from the daemon.
///
/// On the wire a reply is a JSON object with a numeric `type` of
/// ok=0, data=1 or error=2 plus variant-specific fields; the raw
/// form is bridged through [`RawReply`] so callers only ever see the
/// typed enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The operation succeeded.
    Ok,
    /// A successful connect, carrying the server-assigned session id.
    Connected { session: String },
    /// The operation produced a data payload (XML).
    Data { data: String },
    /// The operation failed with one or more error messages.
    Error { errors: Vec<String> },
    /// The cached hello snapshot, for info and reload-hello.
    Info(SessionInfo),
    /// Replayed notification history.
    Notifications { notifications: Vec<Notification> },
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Ok
    }

    pub fn connected<S: Into<String>>(session: S) -> Reply {
        Reply::Connected { session: session.into() }
    }

    pub fn data<S: Into<String>>(data: S) -> Reply {
        Reply::Data { data: data.into() }
    }

    /// An error reply with a single message.
    pub fn error<S: Into<String>>(message: S) -> Reply {
        Reply::Error { errors: vec![message.into()] }
    }

    /// An error reply carrying every accumulated message.
    pub fn error_list(errors: Vec<String>) -> Reply {
        Reply::Error { errors }
    }
}

/// The raw wire shape of a reply. Public only so that front ends
/// which want to do their own decoding have the field layout.
#[derive(Serialize, Deserialize, Debug)]
pub struct RawReply {
    #[serde(rename = "type")]
    pub reply_type: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(flatten)]
    pub info: Option<SessionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<Vec<Notification>>,
}

impl From<Reply> for RawReply {
    fn from(reply: Reply) -> RawReply {
        let mut raw = RawReply {
            reply_type: REPLY_OK,
            session: None,
            data: None,
            errors: None,
            info: None,
            notifications: None,
        };
        match reply {
            Reply::Ok => {}
            Reply::Connected { session } => {
                raw.session = Some(session);
            }
            Reply::Data { data } => {
                raw.reply_type = REPLY_DATA;
                raw.data = Some(data);
            }
            Reply::Error { errors } => {
                raw.reply_type = REPLY_ERROR;
                raw.errors = Some(errors);
            }
            Reply::Info(info) => {
                raw.info = Some(info);
            }
            Reply::Notifications { notifications } => {
                raw.notifications = Some(notifications);
            }
        }
        raw
    }
}

impl TryFrom<RawReply> for Reply {
    type Error = anyhow::Error;

    fn try_from(raw: RawReply) -> Result<Reply, anyhow::Error> {
        match raw.reply_type {
            REPLY_OK => {
                if let Some(info) = raw.info {
                    Ok(Reply::Info(info))
                } else if let Some(notifications) = raw.notifications {
                    Ok(Reply::Notifications { notifications })
                } else if let Some(session) = raw.session {
                    Ok(Reply::Connected { session })
                } else {
                    Ok(Reply::Ok)
                }
            }
            REPLY_DATA => {
                let data = raw.data.ok_or(anyhow!("data reply without data field"))?;
                Ok(Reply::Data { data })
            }
            REPLY_ERROR => Ok(Reply::Error { errors: raw.errors.unwrap_or_default() }),
            t => Err(anyhow!("unknown reply type tag {}", t)),
        }
    }
}

// Route serde through the raw form so that serde_json sees the wire
// layout while callers only handle the enum.
impl serde::Serialize for Reply {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        RawReply::from(self.clone()).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Reply {
    fn deserialize<D>(deserializer: D) -> Result<Reply, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawReply::deserialize(deserializer)?;
        Reply::try_from(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opcode_wire_values() {
        let cases = vec![
            (1, Some(Opcode::Connect)),
            (2, Some(Opcode::Disconnect)),
            (3, Some(Opcode::Get)),
            (4, Some(Opcode::GetConfig)),
            (5, Some(Opcode::EditConfig)),
            (6, Some(Opcode::CopyConfig)),
            (7, Some(Opcode::DeleteConfig)),
            (8, Some(Opcode::Lock)),
            (9, Some(Opcode::Unlock)),
            (10, Some(Opcode::Kill)),
            (11, Some(Opcode::Info)),
            (12, Some(Opcode::Generic)),
            (13, Some(Opcode::GetSchema)),
            (14, Some(Opcode::ReloadHello)),
            (15, Some(Opcode::NtfGetHistory)),
            (16, Some(Opcode::Validate)),
            (0, None),
            (17, None),
            (-1, None),
        ];
        for (wire, opcode) in cases {
            assert_eq!(Opcode::from_wire(wire), opcode);
        }
    }

    #[test]
    fn request_kebab_fields() {
        let req: Request = serde_json::from_str(
            r#"{"type":5,"session":"7","target":"running",
                "default-operation":"merge","error-option":"stop-on-error",
                "test-option":"set","config":"<top/>"}"#,
        )
        .expect("request to parse");
        assert_eq!(req.op, Some(5));
        assert_eq!(req.default_operation.as_deref(), Some("merge"));
        assert_eq!(req.error_option.as_deref(), Some("stop-on-error"));
        assert_eq!(req.test_option.as_deref(), Some("set"));
    }

    #[test]
    fn request_missing_type() {
        let req: Request = serde_json::from_str(r#"{"session":"7"}"#).expect("request to parse");
        assert_eq!(req.op, None);
    }

    #[test]
    fn reply_wire_shapes() {
        let cases = vec![
            (Reply::ok(), r#"{"type":0}"#),
            (Reply::connected("42"), r#"{"type":0,"session":"42"}"#),
            (Reply::data("<data/>"), r#"{"type":1,"data":"<data/>"}"#),
            (Reply::error("boom"), r#"{"type":2,"errors":["boom"]}"#),
        ];
        for (reply, wire) in cases {
            assert_eq!(serde_json::to_string(&reply).expect("reply to serialize"), wire);
            let parsed: Reply = serde_json::from_str(wire).expect("reply to parse");
            assert_eq!(parsed, reply);
        }
    }

    #[test]
    fn info_reply_round_trip() {
        let reply = Reply::Info(SessionInfo {
            sid: String::from("17"),
            version: String::from("1.1"),
            host: String::from("router.example"),
            port: String::from("830"),
            user: String::from("admin"),
            capabilities: vec![String::from("urn:ietf:params:netconf:base:1.1")],
        });
        let wire = serde_json::to_string(&reply).expect("info reply to serialize");
        assert!(wire.contains(r#""type":0"#));
        assert!(wire.contains(r#""sid":"17""#));
        let parsed: Reply = serde_json::from_str(&wire).expect("info reply to parse");
        assert_eq!(parsed, reply);
    }

    #[test]
    fn notifications_reply_round_trip() {
        let reply = Reply::Notifications {
            notifications: vec![Notification {
                eventtime: 1700000000,
                content: String::from("<event/>"),
            }],
        };
        let wire = serde_json::to_string(&reply).expect("to serialize");
        let parsed: Reply = serde_json::from_str(&wire).expect("to parse");
        assert_eq!(parsed, reply);
    }

    #[test]
    fn unknown_reply_type_is_rejected() {
        let res: Result<Reply, _> = serde_json::from_str(r#"{"type":9}"#);
        assert!(res.is_err());
    }
}
