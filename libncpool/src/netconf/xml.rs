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

//! RPC payload builders and message parsers.
//!
//! Builders return the XML that goes inside the `<rpc>` envelope;
//! the session layer wraps it with a message-id. Builders that can
//! be handed an unrepresentable combination return `None` and the
//! caller reports an RPC construction failure.

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::{escape::escape, events::Event, Reader};

use super::{Datastore, DefaultOperation, Error, ErrorOption, Result, RpcReply, TestOption};

pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

const MONITORING_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring";
const NOTIFICATION_NS: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";

/// The source of configuration data for copy-config/edit-config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// One of the real datastores.
    Store(Datastore),
    Url(String),
    /// Inline `<config>` payload, embedded verbatim.
    Config(String),
}

/// The target of a config-mutating operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Store(Datastore),
    Url(String),
}

fn store_elem(ds: Datastore) -> Option<String> {
    ds.tag().map(|t| format!("<{}/>", t))
}

fn source_elem(source: &Source) -> Option<String> {
    let inner = match source {
        Source::Store(ds) => store_elem(*ds)?,
        Source::Url(url) => format!("<url>{}</url>", escape(url)),
        Source::Config(config) => format!("<config>{}</config>", config),
    };
    Some(format!("<source>{}</source>", inner))
}

fn target_elem(target: &Target) -> Option<String> {
    let inner = match target {
        Target::Store(ds) => store_elem(*ds)?,
        Target::Url(url) => format!("<url>{}</url>", escape(url)),
    };
    Some(format!("<target>{}</target>", inner))
}

fn filter_elem(filter: Option<&str>) -> String {
    match filter {
        Some(f) => format!(r#"<filter type="subtree">{}</filter>"#, f),
        None => String::new(),
    }
}

pub fn get(filter: Option<&str>) -> String {
    format!("<get>{}</get>", filter_elem(filter))
}

pub fn get_config(source: Datastore, filter: Option<&str>) -> Option<String> {
    Some(format!(
        "<get-config><source>{}</source>{}</get-config>",
        store_elem(source)?,
        filter_elem(filter)
    ))
}

pub fn edit_config(
    target: Datastore,
    default_operation: Option<DefaultOperation>,
    error_option: Option<ErrorOption>,
    test_option: TestOption,
    source: &Source,
) -> Option<String> {
    let mut body = String::from("<edit-config>");
    body.push_str(&format!("<target>{}</target>", store_elem(target)?));
    if let Some(defop) = default_operation {
        body.push_str(&format!("<default-operation>{}</default-operation>", defop.tag()));
    }
    if let Some(tag) = test_option.tag() {
        body.push_str(&format!("<test-option>{}</test-option>", tag));
    }
    if let Some(erropt) = error_option {
        body.push_str(&format!("<error-option>{}</error-option>", erropt.tag()));
    }
    match source {
        Source::Config(config) => body.push_str(&format!("<config>{}</config>", config)),
        Source::Url(url) => body.push_str(&format!("<url>{}</url>", escape(url))),
        Source::Store(_) => return None,
    }
    body.push_str("</edit-config>");
    Some(body)
}

pub fn copy_config(source: &Source, target: &Target) -> Option<String> {
    Some(format!("<copy-config>{}{}</copy-config>", target_elem(target)?, source_elem(source)?))
}

pub fn delete_config(target: &Target) -> Option<String> {
    Some(format!("<delete-config>{}</delete-config>", target_elem(target)?))
}

pub fn lock(target: Datastore) -> Option<String> {
    Some(format!("<lock><target>{}</target></lock>", store_elem(target)?))
}

pub fn unlock(target: Datastore) -> Option<String> {
    Some(format!("<unlock><target>{}</target></unlock>", store_elem(target)?))
}

pub fn kill_session(session_id: &str) -> String {
    format!("<kill-session><session-id>{}</session-id></kill-session>", escape(session_id))
}

pub fn get_schema(identifier: &str, version: Option<&str>, format: Option<&str>) -> String {
    let mut body = format!(
        r#"<get-schema xmlns="{}"><identifier>{}</identifier>"#,
        MONITORING_NS,
        escape(identifier)
    );
    if let Some(v) = version {
        body.push_str(&format!("<version>{}</version>", escape(v)));
    }
    if let Some(f) = format {
        body.push_str(&format!("<format>{}</format>", escape(f)));
    }
    body.push_str("</get-schema>");
    body
}

pub fn validate(target: Datastore, url: Option<&str>) -> Option<String> {
    let inner = match target {
        Datastore::Url => format!("<url>{}</url>", escape(url?)),
        Datastore::Config => return None,
        ds => store_elem(ds)?,
    };
    Some(format!("<validate><source>{}</source></validate>", inner))
}

pub fn create_subscription(start: DateTime<Utc>, stop: DateTime<Utc>) -> String {
    format!(
        r#"<create-subscription xmlns="{}"><startTime>{}</startTime><stopTime>{}</stopTime></create-subscription>"#,
        NOTIFICATION_NS,
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        stop.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

pub fn close_session() -> String {
    String::from("<close-session/>")
}

/// The hello message we advertise to servers.
pub fn client_hello(capabilities: &[String]) -> String {
    let mut body = format!(r#"<hello xmlns="{}"><capabilities>"#, BASE_1_0_NS);
    for cap in capabilities {
        body.push_str(&format!("<capability>{}</capability>", escape(cap)));
    }
    body.push_str("</capabilities></hello>");
    body
}

const BASE_1_0_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// Wrap an operation body in the `<rpc>` envelope.
pub fn rpc_envelope(message_id: u64, body: &str) -> String {
    format!(r#"<rpc xmlns="{}" message-id="{}">{}</rpc>"#, BASE_1_0_NS, message_id, body)
}

/// The local name of a message's root element, used to tell hellos
/// and notifications apart from rpc-replies on a shared transport.
pub fn message_root(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Classify one rpc-reply message.
pub fn classify_reply(xml: &str) -> Result<RpcReply> {
    let mut reader = Reader::from_str(xml);
    let mut errors: Vec<String> = Vec::new();
    let mut saw_reply = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"rpc-reply" => saw_reply = true,
                b"ok" => return Ok(RpcReply::Ok),
                b"data" => {
                    let inner = reader
                        .read_text(e.name())
                        .map_err(|e| Error::protocol(format!("reading data element: {}", e)))?;
                    return Ok(RpcReply::Data(inner.trim().to_string()));
                }
                b"rpc-error" => {
                    errors.push(read_rpc_error(&mut reader)?);
                }
                _ => {
                    // skip subtrees we don't understand so that a
                    // nested <ok> or <data> can't confuse us
                    reader
                        .read_to_end(e.name())
                        .map_err(|e| Error::protocol(format!("skipping element: {}", e)))?;
                }
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"ok" => return Ok(RpcReply::Ok),
                b"data" => return Ok(RpcReply::Data(String::new())),
                _ => continue,
            },
            Ok(Event::Eof) => break,
            Ok(_) => continue,
            Err(e) => return Err(Error::protocol(format!("parsing rpc-reply: {}", e))),
        }
    }

    if !errors.is_empty() {
        Ok(RpcReply::Errors(errors))
    } else if saw_reply {
        Ok(RpcReply::Other)
    } else {
        Err(Error::protocol(String::from("message is not an rpc-reply")))
    }
}

fn read_rpc_error(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut message: Option<String> = None;
    let mut tag: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"error-message" => {
                    let text = reader
                        .read_text(e.name())
                        .map_err(|e| Error::protocol(format!("reading error-message: {}", e)))?;
                    message = Some(text.trim().to_string());
                }
                b"error-tag" => {
                    let text = reader
                        .read_text(e.name())
                        .map_err(|e| Error::protocol(format!("reading error-tag: {}", e)))?;
                    tag = Some(text.trim().to_string());
                }
                _ => {
                    reader
                        .read_to_end(e.name())
                        .map_err(|e| Error::protocol(format!("skipping error child: {}", e)))?;
                }
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"rpc-error" => break,
            Ok(Event::Eof) => {
                return Err(Error::protocol(String::from("truncated rpc-error element")))
            }
            Ok(_) => continue,
            Err(e) => return Err(Error::protocol(format!("parsing rpc-error: {}", e))),
        }
    }
    // prefer the human readable message, fall back to the error tag
    Ok(message.or(tag).unwrap_or_else(|| String::from("Unknown error")))
}

/// Parse a server hello into (session-id, capabilities).
pub fn parse_hello(xml: &str) -> Result<(Option<String>, Vec<String>)> {
    let mut reader = Reader::from_str(xml);
    let mut session_id: Option<String> = None;
    let mut capabilities: Vec<String> = Vec::new();
    let mut saw_hello = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"hello" => saw_hello = true,
                b"capability" => {
                    let text = reader
                        .read_text(e.name())
                        .map_err(|e| Error::protocol(format!("reading capability: {}", e)))?;
                    capabilities.push(text.trim().to_string());
                }
                b"session-id" => {
                    let text = reader
                        .read_text(e.name())
                        .map_err(|e| Error::protocol(format!("reading session-id: {}", e)))?;
                    session_id = Some(text.trim().to_string());
                }
                _ => continue,
            },
            Ok(Event::Eof) => break,
            Ok(_) => continue,
            Err(e) => return Err(Error::protocol(format!("parsing hello: {}", e))),
        }
    }

    if !saw_hello {
        return Err(Error::protocol(String::from("message is not a hello")));
    }
    Ok((session_id, capabilities))
}

/// Parse a `<notification>` message into an epoch event time and the
/// notification content with the eventTime element stripped out.
pub fn parse_notification(xml: &str) -> Option<(i64, String)> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"notification" => {
                let inner = reader.read_text(e.name()).ok()?;
                return Some(split_event_time(inner.as_ref()));
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

fn split_event_time(inner: &str) -> (i64, String) {
    let (eventtime, content) = match (inner.find("<eventTime>"), inner.find("</eventTime>")) {
        (Some(start), Some(end)) if end > start => {
            let time_text = &inner[start + "<eventTime>".len()..end];
            let mut content = String::with_capacity(inner.len());
            content.push_str(&inner[..start]);
            content.push_str(&inner[end + "</eventTime>".len()..]);
            (parse_event_time(time_text.trim()), content)
        }
        _ => (0, String::from(inner)),
    };
    (eventtime, content.trim().to_string())
}

fn parse_event_time(text: &str) -> i64 {
    DateTime::parse_from_rfc3339(text).map(|t| t.timestamp()).unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builds_get_with_filter() {
        let body = get(Some("<interfaces/>"));
        assert_eq!(body, r#"<get><filter type="subtree"><interfaces/></filter></get>"#);
        assert_eq!(get(None), "<get></get>");
    }

    #[test]
    fn builds_get_config() {
        let body = get_config(Datastore::Running, None).expect("builder to succeed");
        assert_eq!(body, "<get-config><source><running/></source></get-config>");
        assert_eq!(get_config(Datastore::Url, None), None);
        assert_eq!(get_config(Datastore::Config, None), None);
    }

    #[test]
    fn builds_edit_config() {
        let body = edit_config(
            Datastore::Candidate,
            Some(DefaultOperation::Merge),
            Some(ErrorOption::RollbackOnError),
            TestOption::TestSet,
            &Source::Config(String::from("<top/>")),
        )
        .expect("builder to succeed");
        assert!(body.contains("<target><candidate/></target>"));
        assert!(body.contains("<default-operation>merge</default-operation>"));
        assert!(body.contains("<error-option>rollback-on-error</error-option>"));
        assert!(body.contains("<test-option>test-then-set</test-option>"));
        assert!(body.contains("<config><top/></config>"));

        // notset suppresses the test-option element
        let body = edit_config(
            Datastore::Running,
            None,
            None,
            TestOption::NotSet,
            &Source::Url(String::from("file:///c.xml")),
        )
        .expect("builder to succeed");
        assert!(!body.contains("test-option"));
        assert!(body.contains("<url>file:///c.xml</url>"));

        // a datastore source makes no sense for edit-config
        assert_eq!(
            edit_config(
                Datastore::Running,
                None,
                None,
                TestOption::TestSet,
                &Source::Store(Datastore::Startup)
            ),
            None
        );
    }

    #[test]
    fn builds_copy_config_combinations() {
        let body = copy_config(
            &Source::Store(Datastore::Running),
            &Target::Store(Datastore::Startup),
        )
        .expect("builder to succeed");
        assert_eq!(
            body,
            "<copy-config><target><startup/></target><source><running/></source></copy-config>"
        );

        let body = copy_config(
            &Source::Config(String::from("<top/>")),
            &Target::Url(String::from("ftp://x/y")),
        )
        .expect("builder to succeed");
        assert!(body.contains("<target><url>ftp://x/y</url></target>"));
        assert!(body.contains("<source><config><top/></config></source>"));
    }

    #[test]
    fn builds_target_only_ops() {
        assert_eq!(
            lock(Datastore::Candidate).expect("builder to succeed"),
            "<lock><target><candidate/></target></lock>"
        );
        assert_eq!(
            unlock(Datastore::Running).expect("builder to succeed"),
            "<unlock><target><running/></target></unlock>"
        );
        assert_eq!(lock(Datastore::Url), None);
        let body = delete_config(&Target::Url(String::from("file:///old.xml")))
            .expect("builder to succeed");
        assert_eq!(
            body,
            "<delete-config><target><url>file:///old.xml</url></target></delete-config>"
        );
    }

    #[test]
    fn builds_get_schema_and_kill() {
        let body = get_schema("ietf-interfaces", Some("2018-02-20"), Some("yang"));
        assert!(body.contains("<identifier>ietf-interfaces</identifier>"));
        assert!(body.contains("<version>2018-02-20</version>"));
        assert!(body.contains("<format>yang</format>"));

        // text content gets escaped
        let body = kill_session("4 <&> 2");
        assert!(body.contains("<session-id>4 &lt;&amp;&gt; 2</session-id>"));
    }

    #[test]
    fn builds_validate() {
        assert_eq!(
            validate(Datastore::Running, None).expect("builder to succeed"),
            "<validate><source><running/></source></validate>"
        );
        assert!(validate(Datastore::Url, Some("file:///v.xml"))
            .expect("builder to succeed")
            .contains("<url>file:///v.xml</url>"));
        assert_eq!(validate(Datastore::Url, None), None);
        assert_eq!(validate(Datastore::Config, None), None);
    }

    #[test]
    fn classifies_ok_reply() {
        let cases = vec![
            r#"<rpc-reply message-id="1" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><ok/></rpc-reply>"#,
            r#"<rpc-reply message-id="1"><ok></ok></rpc-reply>"#,
        ];
        for xml in cases {
            assert_eq!(classify_reply(xml).expect("classification"), RpcReply::Ok);
        }
    }

    #[test]
    fn classifies_data_reply() {
        let xml = r#"<rpc-reply message-id="2"><data><top><a>1</a></top></data></rpc-reply>"#;
        assert_eq!(
            classify_reply(xml).expect("classification"),
            RpcReply::Data(String::from("<top><a>1</a></top>"))
        );

        let xml = r#"<rpc-reply message-id="2"><data/></rpc-reply>"#;
        assert_eq!(classify_reply(xml).expect("classification"), RpcReply::Data(String::new()));
    }

    #[test]
    fn classifies_error_reply() {
        let xml = r#"<rpc-reply message-id="3">
            <rpc-error>
              <error-type>application</error-type>
              <error-tag>invalid-value</error-tag>
              <error-message>syntax error in config</error-message>
            </rpc-error>
            <rpc-error>
              <error-tag>operation-failed</error-tag>
            </rpc-error>
        </rpc-reply>"#;
        assert_eq!(
            classify_reply(xml).expect("classification"),
            RpcReply::Errors(vec![
                String::from("syntax error in config"),
                String::from("operation-failed"),
            ])
        );
    }

    #[test]
    fn classifies_unknown_reply() {
        let xml = r#"<rpc-reply message-id="4"><something-else/></rpc-reply>"#;
        assert_eq!(classify_reply(xml).expect("classification"), RpcReply::Other);
        assert!(classify_reply("<hello/>").is_err());
    }

    #[test]
    fn parse_failures_feed_the_error_sink() {
        crate::error_sink::reset();
        assert!(classify_reply("<hello/>").is_err());
        assert_eq!(
            crate::error_sink::take(),
            Some(vec![String::from("message is not an rpc-reply")])
        );

        assert!(parse_hello("<rpc-reply/>").is_err());
        assert_eq!(crate::error_sink::take(), Some(vec![String::from("message is not a hello")]));
    }

    #[test]
    fn parses_hello() {
        let xml = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
            <capabilities>
              <capability>urn:ietf:params:netconf:base:1.0</capability>
              <capability>urn:ietf:params:netconf:base:1.1</capability>
            </capabilities>
            <session-id>4242</session-id>
        </hello>"#;
        let (sid, caps) = parse_hello(xml).expect("hello to parse");
        assert_eq!(sid.as_deref(), Some("4242"));
        assert_eq!(caps, vec![String::from(BASE_1_0), String::from(BASE_1_1)]);
    }

    #[test]
    fn detects_message_roots() {
        assert_eq!(message_root("<hello><a/></hello>").as_deref(), Some("hello"));
        assert_eq!(message_root("<notification/>").as_deref(), Some("notification"));
        assert_eq!(
            message_root(r#"<nc:rpc-reply xmlns:nc="x"><nc:ok/></nc:rpc-reply>"#).as_deref(),
            Some("rpc-reply")
        );
        assert_eq!(message_root("not xml at all"), None);
    }

    #[test]
    fn parses_notification() {
        let xml = r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0">
            <eventTime>2023-03-01T10:20:30Z</eventTime>
            <config-changed><by>admin</by></config-changed>
        </notification>"#;
        let (eventtime, content) = parse_notification(xml).expect("notification to parse");
        assert_eq!(eventtime, 1677666030);
        assert_eq!(content, "<config-changed><by>admin</by></config-changed>");
    }

    #[test]
    fn rpc_envelope_shape() {
        let rpc = rpc_envelope(7, "<get></get>");
        assert_eq!(
            rpc,
            r#"<rpc xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="7"><get></get></rpc>"#
        );
    }
}
