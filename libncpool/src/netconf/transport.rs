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

//! NETCONF message framing over an ssh channel.
//!
//! Sessions start in 1.0 end-of-message framing (`]]>]]>` delimiter)
//! for the hello exchange and upgrade to 1.1 chunked framing when
//! both sides advertise the base:1.1 capability.

use std::{
    io::{Read, Write},
    str,
    time::{Duration, Instant},
};

use super::{Error, Result};

const EOM: &[u8] = b"]]>]]>";
const READ_CHUNK: usize = 16 * 1024;

/// Why a read came up empty.
#[derive(Debug)]
pub(super) enum ReadError {
    /// The deadline passed without a complete message arriving.
    Timeout,
    /// The channel is gone or the peer sent garbage.
    Closed(String),
}

pub(super) struct Framed {
    ssh: ssh2::Session,
    chan: ssh2::Channel,
    base11: bool,
    inbuf: Vec<u8>,
}

impl Framed {
    pub fn new(ssh: ssh2::Session, chan: ssh2::Channel) -> Framed {
        Framed { ssh, chan, base11: false, inbuf: Vec::new() }
    }

    /// Switch to 1.1 chunked framing. Done once, right after the
    /// hello exchange.
    pub fn upgrade(&mut self) {
        self.base11 = true;
    }

    pub fn write_message(&mut self, msg: &str) -> Result<()> {
        let buf = if self.base11 {
            format!("\n#{}\n{}\n##\n", msg.len(), msg)
        } else {
            format!("{}]]>]]>", msg)
        };
        self.chan
            .write_all(buf.as_bytes())
            .map_err(|e| Error::transport(format!("writing message: {}", e)))?;
        self.chan.flush().map_err(|e| Error::transport(format!("flushing message: {}", e)))?;
        Ok(())
    }

    /// Read one complete message, waiting at most `timeout`.
    pub fn read_message(&mut self, timeout: Duration) -> std::result::Result<String, ReadError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_extract()? {
                Some(msg) => return Ok(msg),
                None => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ReadError::Timeout);
            }
            // libssh2 treats a timeout of zero as "block forever"
            self.ssh.set_timeout(remaining.as_millis().max(1).min(u32::MAX as u128) as u32);

            let mut tmp = [0u8; READ_CHUNK];
            match self.chan.read(&mut tmp) {
                Ok(0) => return Err(ReadError::Closed(String::from("channel closed by peer"))),
                Ok(n) => self.inbuf.extend_from_slice(&tmp[..n]),
                Err(e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    return Err(ReadError::Timeout)
                }
                Err(e) => return Err(ReadError::Closed(format!("reading channel: {}", e))),
            }
        }
    }

    fn try_extract(&mut self) -> std::result::Result<Option<String>, ReadError> {
        let parsed = if self.base11 {
            extract_chunked(&self.inbuf)
        } else {
            extract_eom(&self.inbuf)
        };
        match parsed {
            Ok(Some((msg, consumed))) => {
                self.inbuf.drain(..consumed);
                Ok(Some(msg))
            }
            Ok(None) => Ok(None),
            Err(why) => Err(ReadError::Closed(why)),
        }
    }

    pub fn healthy(&self) -> bool {
        !self.chan.eof()
    }

    pub fn close(&mut self) {
        let _ = self.chan.close();
    }
}

/// Find a `]]>]]>` delimited message. Returns the message and the
/// number of buffer bytes it consumed, or `None` when the buffer
/// does not hold a complete message yet.
fn extract_eom(buf: &[u8]) -> std::result::Result<Option<(String, usize)>, String> {
    let Some(pos) = buf.windows(EOM.len()).position(|w| w == EOM) else {
        return Ok(None);
    };
    let msg = str::from_utf8(&buf[..pos]).map_err(|_| String::from("message is not utf8"))?;
    Ok(Some((msg.trim().to_string(), pos + EOM.len())))
}

/// Parse a chunk-framed message off the front of the buffer.
fn extract_chunked(buf: &[u8]) -> std::result::Result<Option<(String, usize)>, String> {
    let mut payload: Vec<u8> = Vec::new();
    let mut pos = 0;

    loop {
        // need at least `\n#X`
        if buf.len() < pos + 3 {
            return Ok(None);
        }
        if buf[pos] != b'\n' || buf[pos + 1] != b'#' {
            return Err(String::from("bad chunk header"));
        }
        pos += 2;

        if buf[pos] == b'#' {
            if buf.len() < pos + 2 {
                return Ok(None);
            }
            if buf[pos + 1] != b'\n' {
                return Err(String::from("bad message terminator"));
            }
            pos += 2;
            let msg =
                str::from_utf8(&payload).map_err(|_| String::from("message is not utf8"))?;
            return Ok(Some((msg.trim().to_string(), pos)));
        }

        let mut len: usize = 0;
        let mut digits = 0;
        loop {
            if buf.len() <= pos {
                return Ok(None);
            }
            let b = buf[pos];
            if b == b'\n' {
                pos += 1;
                break;
            }
            if !b.is_ascii_digit() {
                return Err(String::from("bad chunk length"));
            }
            len = len.checked_mul(10).and_then(|l| l.checked_add((b - b'0') as usize)).ok_or(
                String::from("chunk length overflow"),
            )?;
            digits += 1;
            if digits > 10 {
                return Err(String::from("chunk length too long"));
            }
            pos += 1;
        }
        if digits == 0 || len == 0 {
            return Err(String::from("bad chunk length"));
        }

        if buf.len() < pos + len {
            return Ok(None);
        }
        payload.extend_from_slice(&buf[pos..pos + len]);
        pos += len;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eom_extraction() {
        assert_eq!(extract_eom(b"<hello/>").expect("no error"), None);
        let (msg, consumed) = extract_eom(b"<hello/>]]>]]>rest")
            .expect("no error")
            .expect("complete message");
        assert_eq!(msg, "<hello/>");
        assert_eq!(consumed, 8 + 6);
    }

    #[test]
    fn chunked_extraction() {
        // incomplete in various ways
        assert_eq!(extract_chunked(b"").expect("no error"), None);
        assert_eq!(extract_chunked(b"\n#4\n<a").expect("no error"), None);
        assert_eq!(extract_chunked(b"\n#4\n<a/>").expect("no error"), None);
        assert_eq!(extract_chunked(b"\n#4\n<a/>\n#").expect("no error"), None);

        let (msg, consumed) = extract_chunked(b"\n#4\n<a/>\n##\nmore")
            .expect("no error")
            .expect("complete message");
        assert_eq!(msg, "<a/>");
        assert_eq!(consumed, b"\n#4\n<a/>\n##\n".len());

        // chunks concatenate
        let (msg, _) = extract_chunked(b"\n#2\n<a\n#2\n/>\n##\n")
            .expect("no error")
            .expect("complete message");
        assert_eq!(msg, "<a/>");
    }

    #[test]
    fn chunked_rejects_garbage() {
        assert!(extract_chunked(b"xx#4\n<a/>\n##\n").is_err());
        assert!(extract_chunked(b"\n#x\n<a/>\n##\n").is_err());
        assert!(extract_chunked(b"\n#0\n\n##\n").is_err());
        assert!(extract_chunked(b"\n##x").is_err());
    }
}
