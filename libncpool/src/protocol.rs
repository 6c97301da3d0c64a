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

//! The framing used on the client socket.
//!
//! A message is a sequence of chunks followed by a terminator,
//! mirroring NETCONF 1.1 chunked framing: each chunk is `\n#` then a
//! decimal byte count then `\n` then that many payload bytes, and the
//! message ends with `\n##\n`. The concatenated chunk payloads form
//! one JSON document.

use std::{
    io::{Read, Write},
    str,
};

use anyhow::{anyhow, Context};
use serde::{de::DeserializeOwned, Serialize};

use crate::consts;

fn read_byte<R: Read>(r: &mut R) -> anyhow::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).context("reading framing byte")?;
    Ok(buf[0])
}

fn expect_byte<R: Read>(r: &mut R, want: u8) -> anyhow::Result<()> {
    let got = read_byte(r)?;
    if got != want {
        return Err(anyhow!("unexpected framing byte {:#04x}, want {:#04x}", got, want));
    }
    Ok(())
}

/// Read one framed message, returning the concatenated chunk
/// payloads. Any framing violation is an error and the caller is
/// expected to hang up on the client.
pub fn read_frame<R: Read>(r: &mut R) -> anyhow::Result<String> {
    let mut payload: Vec<u8> = Vec::new();

    loop {
        expect_byte(r, b'\n')?;
        expect_byte(r, b'#')?;

        let first = read_byte(r)?;
        if first == b'#' {
            // the `\n##\n` terminator
            expect_byte(r, b'\n')?;
            break;
        }
        if !first.is_ascii_digit() {
            return Err(anyhow!("invalid chunk length byte {:#04x}", first));
        }

        let mut digits = vec![first];
        loop {
            let b = read_byte(r)?;
            if b == b'\n' {
                break;
            }
            if !b.is_ascii_digit() {
                return Err(anyhow!("invalid chunk length byte {:#04x}", b));
            }
            digits.push(b);
            if digits.len() > consts::FRAME_LEN_MAX_DIGITS {
                return Err(anyhow!(
                    "chunk length exceeds {} digits",
                    consts::FRAME_LEN_MAX_DIGITS
                ));
            }
        }

        // Safety belt for the parse: digits only ever holds ascii.
        let len: usize = str::from_utf8(&digits)
            .expect("length digits to be ascii")
            .parse()
            .context("parsing chunk length")?;
        if len == 0 {
            return Err(anyhow!("zero length chunk"));
        }

        let start = payload.len();
        payload.resize(start + len, 0);
        r.read_exact(&mut payload[start..]).context("reading chunk payload")?;
    }

    if payload.is_empty() {
        return Err(anyhow!("message with no chunks"));
    }
    String::from_utf8(payload).context("chunk payload is not utf8")
}

/// Frame a message body and emit it as a single write.
pub fn write_frame<W: Write>(w: &mut W, body: &str) -> anyhow::Result<()> {
    let mut buf = Vec::with_capacity(body.len() + 16);
    buf.extend_from_slice(format!("\n#{}\n", body.len()).as_bytes());
    buf.extend_from_slice(body.as_bytes());
    buf.extend_from_slice(b"\n##\n");
    w.write_all(&buf).context("writing framed message")?;
    w.flush().context("flushing framed message")?;
    Ok(())
}

/// The centralized encoding function that should be used for all
/// messages sent to a client.
pub fn encode_to<T, W>(d: &T, w: &mut W) -> anyhow::Result<()>
where
    T: Serialize,
    W: Write,
{
    let body = serde_json::to_string(d).context("serializing message")?;
    write_frame(w, &body)
}

/// The centralized decoding function for messages received from a
/// client. Workers that need to tell framing errors from JSON errors
/// apart use [`read_frame`] directly instead.
pub fn decode_from<T, R>(r: &mut R) -> anyhow::Result<T>
where
    T: DeserializeOwned,
    R: Read,
{
    let body = read_frame(r)?;
    let d = serde_json::from_str(&body).context("deserializing message")?;
    Ok(d)
}
