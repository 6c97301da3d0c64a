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

//! The per-request error sink.
//!
//! NETCONF failures surface deep below the handler that asked for
//! them: the client layer's error constructors record transport and
//! protocol failures (hello exchanges included) here, and the
//! executor records each server-reported `<rpc-error>` message. The
//! handler folds the accumulated list into its reply. Workers reset
//! the sink at the start of every request, so a populated sink always
//! belongs to the request currently being served on this thread.

use std::cell::RefCell;

thread_local! {
    static ERRORS: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Clear the sink. Called once per request before dispatch.
pub fn reset() {
    ERRORS.with(|e| *e.borrow_mut() = None);
}

/// Append one error message.
pub fn record<S: Into<String>>(message: S) {
    ERRORS.with(|e| {
        e.borrow_mut().get_or_insert_with(Vec::new).push(message.into());
    });
}

/// Take the accumulated messages, leaving the sink empty. Returns
/// `None` when nothing was recorded since the last reset.
pub fn take() -> Option<Vec<String>> {
    ERRORS.with(|e| e.borrow_mut().take())
}
