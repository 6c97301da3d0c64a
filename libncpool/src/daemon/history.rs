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

//! The per-thread notification history accumulator, the replay
//! counterpart of the error sink. Cleared before each collection and
//! drained into the reply afterwards.

use std::cell::RefCell;

use ncpool_protocol::Notification;

thread_local! {
    static HISTORY: RefCell<Vec<Notification>> = const { RefCell::new(Vec::new()) };
}

pub fn reset() {
    HISTORY.with(|h| h.borrow_mut().clear());
}

pub fn record(eventtime: i64, content: String) {
    HISTORY.with(|h| h.borrow_mut().push(Notification { eventtime, content }));
}

pub fn take() -> Vec<Notification> {
    HISTORY.with(|h| std::mem::take(&mut *h.borrow_mut()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn collects_and_drains() {
        reset();
        record(10, String::from("<a/>"));
        record(20, String::from("<b/>"));
        let got = take();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].eventtime, 10);
        assert_eq!(got[1].content, "<b/>");
        assert!(take().is_empty());
    }
}
