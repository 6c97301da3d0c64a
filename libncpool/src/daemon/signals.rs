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

use std::sync::{atomic::AtomicBool, Arc};

use signal_hook::{consts::TERM_SIGNALS, flag};
use tracing::info;

/// Arrange for SIGINT/SIGTERM to set the shared termination flag.
/// The accept loop and every worker observe the flag on their next
/// poll cycle, so shutdown is cooperative rather than immediate.
pub fn register(terminate: &Arc<AtomicBool>) -> anyhow::Result<()> {
    info!("registering termination signal handlers");

    for sig in TERM_SIGNALS {
        // When terminated by a second term signal, exit with exit code 1.
        // This will do nothing the first time (because terminate is false).
        flag::register_conditional_shutdown(*sig, 1, Arc::clone(terminate))?;
        // But this will "arm" the above for the second time, by setting it
        // to true. The order of registering these is important, if you put
        // this one first, it will first arm and then terminate ‒ all in
        // the first round.
        flag::register(*sig, Arc::clone(terminate))?;
    }

    Ok(())
}
