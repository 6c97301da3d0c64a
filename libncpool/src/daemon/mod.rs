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

use std::{
    fs,
    os::unix::fs::PermissionsExt as _,
    os::unix::net::UnixListener,
    path::{Path, PathBuf},
    sync::{atomic::AtomicBool, Arc},
};

use anyhow::Context;
use nix::unistd;
use tracing::{info, instrument, warn};

use crate::{config, user};

mod executor;
mod handlers;
mod history;
mod registry;
mod server;
mod signals;

#[instrument(skip_all)]
pub fn run(config: config::Config, socket: PathBuf) -> anyhow::Result<()> {
    info!("\n\n======================== STARTING DAEMON ============================\n\n");

    // a previous unclean shutdown may have left the socket file behind
    let _ = fs::remove_file(&socket);

    let listener = UnixListener::bind(&socket).context("binding to socket")?;
    fs::set_permissions(&socket, fs::Permissions::from_mode(config.socket_mode()))
        .context("setting socket permissions")?;
    chown_socket(&config, &socket);

    let terminate = Arc::new(AtomicBool::new(false));
    signals::register(&terminate).context("registering signal handlers")?;

    let server = server::Server::new(config, Arc::clone(&terminate));
    let res = server::Server::serve(server, listener);

    info!("cleaning up socket file");
    if let Err(e) = fs::remove_file(&socket).context("cleaning up socket on exit") {
        warn!("{:#}", e);
    }

    res
}

/// Hand the socket file to the configured owner. Failures here only
/// degrade who can dial in, so they are logged rather than fatal.
fn chown_socket(config: &config::Config, socket: &Path) {
    let uid = config.socket_user.as_deref().and_then(|name| match user::uid_for_name(name) {
        Ok(uid) => Some(uid),
        Err(e) => {
            warn!("resolving socket user: {:#}", e);
            None
        }
    });
    let gid = config.socket_group.as_deref().and_then(|name| match user::gid_for_name(name) {
        Ok(gid) => Some(gid),
        Err(e) => {
            warn!("resolving socket group: {:#}", e);
            None
        }
    });

    if uid.is_none() && gid.is_none() {
        return;
    }
    if let Err(e) = unistd::chown(socket, uid, gid) {
        warn!("chown on socket file failed: {}", e);
    }
}
