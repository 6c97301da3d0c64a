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

use anyhow::{anyhow, Context};
use nix::unistd;

/// Resolve a user name to a uid for the socket chown.
pub fn uid_for_name(name: &str) -> anyhow::Result<unistd::Uid> {
    let user = unistd::User::from_name(name)
        .context("looking up user")?
        .ok_or(anyhow!("no such user: {}", name))?;
    Ok(user.uid)
}

/// Resolve a group name to a gid for the socket chown.
pub fn gid_for_name(name: &str) -> anyhow::Result<unistd::Gid> {
    let group = unistd::Group::from_name(name)
        .context("looking up group")?
        .ok_or(anyhow!("no such group: {}", name))?;
    Ok(group.gid)
}
