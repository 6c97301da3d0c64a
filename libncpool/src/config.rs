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

use std::{fs, time};

use anyhow::Context;
use serde_derive::Deserialize;
use tracing::{info, instrument};

use crate::consts;

#[instrument(skip_all)]
pub fn read_config(config_file: &Option<String>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    if let Some(config_path) = config_file {
        info!("parsing explicitly passed in config ({})", config_path);
        let config_str = fs::read_to_string(config_path).context("reading config toml")?;
        config = toml::from_str(&config_str).context("parsing config file")?;
    }

    Ok(config)
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct Config {
    /// User name the socket file should be chowned to after binding.
    /// Left alone when unset.
    pub socket_user: Option<String>,

    /// Group name the socket file should be chgrped to after binding.
    /// Left alone when unset.
    pub socket_group: Option<String>,

    /// Octal mode for the socket file. Front ends are only gated by
    /// filesystem permissions, so the default is wide open (0666).
    pub socket_mode: Option<u32>,

    /// Seconds a session may sit without completing an RPC before the
    /// sweeper evicts it. Defaults to one hour.
    pub idle_timeout_secs: Option<u64>,

    /// Milliseconds to wait for an rpc-reply. Defaults to 5000.
    pub rpc_timeout_ms: Option<u64>,
}

impl Config {
    pub fn idle_timeout(&self) -> time::Duration {
        self.idle_timeout_secs.map(time::Duration::from_secs).unwrap_or(consts::IDLE_TIMEOUT)
    }

    pub fn rpc_timeout(&self) -> time::Duration {
        self.rpc_timeout_ms.map(time::Duration::from_millis).unwrap_or(consts::RPC_TIMEOUT)
    }

    pub fn socket_mode(&self) -> u32 {
        self.socket_mode.unwrap_or(0o666)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.idle_timeout(), time::Duration::from_secs(3600));
        assert_eq!(config.rpc_timeout(), time::Duration::from_millis(5000));
        assert_eq!(config.socket_mode(), 0o666);
    }

    #[test]
    fn parse_toml() {
        let config: Config = toml::from_str(
            r#"
            socket_user = "netconf"
            socket_group = "netconf"
            idle_timeout_secs = 120
            "#,
        )
        .expect("config to parse");
        assert_eq!(config.socket_user.as_deref(), Some("netconf"));
        assert_eq!(config.idle_timeout(), time::Duration::from_secs(120));
        assert_eq!(config.rpc_timeout(), time::Duration::from_millis(5000));
    }
}
