/*
Copyright 2024 The Spice.ai OSS Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::{fs::File, path::Path, path::PathBuf, time::Duration};

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use snafu::prelude::*;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8360;
pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "public";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to open config file {}: {source}", path.display()))]
    UnableToOpenConfigFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("Unable to parse client config: {source}"))]
    UnableToParseConfig { source: serde_yaml::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The configuration for a client connecting to the Datalayers server via the Arrow Flight SQL protocol.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// The hostname of the Datalayers database server.
    pub host: String,
    /// The port number on which the Datalayers database server is listening.
    pub port: u16,
    /// The username for authentication when connecting to the database.
    pub username: String,
    /// The password for authentication when connecting to the database.
    pub password: SecretString,
    /// The optional PEM certificate used to verify the server.
    /// Datalayers self-signs its certificate, so the client trusts it as its root CA.
    /// Setting it enables TLS.
    pub tls_cert: Option<PathBuf>,
    /// Enables TLS against the platform's native roots when no certificate is given.
    pub tls: bool,
    /// Overrides the name checked against the server certificate.
    pub tls_domain_name: Option<String>,
    /// The database context attached to every request.
    pub database: Option<String>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: DEFAULT_USERNAME.to_string(),
            password: SecretString::new(DEFAULT_PASSWORD.to_string()),
            tls_cert: None,
            tls: false,
            tls_domain_name: None,
            database: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: SecretString::new(password.into()),
            ..Self::default()
        }
    }

    /// Loads a config from a YAML file. Keys missing from the file take their default values.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).context(UnableToOpenConfigFileSnafu { path })?;
        serde_yaml::from_reader(file).context(UnableToParseConfigSnafu)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context(UnableToParseConfigSnafu)
    }

    #[must_use]
    pub fn with_tls_cert(mut self, tls_cert: impl Into<PathBuf>) -> Self {
        self.tls_cert = Some(tls_cert.into());
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn with_tls_domain_name(mut self, domain_name: impl Into<String>) -> Self {
        self.tls_domain_name = Some(domain_name.into());
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.tls_cert.is_some() || self.tls
    }

    #[must_use]
    pub fn uri(&self) -> String {
        let scheme = if self.is_tls() { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn domain_name(&self) -> &str {
        self.tls_domain_name.as_deref().unwrap_or(&self.host)
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    fundu::parse_duration(&value)
        .map_err(|e| serde::de::Error::custom(format!("invalid duration '{value}': {e}")))
}
