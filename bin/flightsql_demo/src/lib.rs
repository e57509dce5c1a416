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

#![allow(clippy::missing_errors_doc)]

use std::path::PathBuf;

use clap::Parser;
use flightsql_client::{config, Client, ClientConfig};
use secrecy::SecretString;
use snafu::prelude::*;

pub mod bindings;
mod demo;

/// Database created and used by the demo when none is configured.
pub const DEFAULT_DATABASE: &str = "rust";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to load config: {source}"))]
    UnableToLoadConfig { source: config::Error },

    #[snafu(display("Unable to connect to Datalayers: {source}"))]
    UnableToConnect { source: flightsql_client::Error },

    #[snafu(display("Failed to {step}: {source}"))]
    DemoStepFailed {
        step: String,
        source: flightsql_client::Error,
    },

    #[snafu(display("Invalid timestamp {datetime}"))]
    InvalidTimestamp { datetime: String },

    #[snafu(display("Unable to build parameter binding: {source}"))]
    UnableToBuildBinding { source: arrow::error::ArrowError },

    #[snafu(display("REPL error: {message}"))]
    Repl { message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Parser, Debug, Default)]
#[clap(about = "Datalayers Flight SQL demo")]
pub struct Args {
    /// Print the version and exit.
    #[arg(long)]
    pub version: bool,

    /// Start an interactive SQL shell instead of running the demo.
    #[arg(long)]
    pub repl: bool,

    /// YAML file holding the client config. Flags given on the command line take precedence.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long, help_heading = "Connection")]
    pub host: Option<String>,

    #[arg(long, help_heading = "Connection")]
    pub port: Option<u16>,

    #[arg(long, help_heading = "Connection")]
    pub username: Option<String>,

    #[arg(
        long,
        env = "FLIGHTSQL_PASSWORD",
        hide_env_values = true,
        help_heading = "Connection"
    )]
    pub password: Option<String>,

    /// PEM certificate trusted as the server's root CA. Enables TLS.
    #[arg(long, env = "TLS_CERT", value_name = "FILE", help_heading = "TLS")]
    pub tls_cert: Option<PathBuf>,

    /// Enable TLS against the platform's native root certificates.
    #[arg(long, help_heading = "TLS")]
    pub tls: bool,

    /// Name verified against the server certificate, defaults to the host.
    #[arg(long, help_heading = "TLS")]
    pub tls_domain_name: Option<String>,

    /// Database used by the demo, or attached to every query in the REPL.
    #[arg(long)]
    pub database: Option<String>,
}

impl Args {
    /// Builds the client config from the config file, if any, overridden by the flags.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_yaml_file(path).context(UnableToLoadConfigSnafu)?,
            None => ClientConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(username) = &self.username {
            config.username.clone_from(username);
        }
        if let Some(password) = &self.password {
            config.password = SecretString::new(password.clone());
        }
        if let Some(tls_cert) = &self.tls_cert {
            config.tls_cert = Some(tls_cert.clone());
        }
        if self.tls {
            config.tls = true;
        }
        if let Some(domain_name) = &self.tls_domain_name {
            config.tls_domain_name = Some(domain_name.clone());
        }
        if let Some(database) = &self.database {
            config.database = Some(database.clone());
        }

        Ok(config)
    }
}

/// Runs the scripted demo against the configured server.
pub async fn run(args: Args) -> Result<()> {
    let mut config = args.client_config()?;

    // The database does not exist before the demo creates it, so it is attached after.
    let database = config
        .database
        .take()
        .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

    let mut client = Client::try_new(&config)
        .await
        .context(UnableToConnectSnafu)?;
    tracing::info!("Connected to {} as {}", config.uri(), config.username);

    demo::run(&mut client, &database).await
}

/// Connects and hands the client over to the interactive shell.
pub async fn run_repl(args: Args) -> Result<()> {
    let config = args.client_config()?;
    let client = Client::try_new(&config)
        .await
        .context(UnableToConnectSnafu)?;
    tracing::info!("Connected to {} as {}", config.uri(), config.username);

    flightrepl::run(client).await.map_err(|e| Error::Repl {
        message: e.to_string(),
    })
}
