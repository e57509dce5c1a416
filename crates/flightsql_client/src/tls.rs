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

use std::path::{Path, PathBuf};

use snafu::prelude::*;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};

use crate::config::ClientConfig;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to read the TLS cert file {}: {source}", path.display()))]
    FailedToReadCertificate {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("Invalid endpoint {uri}: {source}"))]
    InvalidEndpoint {
        source: tonic::transport::Error,
        uri: String,
    },

    #[snafu(display("Unable to configure TLS: {source}"))]
    UnableToConfigureTls { source: tonic::transport::Error },

    #[snafu(display("Unable to connect to server with uri {uri}: {source}"))]
    UnableToConnectToEndpoint {
        source: tonic::transport::Error,
        uri: String,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reads a PEM encoded certificate, such as the self-signed certificate of a Datalayers server.
///
/// # Errors
///
/// Will return `Err` if the file cannot be read.
pub fn load_tls_certificate(path: &Path) -> Result<Certificate> {
    let pem = std::fs::read(path).context(FailedToReadCertificateSnafu { path })?;
    Ok(Certificate::from_pem(pem))
}

/// Opens a channel to the server described by `config`.
///
/// # Errors
///
/// Will return `Err` if:
///    - The certificate could not be loaded.
///    - It couldn't connect to the endpoint.
pub async fn new_flight_channel(config: &ClientConfig) -> Result<Channel> {
    new_flight_channel_with_uri(config, &config.uri(), Some(config.domain_name())).await
}

/// Opens a channel to `endpoint_str` with the timeouts and certificates of `config`.
///
/// Flight locations (`grpc+tls://`, `grpc+tcp://`, `grpc://`) are accepted next to plain
/// `http://` and `https://` URIs. When `tls_domain_name` is `None` the host of the URI is verified.
///
/// # Errors
///
/// Will return `Err` if:
///    - The certificate could not be loaded.
///    - It couldn't connect to the endpoint.
pub async fn new_flight_channel_with_uri(
    config: &ClientConfig,
    endpoint_str: &str,
    tls_domain_name: Option<&str>,
) -> Result<Channel> {
    let (uri, use_tls) = normalize_uri(endpoint_str, config.is_tls());

    let mut endpoint = Endpoint::from_shared(uri.clone())
        .context(InvalidEndpointSnafu { uri: &uri })?
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .keep_alive_while_idle(true);

    if use_tls {
        let mut tls_config = match &config.tls_cert {
            Some(path) => ClientTlsConfig::new().ca_certificate(load_tls_certificate(path)?),
            None => ClientTlsConfig::new().with_native_roots(),
        };
        if let Some(domain_name) = tls_domain_name {
            tls_config = tls_config.domain_name(domain_name);
        }
        endpoint = endpoint
            .tls_config(tls_config)
            .context(UnableToConfigureTlsSnafu)?;
    }

    tracing::debug!("Connecting to {uri}");
    endpoint
        .connect()
        .await
        .context(UnableToConnectToEndpointSnafu { uri })
}

/// Maps a Flight location onto the `http(s)` scheme understood by tonic.
/// URIs without a scheme take `http` or `https` depending on `default_tls`.
fn normalize_uri(endpoint_str: &str, default_tls: bool) -> (String, bool) {
    let tls_prefixes = ["https://", "grpc+tls://"];
    for prefix in &tls_prefixes {
        if let Some(rest) = endpoint_str.strip_prefix(prefix) {
            return (format!("https://{rest}"), true);
        }
    }

    let plain_prefixes = ["http://", "grpc+tcp://", "grpc://"];
    for prefix in &plain_prefixes {
        if let Some(rest) = endpoint_str.strip_prefix(prefix) {
            return (format!("http://{rest}"), false);
        }
    }

    let scheme = if default_tls { "https" } else { "http" };
    (format!("{scheme}://{endpoint_str}"), default_tls)
}
