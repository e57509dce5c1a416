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

#![allow(clippy::module_name_repetitions)]

use snafu::prelude::*;

pub mod client;
pub mod config;
pub mod message;
pub mod results;
pub mod tls;

pub use arrow_flight::sql::client::PreparedStatement;
pub use client::Client;
pub use config::ClientConfig;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to connect to server: {source}"))]
    UnableToConnectToServer { source: tls::Error },

    #[snafu(display("Unable to perform handshake: {message}"))]
    UnableToPerformHandshake { message: String },

    #[snafu(display("Unable to execute query: {message}"))]
    UnableToQuery { message: String },

    #[snafu(display("Unable to prepare statement: {message}"))]
    UnableToPrepare { message: String },

    #[snafu(display("Unable to bind parameters to the prepared statement: {message}"))]
    UnableToBindParameters { message: String },

    #[snafu(display("Unable to retrieve results: {message}"))]
    UnableToRetrieveResults { message: String },

    #[snafu(display("Unable to close the prepared statement: {message}"))]
    UnableToClosePreparedStatement { message: String },

    #[snafu(display("No endpoints found"))]
    NoEndpointsFound,

    #[snafu(display("No ticket in endpoint"))]
    NoTicketInEndpoint,

    #[snafu(display("Invalid affected rows result: {reason}"))]
    InvalidAffectedRows { reason: String },

    #[snafu(display("Unable to format results: {source}"))]
    UnableToFormatResults { source: arrow::error::ArrowError },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
