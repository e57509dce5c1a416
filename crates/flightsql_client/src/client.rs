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

use arrow::record_batch::RecordBatch;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::sql::client::{FlightSqlServiceClient, PreparedStatement};
use arrow_flight::sql::CommandGetTables;
use arrow_flight::{FlightEndpoint, FlightInfo, Ticket};
use futures::TryStreamExt;
use secrecy::ExposeSecret;
use snafu::prelude::*;
use tonic::transport::Channel;

use crate::config::ClientConfig;
use crate::message::{filter_message, server_message};
use crate::{tls, Error, NoEndpointsFoundSnafu, NoTicketInEndpointSnafu, Result};
use crate::{UnableToConnectToServerSnafu, UnableToPerformHandshakeSnafu};

/// The gRPC header Datalayers reads the database context from.
pub const DATABASE_HEADER: &str = "database";

/// Location URI meaning "redeem the ticket on the connection that returned it".
const REUSE_CONNECTION_LOCATION: &str = "arrow-flight-reuse-connection://?";

/// A Flight SQL client connected and authenticated against a Datalayers server.
#[derive(Debug, Clone)]
pub struct Client {
    inner: FlightSqlServiceClient<Channel>,
    config: ClientConfig,
    database: Option<String>,
}

impl Client {
    /// Connects to the server and performs the basic-auth handshake.
    ///
    /// The bearer token returned by the server is kept by the inner client and attached to
    /// every subsequent request.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable or rejects the credentials.
    pub async fn try_new(config: &ClientConfig) -> Result<Self> {
        let channel = tls::new_flight_channel(config)
            .await
            .context(UnableToConnectToServerSnafu)?;
        let mut inner = new_flight_sql_client(channel, config.max_message_size);

        inner
            .handshake(&config.username, config.password.expose_secret())
            .await
            .map_err(|e| {
                UnableToPerformHandshakeSnafu {
                    message: server_message(&e),
                }
                .build()
            })?;
        tracing::debug!(
            "Authenticated against {} as {}",
            config.uri(),
            config.username
        );

        let mut client = Self {
            inner,
            config: config.clone(),
            database: None,
        };
        if let Some(database) = &config.database {
            client.use_database(database);
        }

        Ok(client)
    }

    /// Sets the database header for every outgoing request, replacing the previous one.
    ///
    /// The header is optional when statements qualify their tables with the database name.
    /// Prepared statements capture the headers at the time they are created.
    pub fn use_database(&mut self, database: &str) {
        self.inner.set_header(DATABASE_HEADER, database);
        self.database = Some(database.to_string());
    }

    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Executes a statement and returns the result set.
    ///
    /// DDL and DML statements return their affected rows as a single row result,
    /// see [`crate::results::affected_rows`].
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the statement or the results cannot be retrieved.
    pub async fn execute(&mut self, sql: &str) -> Result<Vec<RecordBatch>> {
        tracing::debug!("Executing: {sql}");
        let flight_info = self
            .inner
            .execute(sql.to_string(), None)
            .await
            .map_err(|e| Error::UnableToQuery {
                message: server_message(&e),
            })?;
        self.fetch(flight_info).await
    }

    /// Executes a DML statement and returns the affected rows reported by the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the statement.
    pub async fn execute_update(&mut self, sql: &str) -> Result<i64> {
        tracing::debug!("Executing update: {sql}");
        self.inner
            .execute_update(sql.to_string(), None)
            .await
            .map_err(|e| Error::UnableToQuery {
                message: server_message(&e),
            })
    }

    /// Creates a prepared statement on the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot prepare the statement.
    pub async fn prepare(&mut self, sql: &str) -> Result<PreparedStatement<Channel>> {
        tracing::debug!("Preparing: {sql}");
        self.inner
            .prepare(sql.to_string(), None)
            .await
            .map_err(|e| Error::UnableToPrepare {
                message: server_message(&e),
            })
    }

    /// Binds `binding` to the prepared statement, executes it and returns the result set.
    ///
    /// Each row of `binding` is one set of parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding is rejected or the execution fails.
    pub async fn execute_prepared(
        &mut self,
        prepared_stmt: &mut PreparedStatement<Channel>,
        binding: RecordBatch,
    ) -> Result<Vec<RecordBatch>> {
        bind(prepared_stmt, binding)?;
        let flight_info = prepared_stmt
            .execute()
            .await
            .map_err(|e| Error::UnableToQuery {
                message: server_message(&e),
            })?;
        self.fetch(flight_info).await
    }

    /// Binds `binding` to the prepared statement and executes it as an update.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding is rejected or the execution fails.
    pub async fn execute_prepared_update(
        &mut self,
        prepared_stmt: &mut PreparedStatement<Channel>,
        binding: RecordBatch,
    ) -> Result<i64> {
        bind(prepared_stmt, binding)?;
        prepared_stmt
            .execute_update()
            .await
            .map_err(|e| Error::UnableToQuery {
                message: server_message(&e),
            })
    }

    /// Closes the prepared statement so the server releases its resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to close the statement.
    pub async fn close_prepared(&mut self, prepared_stmt: PreparedStatement<Channel>) -> Result<()> {
        prepared_stmt
            .close()
            .await
            .map_err(|e| Error::UnableToClosePreparedStatement {
                message: server_message(&e),
            })
    }

    /// Lists the catalogs known to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn catalogs(&mut self) -> Result<Vec<RecordBatch>> {
        let flight_info = self
            .inner
            .get_catalogs()
            .await
            .map_err(|e| Error::UnableToQuery {
                message: server_message(&e),
            })?;
        self.fetch(flight_info).await
    }

    /// Lists the tables matching the given filters. Filters use SQL `LIKE` patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn tables(
        &mut self,
        catalog: Option<String>,
        db_schema_filter_pattern: Option<String>,
        table_name_filter_pattern: Option<String>,
    ) -> Result<Vec<RecordBatch>> {
        let request = CommandGetTables {
            catalog,
            db_schema_filter_pattern,
            table_name_filter_pattern,
            table_types: vec![],
            include_schema: false,
        };
        let flight_info = self
            .inner
            .get_tables(request)
            .await
            .map_err(|e| Error::UnableToQuery {
                message: server_message(&e),
            })?;
        self.fetch(flight_info).await
    }

    /// Redeems the ticket of every endpoint in `flight_info`, in order.
    async fn fetch(&mut self, flight_info: FlightInfo) -> Result<Vec<RecordBatch>> {
        ensure!(!flight_info.endpoint.is_empty(), NoEndpointsFoundSnafu);

        let mut batches = vec![];
        for endpoint in flight_info.endpoint {
            let FlightEndpoint {
                ticket, location, ..
            } = endpoint;
            let ticket = ticket.context(NoTicketInEndpointSnafu)?;

            let remote = location
                .iter()
                .map(|location| location.uri.as_str())
                .find(|uri| !uri.is_empty() && *uri != REUSE_CONNECTION_LOCATION);
            match remote {
                None => batches.extend(do_get(&mut self.inner, ticket).await?),
                Some(uri) => batches.extend(self.do_get_at(uri, ticket).await?),
            }
        }

        tracing::trace!("Fetched {} record batches", batches.len());
        Ok(batches)
    }

    /// Redeems a ticket on another server, carrying over the token and database context.
    async fn do_get_at(&self, uri: &str, ticket: Ticket) -> Result<Vec<RecordBatch>> {
        tracing::debug!("Redeeming ticket at {uri}");
        let channel = tls::new_flight_channel_with_uri(
            &self.config,
            uri,
            self.config.tls_domain_name.as_deref(),
        )
        .await
        .context(UnableToConnectToServerSnafu)?;

        let mut client = new_flight_sql_client(channel, self.config.max_message_size);
        if let Some(token) = self.inner.token() {
            client.set_token(token.clone());
        }
        if let Some(database) = &self.database {
            client.set_header(DATABASE_HEADER, database);
        }

        do_get(&mut client, ticket).await
    }
}

/// Builds the Flight SQL client around a manually constructed inner client, since
/// `FlightSqlServiceClient::new` offers no way to raise the message size limits.
fn new_flight_sql_client(
    channel: Channel,
    max_message_size: usize,
) -> FlightSqlServiceClient<Channel> {
    FlightSqlServiceClient::new_from_inner(
        FlightServiceClient::new(channel)
            .max_encoding_message_size(max_message_size)
            .max_decoding_message_size(max_message_size),
    )
}

fn bind(prepared_stmt: &mut PreparedStatement<Channel>, binding: RecordBatch) -> Result<()> {
    prepared_stmt
        .set_parameters(binding)
        .map_err(|e| Error::UnableToBindParameters {
            message: e.to_string(),
        })
}

async fn do_get(
    client: &mut FlightSqlServiceClient<Channel>,
    ticket: Ticket,
) -> Result<Vec<RecordBatch>> {
    let stream = client
        .do_get(ticket)
        .await
        .map_err(|e| Error::UnableToRetrieveResults {
            message: server_message(&e),
        })?;

    stream
        .try_collect::<Vec<_>>()
        .await
        .map_err(|e| Error::UnableToRetrieveResults {
            message: filter_message(&e.to_string()),
        })
}
