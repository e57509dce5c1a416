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

//! An in-process Flight SQL server imitating the Datalayers responses the client relies on.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use arrow::array::{
    ArrayRef, AsArray, Float32Array, Int32Array, Int64Array, Int8Array, StringArray,
    TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Int32Type, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::error::FlightError;
use arrow_flight::flight_service_server::{FlightService, FlightServiceServer};
use arrow_flight::sql::server::{FlightSqlService, PeekableFlightDataStream};
use arrow_flight::sql::{
    ActionClosePreparedStatementRequest, ActionCreatePreparedStatementRequest,
    ActionCreatePreparedStatementResult, CommandGetCatalogs, CommandGetTables,
    CommandPreparedStatementQuery, CommandPreparedStatementUpdate, CommandStatementQuery,
    CommandStatementUpdate, DoPutPreparedStatementResult, ProstMessageExt, SqlInfo,
    TicketStatementQuery,
};
use arrow_flight::{
    Action, FlightDescriptor, FlightEndpoint, FlightInfo, HandshakeRequest, HandshakeResponse,
    Ticket,
};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use futures::{stream, Stream, TryStreamExt};
use prost::Message;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::metadata::MetadataValue;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status, Streaming};

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "public";
const TOKEN: &str = "a6f3c3e2-token";

/// Answered with two endpoints carrying the same ticket.
pub const SPLIT_QUERY: &str = "SELECT * FROM rust.demo_split";
/// Answered with an endpoint located on the configured remote server.
pub const REMOTE_QUERY: &str = "SELECT * FROM rust.demo_remote";
pub const MISSING_TABLE_QUERY: &str = "SELECT * FROM rust.missing_table";

pub const DEMO_TABLES: [&str; 2] = ["demo", "sx1"];

/// (ts, sid, value, flag) as inserted by the demo, 2024-09-01T10:00:00+08:00 onwards.
pub const DEMO_ROWS: [(i64, i32, f32, i8); 5] = [
    (1_725_156_000_000, 1, 12.5, 0),
    (1_725_156_300_000, 2, 15.3, 1),
    (1_725_156_600_000, 3, 9.8, 0),
    (1_725_156_900_000, 4, 22.1, 1),
    (1_725_157_200_000, 5, 30.0, 0),
];

#[derive(Debug, Default)]
pub struct ServerState {
    /// The `database` header of every authorized request, in arrival order.
    pub databases: Vec<Option<String>>,
    pub statements: Vec<String>,
    pub bindings: HashMap<Vec<u8>, RecordBatch>,
    pub closed: Vec<String>,
}

pub struct TestServer {
    pub addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
}

impl TestServer {
    pub fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().expect("server state lock")
    }
}

/// Starts a server on an ephemeral port. Tickets for [`REMOTE_QUERY`] point at `remote_location`.
pub async fn start(remote_location: Option<String>) -> anyhow::Result<TestServer> {
    serve(remote_location, None).await
}

/// Starts a server speaking TLS with the PEM encoded certificate chain and key.
pub async fn start_tls(cert_pem: &str, key_pem: &str) -> anyhow::Result<TestServer> {
    let tls_config = ServerTlsConfig::new().identity(Identity::from_pem(cert_pem, key_pem));
    serve(None, Some(tls_config)).await
}

async fn serve(
    remote_location: Option<String>,
    tls_config: Option<ServerTlsConfig>,
) -> anyhow::Result<TestServer> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = Arc::new(Mutex::new(ServerState::default()));

    let service = MockDatalayers {
        state: Arc::clone(&state),
        remote_location,
    };
    let mut builder = Server::builder();
    if let Some(tls_config) = tls_config {
        builder = builder.tls_config(tls_config)?;
    }
    tokio::spawn(async move {
        if let Err(e) = builder
            .add_service(FlightServiceServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
        {
            tracing::error!("Test server error: {e}");
        }
    });

    Ok(TestServer { addr, state })
}

#[derive(Clone)]
struct MockDatalayers {
    state: Arc<Mutex<ServerState>>,
    remote_location: Option<String>,
}

impl MockDatalayers {
    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().expect("server state lock")
    }

    fn authorize<T>(&self, request: &Request<T>) -> Result<(), Status> {
        let metadata = request.metadata();
        let authorization = metadata
            .get("authorization")
            .ok_or_else(|| Status::unauthenticated("No authorization header"))?
            .to_str()
            .map_err(|e| Status::unauthenticated(format!("Error parsing header: {e}")))?;
        if authorization != format!("Bearer {TOKEN}") {
            return Err(Status::unauthenticated("Invalid token"));
        }

        let database = metadata
            .get("database")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.state().databases.push(database);
        Ok(())
    }

    fn statement_result(sql: &str) -> Result<Vec<RecordBatch>, Status> {
        let normalized = sql.trim_start().to_uppercase();
        if normalized.starts_with("SELECT") {
            if normalized.contains("WHERE FALSE") {
                return Ok(vec![]);
            }
            return Ok(vec![demo_batch(&DEMO_ROWS)?]);
        }

        // One affected row per literal tuple.
        let affected = if normalized.starts_with("INSERT") {
            sql.matches("('").count()
        } else {
            0
        };
        Ok(vec![affected_rows_batch(affected)?])
    }
}

fn statement_ticket(sql: &str) -> Ticket {
    let query = TicketStatementQuery {
        statement_handle: sql.to_string().into(),
    };
    Ticket {
        ticket: query.as_any().encode_to_vec().into(),
    }
}

fn utf8(bytes: &[u8]) -> Result<String, Status> {
    String::from_utf8(bytes.to_vec()).map_err(|e| Status::invalid_argument(e.to_string()))
}

fn to_status(e: impl std::fmt::Display) -> Status {
    Status::internal(e.to_string())
}

fn demo_batch(rows: &[(i64, i32, f32, i8)]) -> Result<RecordBatch, Status> {
    let schema = Schema::new(vec![
        Field::new(
            "ts",
            DataType::Timestamp(TimeUnit::Millisecond, Some("+08:00".into())),
            false,
        ),
        Field::new("sid", DataType::Int32, true),
        Field::new("value", DataType::Float32, true),
        Field::new("flag", DataType::Int8, true),
    ]);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(
            TimestampMillisecondArray::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())
                .with_timezone("+08:00"),
        ),
        Arc::new(Int32Array::from(
            rows.iter().map(|r| r.1).collect::<Vec<_>>(),
        )),
        Arc::new(Float32Array::from(
            rows.iter().map(|r| r.2).collect::<Vec<_>>(),
        )),
        Arc::new(Int8Array::from(rows.iter().map(|r| r.3).collect::<Vec<_>>())),
    ];
    RecordBatch::try_new(Arc::new(schema), columns).map_err(to_status)
}

fn affected_rows_batch(affected: usize) -> Result<RecordBatch, Status> {
    let schema = Schema::new(vec![Field::new("affected_rows", DataType::Int64, false)]);
    let affected = i64::try_from(affected).map_err(to_status)?;
    RecordBatch::try_new(
        Arc::new(schema),
        vec![Arc::new(Int64Array::from(vec![affected]))],
    )
    .map_err(to_status)
}

fn string_batch(columns: Vec<(&str, Vec<&str>)>) -> Result<RecordBatch, Status> {
    let fields = columns
        .iter()
        .map(|(name, _)| Field::new(*name, DataType::Utf8, true))
        .collect::<Vec<_>>();
    let arrays = columns
        .into_iter()
        .map(|(_, values)| Arc::new(StringArray::from(values)) as ArrayRef)
        .collect::<Vec<_>>();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).map_err(to_status)
}

fn batch_stream(batches: Vec<RecordBatch>) -> <MockDatalayers as FlightService>::DoGetStream {
    let stream = FlightDataEncoderBuilder::new()
        .build(stream::iter(batches.into_iter().map(Ok)))
        .map_err(Status::from);
    Box::pin(stream)
}

async fn decode_parameters(stream: PeekableFlightDataStream) -> Result<Vec<RecordBatch>, Status> {
    FlightRecordBatchStream::new_from_flight_data(stream.map_err(FlightError::from))
        .try_collect::<Vec<_>>()
        .await
        .map_err(Status::from)
}

fn single_endpoint_info(ticket: Ticket, descriptor: FlightDescriptor) -> FlightInfo {
    FlightInfo::new()
        .with_endpoint(FlightEndpoint::new().with_ticket(ticket))
        .with_descriptor(descriptor)
}

#[tonic::async_trait]
impl FlightSqlService for MockDatalayers {
    type FlightService = MockDatalayers;

    async fn do_handshake(
        &self,
        request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<
        Response<Pin<Box<dyn Stream<Item = Result<HandshakeResponse, Status>> + Send>>>,
        Status,
    > {
        let basic = request
            .metadata()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Basic "))
            .ok_or_else(|| Status::unauthenticated("No basic authorization header"))?;
        let credentials = BASE64_STANDARD
            .decode(basic)
            .map_err(|e| Status::unauthenticated(e.to_string()))?;
        if credentials != format!("{USERNAME}:{PASSWORD}").as_bytes() {
            return Err(Status::unauthenticated("Invalid username or password"));
        }

        let result = Ok(HandshakeResponse {
            protocol_version: 0,
            payload: TOKEN.as_bytes().to_vec().into(),
        });
        let output: Pin<Box<dyn Stream<Item = Result<HandshakeResponse, Status>> + Send>> =
            Box::pin(stream::iter(vec![result]));
        let mut response = Response::new(output);
        let bearer = MetadataValue::try_from(format!("Bearer {TOKEN}"))
            .map_err(|_| Status::internal("generated authorization could not be parsed"))?;
        response.metadata_mut().insert("authorization", bearer);
        Ok(response)
    }

    async fn get_flight_info_statement(
        &self,
        query: CommandStatementQuery,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.authorize(&request)?;
        let sql = query.query;
        self.state().statements.push(sql.clone());

        if sql == MISSING_TABLE_QUERY {
            return Err(Status::invalid_argument(
                "Table missing_table not found at src/dbserver/src/query/planner.rs:87:13",
            ));
        }

        let descriptor = request.into_inner();
        let info = if sql == SPLIT_QUERY {
            FlightInfo::new()
                .with_endpoint(FlightEndpoint::new().with_ticket(statement_ticket(&sql)))
                .with_endpoint(FlightEndpoint::new().with_ticket(statement_ticket(&sql)))
                .with_descriptor(descriptor)
        } else if let (true, Some(remote)) = (sql == REMOTE_QUERY, &self.remote_location) {
            FlightInfo::new()
                .with_endpoint(
                    FlightEndpoint::new()
                        .with_ticket(statement_ticket(&sql))
                        .with_location(remote.clone()),
                )
                .with_descriptor(descriptor)
        } else {
            single_endpoint_info(statement_ticket(&sql), descriptor)
        };

        Ok(Response::new(info))
    }

    async fn do_get_statement(
        &self,
        ticket: TicketStatementQuery,
        request: Request<Ticket>,
    ) -> Result<Response<<Self as FlightService>::DoGetStream>, Status> {
        self.authorize(&request)?;
        let sql = utf8(&ticket.statement_handle)?;
        let batches = Self::statement_result(&sql)?;
        Ok(Response::new(batch_stream(batches)))
    }

    async fn do_put_statement_update(
        &self,
        ticket: CommandStatementUpdate,
        request: Request<PeekableFlightDataStream>,
    ) -> Result<i64, Status> {
        self.authorize(&request)?;
        self.state().statements.push(ticket.query.clone());
        let affected = ticket.query.matches("('").count();
        i64::try_from(affected).map_err(to_status)
    }

    async fn do_action_create_prepared_statement(
        &self,
        query: ActionCreatePreparedStatementRequest,
        request: Request<Action>,
    ) -> Result<ActionCreatePreparedStatementResult, Status> {
        self.authorize(&request)?;
        self.state().statements.push(query.query.clone());
        Ok(ActionCreatePreparedStatementResult {
            prepared_statement_handle: query.query.into(),
            ..Default::default()
        })
    }

    async fn do_put_prepared_statement_query(
        &self,
        query: CommandPreparedStatementQuery,
        request: Request<PeekableFlightDataStream>,
    ) -> Result<DoPutPreparedStatementResult, Status> {
        self.authorize(&request)?;
        let parameters = decode_parameters(request.into_inner()).await?;
        if let Some(schema) = parameters.first().map(RecordBatch::schema) {
            let binding = arrow::compute::concat_batches(&schema, &parameters).map_err(to_status)?;
            self.state()
                .bindings
                .insert(query.prepared_statement_handle.to_vec(), binding);
        }
        Ok(DoPutPreparedStatementResult {
            prepared_statement_handle: Some(query.prepared_statement_handle),
        })
    }

    async fn get_flight_info_prepared_statement(
        &self,
        cmd: CommandPreparedStatementQuery,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.authorize(&request)?;
        let ticket = Ticket {
            ticket: cmd.as_any().encode_to_vec().into(),
        };
        Ok(Response::new(single_endpoint_info(
            ticket,
            request.into_inner(),
        )))
    }

    async fn do_get_prepared_statement(
        &self,
        query: CommandPreparedStatementQuery,
        request: Request<Ticket>,
    ) -> Result<Response<<Self as FlightService>::DoGetStream>, Status> {
        self.authorize(&request)?;
        let sql = utf8(&query.prepared_statement_handle)?;
        let binding = self
            .state()
            .bindings
            .get(&query.prepared_statement_handle[..])
            .cloned();

        let batch = if sql.trim_start().to_uppercase().starts_with("INSERT") {
            affected_rows_batch(binding.map_or(0, |b| b.num_rows()))?
        } else {
            let sid = binding
                .as_ref()
                .and_then(|b| b.columns().first())
                .and_then(|column| column.as_primitive_opt::<Int32Type>())
                .filter(|sids| !sids.is_empty())
                .map(|sids| sids.value(0))
                .ok_or_else(|| Status::invalid_argument("Missing sid parameter"))?;
            let rows = DEMO_ROWS
                .iter()
                .filter(|row| row.1 == sid)
                .copied()
                .collect::<Vec<_>>();
            demo_batch(&rows)?
        };

        Ok(Response::new(batch_stream(vec![batch])))
    }

    async fn do_put_prepared_statement_update(
        &self,
        query: CommandPreparedStatementUpdate,
        request: Request<PeekableFlightDataStream>,
    ) -> Result<i64, Status> {
        self.authorize(&request)?;
        let stored = self
            .state()
            .bindings
            .get(&query.prepared_statement_handle[..])
            .map(RecordBatch::num_rows);
        let affected = match stored {
            Some(rows) => rows,
            None => decode_parameters(request.into_inner())
                .await?
                .iter()
                .map(RecordBatch::num_rows)
                .sum(),
        };
        i64::try_from(affected).map_err(to_status)
    }

    async fn do_action_close_prepared_statement(
        &self,
        query: ActionClosePreparedStatementRequest,
        request: Request<Action>,
    ) -> Result<(), Status> {
        self.authorize(&request)?;
        let handle = query.prepared_statement_handle;
        let mut state = self.state();
        state.bindings.remove(&handle[..]);
        state.closed.push(utf8(&handle)?);
        Ok(())
    }

    async fn get_flight_info_catalogs(
        &self,
        query: CommandGetCatalogs,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.authorize(&request)?;
        let ticket = Ticket {
            ticket: query.as_any().encode_to_vec().into(),
        };
        Ok(Response::new(single_endpoint_info(
            ticket,
            request.into_inner(),
        )))
    }

    async fn do_get_catalogs(
        &self,
        _query: CommandGetCatalogs,
        request: Request<Ticket>,
    ) -> Result<Response<<Self as FlightService>::DoGetStream>, Status> {
        self.authorize(&request)?;
        let batch = string_batch(vec![("catalog_name", vec!["rust"])])?;
        Ok(Response::new(batch_stream(vec![batch])))
    }

    async fn get_flight_info_tables(
        &self,
        query: CommandGetTables,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.authorize(&request)?;
        let ticket = Ticket {
            ticket: query.as_any().encode_to_vec().into(),
        };
        Ok(Response::new(single_endpoint_info(
            ticket,
            request.into_inner(),
        )))
    }

    async fn do_get_tables(
        &self,
        query: CommandGetTables,
        request: Request<Ticket>,
    ) -> Result<Response<<Self as FlightService>::DoGetStream>, Status> {
        self.authorize(&request)?;
        let tables = DEMO_TABLES
            .into_iter()
            .filter(|table| {
                query
                    .table_name_filter_pattern
                    .as_deref()
                    .map_or(true, |pattern| pattern == "%" || pattern == *table)
            })
            .collect::<Vec<_>>();
        let batch = string_batch(vec![
            ("catalog_name", vec!["rust"; tables.len()]),
            ("db_schema_name", vec!["public"; tables.len()]),
            ("table_name", tables.clone()),
            ("table_type", vec!["TABLE"; tables.len()]),
        ])?;
        Ok(Response::new(batch_stream(vec![batch])))
    }

    async fn register_sql_info(&self, _id: i32, _result: &SqlInfo) {}
}
