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
use flightsql_client::results::{affected_rows, format_batches};
use flightsql_client::Client;
use snafu::prelude::*;

use crate::bindings::{make_insert_binding, make_query_binding};
use crate::{DemoStepFailedSnafu, Result};

pub(crate) async fn run(client: &mut Client, database: &str) -> Result<()> {
    let result = client
        .execute(&format!("CREATE DATABASE {database}"))
        .await
        .context(DemoStepFailedSnafu {
            step: "create database",
        })?;
    print_affected_rows(&result)?;

    // Statements below qualify the table with the database, so the header is optional.
    client.use_database(database);

    let sql = format!(
        r"
        CREATE TABLE {database}.demo (
            ts TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            sid INT32,
            value REAL,
            flag INT8,
            timestamp key(ts)
        )
        PARTITION BY HASH(sid) PARTITIONS 8
        ENGINE=TimeSeries;
        "
    );
    let result = client.execute(&sql).await.context(DemoStepFailedSnafu {
        step: "create table",
    })?;
    print_affected_rows(&result)?;

    let sql = format!(
        r"
        INSERT INTO {database}.demo (ts, sid, value, flag) VALUES
            ('2024-09-01T10:00:00+08:00', 1, 12.5, 0),
            ('2024-09-01T10:05:00+08:00', 2, 15.3, 1),
            ('2024-09-01T10:10:00+08:00', 3, 9.8, 0),
            ('2024-09-01T10:15:00+08:00', 4, 22.1, 1),
            ('2024-09-01T10:20:00+08:00', 5, 30.0, 0);
        "
    );
    let result = client
        .execute(&sql)
        .await
        .context(DemoStepFailedSnafu { step: "insert rows" })?;
    print_affected_rows(&result)?;

    let result = client
        .execute(&format!("SELECT * FROM {database}.demo"))
        .await
        .context(DemoStepFailedSnafu { step: "query rows" })?;
    print_batches(&result)?;

    let sql = format!("INSERT INTO {database}.demo (ts, sid, value, flag) VALUES (?, ?, ?, ?);");
    let mut prepared_stmt = client.prepare(&sql).await.context(DemoStepFailedSnafu {
        step: "prepare insert",
    })?;
    let result = client
        .execute_prepared(&mut prepared_stmt, make_insert_binding()?)
        .await
        .context(DemoStepFailedSnafu {
            step: "execute prepared insert",
        })?;
    print_affected_rows(&result)?;
    client
        .close_prepared(prepared_stmt)
        .await
        .context(DemoStepFailedSnafu {
            step: "close prepared insert",
        })?;

    let sql = format!("SELECT * FROM {database}.demo WHERE sid = ?");
    let mut prepared_stmt = client.prepare(&sql).await.context(DemoStepFailedSnafu {
        step: "prepare query",
    })?;
    for sid in [1, 2] {
        let result = client
            .execute_prepared(&mut prepared_stmt, make_query_binding(sid)?)
            .await
            .context(DemoStepFailedSnafu {
                step: format!("query rows with sid {sid}"),
            })?;
        print_batches(&result)?;
    }
    client
        .close_prepared(prepared_stmt)
        .await
        .context(DemoStepFailedSnafu {
            step: "close prepared query",
        })?;

    // Datalayers does not support UPDATE, so DML here means INSERT.
    let sql = format!(
        r"
        INSERT INTO {database}.demo (ts, sid, value, flag) VALUES
            ('2024-09-03T10:00:00+08:00', 1, 4.5, 0),
            ('2024-09-03T10:05:00+08:00', 2, 11.6, 1);
        "
    );
    let affected_rows = client
        .execute_update(&sql)
        .await
        .context(DemoStepFailedSnafu {
            step: "execute update",
        })?;
    println!("Affected rows: {affected_rows}");

    let sql = format!("SELECT * FROM {database}.demo where ts >= '2024-09-03T10:00:00+08:00'");
    let result = client.execute(&sql).await.context(DemoStepFailedSnafu {
        step: "query updated rows",
    })?;
    print_batches(&result)?;

    println!("Finished, thank you!");
    Ok(())
}

fn print_affected_rows(batches: &[RecordBatch]) -> Result<()> {
    let affected_rows = affected_rows(batches).context(DemoStepFailedSnafu {
        step: "read affected rows",
    })?;
    println!("Affected rows: {affected_rows}");
    Ok(())
}

fn print_batches(batches: &[RecordBatch]) -> Result<()> {
    let table = format_batches(batches).context(DemoStepFailedSnafu {
        step: "format results",
    })?;
    println!("{table}");
    Ok(())
}
