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

//! Parameter bindings for the prepared statements of the demo.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float32Array, Int32Array, Int8Array, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{FixedOffset, TimeZone};
use snafu::prelude::*;

use crate::{InvalidTimestampSnafu, Result, UnableToBuildBindingSnafu};

/// Timezone of the demo timestamps, UTC+8.
pub const TIMEZONE: &str = "+08:00";
const UTC_OFFSET_SECS: i32 = 8 * 60 * 60;

fn timestamp_field() -> Field {
    Field::new(
        "ts",
        DataType::Timestamp(TimeUnit::Millisecond, Some(TIMEZONE.into())),
        false,
    )
}

/// Five rows for `INSERT INTO demo (ts, sid, value, flag) VALUES (?, ?, ?, ?)`,
/// taken every five minutes from 2024-09-02T10:00:00+08:00.
pub fn make_insert_binding() -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        timestamp_field(),
        Field::new("sid", DataType::Int32, true),
        Field::new("value", DataType::Float32, true),
        Field::new("flag", DataType::Int8, true),
    ]));

    let offset = FixedOffset::east_opt(UTC_OFFSET_SECS).context(InvalidTimestampSnafu {
        datetime: TIMEZONE,
    })?;
    let ts_data = [0, 5, 10, 15, 20]
        .into_iter()
        .map(|minute| {
            offset
                .with_ymd_and_hms(2024, 9, 2, 10, minute, 0)
                .single()
                .map(|datetime| datetime.timestamp_millis())
                .context(InvalidTimestampSnafu {
                    datetime: format!("2024-09-02T10:{minute:02}:00{TIMEZONE}"),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMillisecondArray::from(ts_data).with_timezone(TIMEZONE)),
        Arc::new(Int32Array::from(vec![1, 2, 3, 4, 5])),
        Arc::new(Float32Array::from(vec![12.5, 15.3, 9.8, 22.1, 30.0])),
        Arc::new(Int8Array::from(vec![0, 1, 0, 1, 0])),
    ];

    RecordBatch::try_new(schema, columns).context(UnableToBuildBindingSnafu)
}

/// A single `sid` parameter for `SELECT * FROM demo WHERE sid = ?`.
pub fn make_query_binding(sid: i32) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![Field::new("sid", DataType::Int32, true)]));
    RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![Some(sid)]))])
        .context(UnableToBuildBindingSnafu)
}
