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

use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Int64Type};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use snafu::prelude::*;

use crate::{InvalidAffectedRowsSnafu, Result, UnableToFormatResultsSnafu};

/// Name of the column in which Datalayers reports the affected rows of a DDL or DML statement.
pub const AFFECTED_ROWS_COLUMN: &str = "affected_rows";

/// Extracts the affected rows from the result of a statement submitted through `execute`.
///
/// The server answers DDL and DML with a single row holding the count, so the value is
/// read from the first row of the `affected_rows` column, or of the first column if the
/// server named it differently.
pub fn affected_rows(batches: &[RecordBatch]) -> Result<i64> {
    let batch = batches.first().context(InvalidAffectedRowsSnafu {
        reason: "no record batch was returned",
    })?;
    ensure!(
        batch.num_rows() > 0,
        InvalidAffectedRowsSnafu {
            reason: "the record batch is empty",
        }
    );

    let column = batch
        .column_by_name(AFFECTED_ROWS_COLUMN)
        .or_else(|| batch.columns().first())
        .context(InvalidAffectedRowsSnafu {
            reason: "the record batch has no columns",
        })?;
    ensure!(
        column.data_type().is_integer(),
        InvalidAffectedRowsSnafu {
            reason: format!("expected an integer column, found {}", column.data_type()),
        }
    );

    let column = arrow::compute::cast(column, &DataType::Int64).map_err(|e| {
        InvalidAffectedRowsSnafu {
            reason: e.to_string(),
        }
        .build()
    })?;
    let values = column.as_primitive::<Int64Type>();
    ensure!(
        values.is_valid(0),
        InvalidAffectedRowsSnafu {
            reason: "the affected rows value is null",
        }
    );

    Ok(values.value(0))
}

#[must_use]
pub fn total_rows(batches: &[RecordBatch]) -> usize {
    batches.iter().map(RecordBatch::num_rows).sum()
}

/// Renders the batches as an ASCII table.
pub fn format_batches(batches: &[RecordBatch]) -> Result<String> {
    let table = pretty_format_batches(batches).context(UnableToFormatResultsSnafu)?;
    Ok(table.to_string())
}
