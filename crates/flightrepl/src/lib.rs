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

use std::time::{Duration, Instant};

use ansi_term::Colour;
use arrow::record_batch::RecordBatch;
use flightsql_client::results::{format_batches, total_rows};
use flightsql_client::{Client, Error};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Results longer than this are truncated on screen.
pub const MAX_DISPLAYED_ROWS: usize = 500;

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Exit,
    Help,
    ShowError,
    ShowTables,
    ShowCatalogs,
    Use(&'a str),
    Sql(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let statement = line.trim_end_matches(';').trim();
    match statement {
        ".exit" | "exit" | "quit" | "q" => Command::Exit,
        "help" => Command::Help,
        ".error" => Command::ShowError,
        _ if statement.eq_ignore_ascii_case("show tables") => Command::ShowTables,
        _ if statement.eq_ignore_ascii_case("show catalogs") => Command::ShowCatalogs,
        _ => match statement.split_once(char::is_whitespace) {
            Some((keyword, database))
                if keyword.eq_ignore_ascii_case("use") && !database.trim().is_empty() =>
            {
                Command::Use(database.trim())
            }
            _ => Command::Sql(line),
        },
    }
}

#[allow(clippy::missing_errors_doc)]
pub async fn run(mut client: Client) -> Result<(), Box<dyn std::error::Error>> {
    let mut rl = DefaultEditor::new()?;

    println!("Welcome to the interactive Datalayers SQL shell! Type 'help' for help.\n");
    println!("show tables; -- list available tables");

    let mut last_error: Option<Error> = None;
    let prompt_color = Colour::Fixed(8);

    loop {
        let prompt = prompt_color
            .paint(format!("{}> ", client.database().unwrap_or("sql")))
            .to_string();
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                println!("Error reading line: {err}");
                continue;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        let start_time = Instant::now();
        let result = match parse_command(line) {
            Command::Exit => break,
            Command::Help => {
                print_help(prompt_color);
                continue;
            }
            Command::ShowError => {
                match last_error {
                    Some(ref err) => println!("{err:?}"),
                    None => println!("No error to display"),
                }
                continue;
            }
            Command::Use(database) => {
                client.use_database(database);
                println!("Database changed to {database}");
                continue;
            }
            Command::ShowTables => {
                let catalog = client.database().map(str::to_string);
                client.tables(catalog, None, None).await
            }
            Command::ShowCatalogs => client.catalogs().await,
            Command::Sql(sql) => client.execute(sql).await,
        };

        match result {
            Ok(batches) => {
                display_batches(&batches, start_time.elapsed());
                last_error = None;
            }
            Err(e) => {
                tracing::debug!("Query failed: {e}");
                display_error(&e);
                last_error = Some(e);
            }
        }
    }

    Ok(())
}

fn print_help(prompt_color: Colour) {
    println!("Available commands:\n");
    println!(
        "{} Exit the REPL",
        prompt_color.paint(".exit, exit, quit, q:")
    );
    println!(
        "{} Show technical details from the last error",
        prompt_color.paint(".error:")
    );
    println!("{} List the tables", prompt_color.paint("show tables:"));
    println!("{} List the catalogs", prompt_color.paint("show catalogs:"));
    println!(
        "{} Attach the database to every following query",
        prompt_color.paint("use <database>:")
    );
    println!("{} Show this help message", prompt_color.paint("help:"));
    println!("\nAny other line will be interpreted as a SQL query");
}

fn display_batches(batches: &[RecordBatch], elapsed: Duration) {
    let total_rows = total_rows(batches);
    if total_rows == 0 {
        println!("No data returned for query");
        return;
    }

    let displayed = limit_batches(batches, MAX_DISPLAYED_ROWS);
    match format_batches(&displayed) {
        Ok(table) => println!("{table}"),
        Err(e) => println!("Error displaying results: {e}"),
    }
    println!(
        "\nQuery took: {} seconds. {}/{total_rows} rows displayed.",
        elapsed.as_secs_f64(),
        total_rows.min(MAX_DISPLAYED_ROWS)
    );
}

fn limit_batches(batches: &[RecordBatch], limit: usize) -> Vec<RecordBatch> {
    let mut remaining = limit;
    let mut limited = vec![];
    for batch in batches {
        if remaining == 0 {
            break;
        }
        let rows = batch.num_rows().min(remaining);
        limited.push(batch.slice(0, rows));
        remaining -= rows;
    }
    limited
}

fn display_error(err: &Error) {
    let (error_type, user_err_msg) = match err {
        Error::UnableToQuery { message } | Error::UnableToPrepare { message } => {
            ("Query Error", message.clone())
        }
        Error::UnableToConnectToServer { .. } => (
            "Error",
            "The query could not be completed because the server is unavailable. Show technical details with '.error'".to_string(),
        ),
        Error::NoEndpointsFound | Error::NoTicketInEndpoint => (
            "Error",
            "The server returned no data location for the query. Show technical details with '.error'".to_string(),
        ),
        _ => ("Error", err.to_string()),
    };

    println!("{} {user_err_msg}", Colour::Red.paint(error_type));
}
