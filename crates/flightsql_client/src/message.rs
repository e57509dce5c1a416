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

use std::sync::LazyLock;

use arrow::error::ArrowError;
use regex::Regex;

const ESCAPED_QUOTE_PLACEHOLDER: &str = "[ESCAPED_QUOTE]";

static MESSAGE_REGEX: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r#"message: "(.*?)(?: at src/dbserver/src.*?)?""#));

/// Reduces a stringified gRPC status to the message reported by the server.
///
/// The Flight SQL client wraps server failures in `ArrowError`s whose text is the
/// full debug dump of the `tonic::Status`, including metadata. Only the `message`
/// field is kept, with the server-side source location stripped. Line breaks inside
/// the message arrive escaped as `\n` and become spaces like raw ones. Input without a
/// `message` field is returned with only its raw line breaks flattened.
#[must_use]
pub fn filter_message(err: &str) -> String {
    let err = err
        .replace(['\n', '\r'], " ")
        .replace("\\\"", ESCAPED_QUOTE_PLACEHOLDER);

    let Ok(regex) = &*MESSAGE_REGEX else {
        tracing::error!("Could not compile the server message regex");
        return err.replace(ESCAPED_QUOTE_PLACEHOLDER, "\\\"");
    };

    match regex.captures(&err) {
        Some(captures) => captures[1]
            .replace(ESCAPED_QUOTE_PLACEHOLDER, "\\\"")
            .replace("\\n", " ")
            .replace('\\', ""),
        None => err.replace(ESCAPED_QUOTE_PLACEHOLDER, "\\\""),
    }
}

pub(crate) fn server_message(err: &ArrowError) -> String {
    filter_message(&err.to_string())
}
