//! JSON I/O handling for CLI
//!
//! - Input: a single JSON object via stdin
//! - Output: a single JSON object per line via stdout
//! - UTF-8 only

use std::io::{self, Read, Write};

use serde_json::Value;

use crate::schema::FieldMap;

use super::errors::{CliError, CliResult};

/// Read the whole of stdin as one JSON value
pub fn read_request() -> CliResult<Value> {
    let mut input = String::new();
    io::stdin().lock().read_to_string(&mut input)?;
    parse_request(&input)
}

fn parse_request(input: &str) -> CliResult<Value> {
    if input.trim().is_empty() {
        return Err(CliError::input_error("Empty input"));
    }
    let value: Value = serde_json::from_str(input)?;
    Ok(value)
}

/// Field values of a write: `{"<field>": {"type": ..., "value": ...}, ...}`
pub fn parse_fields(request: Value) -> CliResult<FieldMap> {
    if !request.is_object() {
        return Err(CliError::input_error("fields must be a JSON object"));
    }
    serde_json::from_value(request)
        .map_err(|e| CliError::input_error(format!("invalid field values: {}", e)))
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_line(&serde_json::json!({
        "status": "ok",
        "data": data
    }))
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_line(&serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    }))
}

fn write_line(response: &Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, response)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldValue;
    use serde_json::json;

    #[test]
    fn test_parse_fields() {
        let fields = parse_fields(json!({
            "Name": {"type": "title", "value": "Plan week"},
            "Tags": {"type": "multi_enum", "value": ["home"]}
        }))
        .unwrap();
        assert_eq!(fields["Name"], FieldValue::title("Plan week"));
        assert_eq!(fields["Tags"], FieldValue::multi_select(&["home"]));
    }

    #[test]
    fn test_parse_fields_rejects_non_object() {
        assert!(parse_fields(json!(["Name"])).is_err());
        assert!(parse_fields(json!({"Name": "untagged"})).is_err());
    }

    #[test]
    fn test_empty_request() {
        let err = parse_request("  \n").unwrap_err();
        assert_eq!(err.code_str(), "SG_CLI_INPUT_ERROR");
    }
}
