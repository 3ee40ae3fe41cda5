//! JSON I/O handling for CLI
//!
//! - Input: one JSON request per line on stdin
//! - Output: one JSON object per line on stdout
//! - UTF-8 only

use std::io::{self, BufRead, Write};

use serde::Serialize;
use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Parses JSON requests from `input`, one per non-blank line.
pub fn read_requests<R: BufRead>(input: R) -> impl Iterator<Item = CliResult<Value>> {
    input.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(serde_json::from_str(&line).map_err(CliError::from)),
        Err(e) => Some(Err(CliError::from(e))),
    })
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

/// Write any serialisable value as one line of JSON on stdout
pub fn write_line<T: Serialize>(value: &T) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_blank_lines_are_skipped() {
        let input = Cursor::new("{\"a\":1}\n\n  \n{\"b\":2}\n");
        let requests: Vec<Value> = read_requests(input).map(Result::unwrap).collect();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1]["b"], 2);
    }

    #[test]
    fn test_malformed_line_is_bad_request() {
        let input = Cursor::new("{not json}\n");
        let err = read_requests(input).next().unwrap().unwrap_err();
        assert_eq!(err.code_str(), "RTS_CLI_BAD_REQUEST");
    }
}
