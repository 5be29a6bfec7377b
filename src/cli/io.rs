//! Terminal I/O for `call`
//!
//! The request body comes from `--body` or stdin; the reply is printed as
//! one JSON object on stdout.

use std::io::{self, Read, Write};

use serde_json::{json, Value};

use super::errors::CliResult;
use crate::dispatch::{ContentType, Reply};

/// `-` reads the whole of stdin
pub fn read_body(arg: &str) -> CliResult<Vec<u8>> {
    if arg != "-" {
        return Ok(arg.as_bytes().to_vec());
    }
    let mut body = Vec::new();
    io::stdin().lock().read_to_end(&mut body)?;
    Ok(body)
}

/// Status plus body; JSON bodies are embedded, anything else as text
pub fn render_reply(reply: &Reply) -> Value {
    let body = match reply.content_type() {
        ContentType::Json => reply
            .body_json()
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(reply.body()).into_owned())),
        ContentType::NdJson => Value::String(String::from_utf8_lossy(reply.body()).into_owned()),
    };
    json!({ "status": reply.status(), "body": body })
}

/// Print the reply to stdout
pub fn write_reply(reply: &Reply) -> CliResult<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer(&mut out, &render_reply(reply))?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
