//! Rendering of host responses

use std::io::Write;

use clap::ValueEnum;
use inmars_core::HostResponse;
use serde_json::Value;

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputMode {
    /// Human-readable text
    #[default]
    Plain,
    /// JSON array of `{"host": {name, address, port}, "fields": {..}}` objects
    Json,
}

/// Write `responses` to `out`, ordered by host name
///
/// # Errors
/// Returns I/O or serialization errors from writing
pub fn render<W: Write>(
    out: &mut W,
    responses: &[HostResponse],
    mode: OutputMode,
    short: bool,
) -> eyre::Result<()> {
    let mut sorted: Vec<&HostResponse> = responses.iter().collect();
    sorted.sort_by(|a, b| a.host.name.cmp(&b.host.name));

    match mode {
        OutputMode::Json => {
            serde_json::to_writer(&mut *out, &sorted)?;
            writeln!(out)?;
        }
        OutputMode::Plain if short => {
            for response in sorted {
                let pairs: Vec<String> = response
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{k}={}", display_value(v)))
                    .collect();
                writeln!(out, "{}: {}", response.host.address, pairs.join(" "))?;
            }
        }
        OutputMode::Plain => {
            for response in sorted {
                writeln!(out, "Stats for {}:\n", response.host.address)?;
                for (key, value) in &response.fields {
                    writeln!(out, "  {key}: {}", display_value(value))?;
                }
                writeln!(out)?;
            }
        }
    }

    Ok(())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inmars_core::HostRef;

    fn response(name: &str, address: &str, body: &str) -> HostResponse {
        let host = HostRef {
            name: name.to_string(),
            address: address.to_string(),
            port: 22,
        };
        HostResponse::decode(host, body).unwrap()
    }

    fn rendered(mode: OutputMode, short: bool) -> String {
        let responses = vec![
            response("web2", "10.0.0.6", r#"{"uptime": "3 days"}"#),
            response("web1", "10.0.0.5", r#"{"load": 0.5, "uptime": "1 day"}"#),
        ];
        let mut out = Vec::new();
        render(&mut out, &responses, mode, short).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_plain() {
        let text = rendered(OutputMode::Plain, false);
        assert!(text.starts_with("Stats for 10.0.0.5:\n\n  load: 0.5\n  uptime: 1 day\n"));
        assert!(text.contains("Stats for 10.0.0.6:\n\n  uptime: 3 days\n"));
    }

    #[test]
    fn test_short() {
        let text = rendered(OutputMode::Plain, true);
        assert_eq!(
            text,
            "10.0.0.5: load=0.5 uptime=1 day\n10.0.0.6: uptime=3 days\n"
        );
    }

    #[test]
    fn test_json() {
        let text = rendered(OutputMode::Json, false);
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value[0]["host"]["name"], "web1");
        assert_eq!(value[0]["host"]["address"], "10.0.0.5");
        assert_eq!(value[0]["fields"]["load"], 0.5);
        assert_eq!(value[1]["fields"]["uptime"], "3 days");
    }

    #[test]
    fn test_json_keeps_host_ref_when_script_emits_host() {
        let responses = vec![response("web1", "10.0.0.5", r#"{"host": "box"}"#)];
        let mut out = Vec::new();
        render(&mut out, &responses, OutputMode::Json, false).unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value[0]["host"]["address"], "10.0.0.5");
        assert_eq!(value[0]["fields"]["host"], "box");
    }
}
