//! Common argument parsing shared across CLI commands.

use geoharvest::model::RequestId;
use serde_json::{Map, Value};

use crate::error::CliError;

/// Parse a request id given as `7` or `request-7`.
pub fn parse_request_id(raw: &str) -> Result<RequestId, CliError> {
    let digits = raw.trim().strip_prefix("request-").unwrap_or(raw.trim());
    digits.parse::<u64>().map(RequestId).map_err(|_| {
        CliError::InvalidArgument(format!(
            "'{}' is not a request id (expected a number such as 7 or request-7)",
            raw
        ))
    })
}

/// Build request parameters from `--params-json` and repeated `--param key=value`.
///
/// Values given with `--param` are parsed as JSON when possible (numbers,
/// booleans, arrays) and kept as strings otherwise. They override keys from
/// the JSON object.
pub fn build_parameters(json: Option<&str>, params: &[String]) -> Result<Value, CliError> {
    let mut object = match json {
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(CliError::InvalidArgument(
                    "--params-json must be a JSON object".to_string(),
                ))
            }
            Err(e) => {
                return Err(CliError::InvalidArgument(format!(
                    "--params-json is not valid JSON: {}",
                    e
                )))
            }
        },
        None => Map::new(),
    };

    for param in params {
        let (key, raw) = param.split_once('=').ok_or_else(|| {
            CliError::InvalidArgument(format!("--param '{}' must have the form key=value", param))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "--param '{}' has an empty key",
                param
            )));
        }
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        object.insert(key.to_string(), value);
    }

    Ok(Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request_id() {
        assert_eq!(parse_request_id("7").unwrap(), RequestId(7));
        assert_eq!(parse_request_id("request-12").unwrap(), RequestId(12));
        assert!(parse_request_id("constituent-3").is_err());
        assert!(parse_request_id("").is_err());
    }

    #[test]
    fn test_build_parameters_merges() {
        let params = vec![
            "mosaic=true".to_string(),
            "label=north field".to_string(),
            "max_concurrency=2".to_string(),
        ];
        let value = build_parameters(Some(r#"{"inputs": ["a.tif"], "label": "x"}"#), &params)
            .unwrap();
        assert_eq!(
            value,
            json!({
                "inputs": ["a.tif"],
                "label": "north field",
                "mosaic": true,
                "max_concurrency": 2
            })
        );
    }

    #[test]
    fn test_build_parameters_rejects_bad_input() {
        assert!(build_parameters(Some("[1, 2]"), &[]).is_err());
        assert!(build_parameters(Some("{"), &[]).is_err());
        assert!(build_parameters(None, &["novalue".to_string()]).is_err());
        assert!(build_parameters(None, &["=x".to_string()]).is_err());
        assert_eq!(build_parameters(None, &[]).unwrap(), json!({}));
    }
}
