//! Retriever that shells out to an external tool per constituent.
//!
//! Parameters:
//!
//! ```text
//! {
//!   "inputs": ["/raw/s1.ntf", ...]           (or "constituents": {...})
//!   "extension": "tif",                       output extension for "inputs"
//!   "command": ["gdal_translate", "{input}", "{output}"],
//!   "aggregate_command": ["gdalbuildvrt", "{output}", "{inputs}"],
//!   "aggregate_name": "mosaic.vrt",
//!   "max_concurrency": 2
//! }
//! ```
//!
//! Placeholders: `{output}` is the in-progress output path, `{input}` the
//! first input, and an argument that is exactly `{inputs}` expands to every
//! input as separate arguments. The tool must write `{output}`; the file is
//! published to its real path only after a zero exit status.

use crate::model::Request;
use crate::retriever::support::{
    self, discard, enforce_limit, ensure_parent, load_or_plan, partial_path, publish,
};
use crate::retriever::{
    ConstituentMap, Retriever, RetrieverConfig, RetrieverError, RetrieverFuture, UNBOUNDED,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

/// Default file name of the aggregate artifact.
pub const DEFAULT_AGGREGATE_NAME: &str = "aggregate.out";

/// Longest stderr excerpt kept in a [`RetrieverError::ToolFailed`].
const STDERR_EXCERPT: usize = 2048;

/// Runs a templated external command per constituent.
#[derive(Debug, Clone)]
pub struct CommandRetriever {
    destination: PathBuf,
    parameters: Value,
    extension: Option<String>,
    command: Vec<String>,
    aggregate_command: Option<Vec<String>>,
    aggregate_name: String,
    max_constituents: usize,
    max_concurrency: usize,
}

impl CommandRetriever {
    pub const PROTOCOL: &'static str = "command";

    pub fn new(request: &Request, config: &RetrieverConfig) -> Result<Self, RetrieverError> {
        let params = &request.parameters;

        let command = template(params, "command")?.ok_or_else(|| {
            RetrieverError::InvalidParameters("'command' template is required".into())
        })?;
        let aggregate_command = template(params, "aggregate_command")?;
        let extension = optional_str(params, "extension")?;
        let aggregate_name = optional_str(params, "aggregate_name")?
            .unwrap_or_else(|| DEFAULT_AGGREGATE_NAME.to_string());

        let requested = match params.get("max_concurrency") {
            None => UNBOUNDED,
            Some(v) => v
                .as_u64()
                .filter(|n| *n > 0)
                .map(|n| usize::try_from(n).unwrap_or(UNBOUNDED))
                .ok_or_else(|| {
                    RetrieverError::InvalidParameters(
                        "'max_concurrency' must be a positive integer".into(),
                    )
                })?,
        };
        let cap = match config.command_max_concurrency {
            0 => UNBOUNDED,
            n => n,
        };

        Ok(Self {
            destination: config.resolve_destination(&request.destination),
            parameters: params.clone(),
            extension,
            command,
            aggregate_command,
            aggregate_name,
            max_constituents: config.max_constituents,
            max_concurrency: requested.min(cap),
        })
    }

    /// Runs `template` with placeholders bound, writing `output`.
    async fn run_tool(
        template: &[String],
        inputs: &[String],
        output: &Path,
    ) -> Result<(), RetrieverError> {
        let args = expand(template, inputs, output);
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| RetrieverError::InvalidParameters("empty command template".into()))?;

        debug!(tool = %program, args = ?rest, "Running external tool");
        let result = Command::new(program)
            .args(rest)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RetrieverError::Unreachable(format!("tool '{}' not found", program))
                } else {
                    RetrieverError::Io(e)
                }
            })?;

        if !result.status.success() {
            return Err(RetrieverError::ToolFailed {
                tool: program.clone(),
                status: result.status.code(),
                stderr: excerpt(&result.stderr),
            });
        }
        if !fs::try_exists(output).await? {
            return Err(RetrieverError::ToolFailed {
                tool: program.clone(),
                status: result.status.code(),
                stderr: format!("tool exited cleanly but did not write {}", output.display()),
            });
        }
        Ok(())
    }

    /// Runs a tool into a partial path and publishes on success.
    async fn produce(
        template: &[String],
        inputs: &[String],
        destination: &Path,
    ) -> Result<PathBuf, RetrieverError> {
        ensure_parent(destination).await?;
        let partial = partial_path(destination);
        discard(&partial).await;

        if let Err(e) = Self::run_tool(template, inputs, &partial).await {
            discard(&partial).await;
            return Err(e);
        }
        publish(&partial, destination).await
    }
}

impl Retriever for CommandRetriever {
    fn name(&self) -> &str {
        Self::PROTOCOL
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    fn list_constituents(&self) -> RetrieverFuture<'_, ConstituentMap> {
        Box::pin(async move {
            let list = self.destination.join(support::CONSTITUENT_LIST_FILE);
            let map = load_or_plan(&list, || {
                support::plan_from_parameters(
                    &self.parameters,
                    &self.destination,
                    self.extension.as_deref(),
                )
            })
            .await?;
            enforce_limit(&map, self.max_constituents)?;
            Ok(map)
        })
    }

    fn retrieve_one<'a>(
        &'a self,
        key: &'a Path,
        inputs: &'a [String],
    ) -> RetrieverFuture<'a, PathBuf> {
        Box::pin(async move {
            if fs::try_exists(key).await? {
                return Ok(key.to_path_buf());
            }
            Self::produce(&self.command, inputs, key).await
        })
    }

    fn aggregate<'a>(&'a self, outputs: &'a [PathBuf]) -> RetrieverFuture<'a, Option<PathBuf>> {
        Box::pin(async move {
            let Some(template) = &self.aggregate_command else {
                return Ok(None);
            };
            let destination = self.destination.join(&self.aggregate_name);
            if fs::try_exists(&destination).await? {
                return Ok(Some(destination));
            }

            let mut inputs: Vec<String> = outputs
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            inputs.sort();
            Self::produce(template, &inputs, &destination)
                .await
                .map(Some)
        })
    }
}

/// Substitutes placeholders in a command template.
fn expand(template: &[String], inputs: &[String], output: &Path) -> Vec<String> {
    let output = output.to_string_lossy();
    let first = inputs.first().map(String::as_str).unwrap_or_default();
    let mut args = Vec::with_capacity(template.len() + inputs.len());
    for arg in template {
        if arg == "{inputs}" {
            args.extend(inputs.iter().cloned());
        } else {
            args.push(arg.replace("{output}", &output).replace("{input}", first));
        }
    }
    args
}

fn excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_EXCERPT {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_EXCERPT;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

fn template(params: &Value, field: &str) -> Result<Option<Vec<String>>, RetrieverError> {
    let Some(value) = params.get(field) else {
        return Ok(None);
    };
    let invalid =
        || RetrieverError::InvalidParameters(format!("'{}' must be a non-empty list of strings", field));
    let items = value.as_array().ok_or_else(invalid)?;
    if items.is_empty() {
        return Err(invalid());
    }
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(invalid))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn optional_str(params: &Value, field: &str) -> Result<Option<String>, RetrieverError> {
    match params.get(field) {
        None => Ok(None),
        Some(v) => v.as_str().map(|s| Some(s.to_string())).ok_or_else(|| {
            RetrieverError::InvalidParameters(format!("'{}' must be a string", field))
        }),
    }
}
