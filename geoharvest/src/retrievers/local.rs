//! Retriever for inputs that already sit on a reachable filesystem.

use crate::model::Request;
use crate::retriever::support::{
    self, discard, enforce_limit, ensure_parent, load_or_plan, partial_path, publish,
};
use crate::retriever::{
    ConstituentMap, Retriever, RetrieverConfig, RetrieverError, RetrieverFuture,
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{self, AsyncWriteExt};

/// Name of the manifest written by the aggregation step.
pub const MOSAIC_MANIFEST: &str = "mosaic.txt";

/// Stages local input files into the request destination.
///
/// A constituent with a single input is a copy of it; several inputs are
/// concatenated in order. With `"mosaic": true` the aggregation step writes
/// a manifest listing every constituent output, one path per line.
///
/// Parameters: see [`support::plan_from_parameters`], plus the optional
/// `"mosaic"` flag.
#[derive(Debug)]
pub struct LocalCopyRetriever {
    destination: PathBuf,
    parameters: serde_json::Value,
    max_constituents: usize,
    mosaic: bool,
}

impl LocalCopyRetriever {
    pub const PROTOCOL: &'static str = "local";

    pub fn new(request: &Request, config: &RetrieverConfig) -> Result<Self, RetrieverError> {
        let mosaic = match request.parameters.get("mosaic") {
            None => false,
            Some(value) => value.as_bool().ok_or_else(|| {
                RetrieverError::InvalidParameters("'mosaic' must be a boolean".into())
            })?,
        };
        Ok(Self {
            destination: config.resolve_destination(&request.destination),
            parameters: request.parameters.clone(),
            max_constituents: config.max_constituents,
            mosaic,
        })
    }

    async fn stage(&self, partial: &Path, inputs: &[String]) -> Result<(), RetrieverError> {
        let mut out = fs::File::create(partial).await?;
        for input in inputs {
            let mut source = fs::File::open(input).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RetrieverError::Unreachable(format!("input '{}' does not exist", input))
                } else {
                    RetrieverError::Io(e)
                }
            })?;
            io::copy(&mut source, &mut out).await?;
        }
        out.flush().await?;
        out.sync_all().await?;
        Ok(())
    }
}

impl Retriever for LocalCopyRetriever {
    fn name(&self) -> &str {
        Self::PROTOCOL
    }

    fn list_constituents(&self) -> RetrieverFuture<'_, ConstituentMap> {
        Box::pin(async move {
            let list = self.destination.join(support::CONSTITUENT_LIST_FILE);
            let map = load_or_plan(&list, || {
                support::plan_from_parameters(&self.parameters, &self.destination, None)
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
            if inputs.is_empty() {
                return Err(RetrieverError::InvalidParameters(format!(
                    "constituent '{}' has no inputs",
                    key.display()
                )));
            }

            ensure_parent(key).await?;
            let partial = partial_path(key);
            if let Err(e) = self.stage(&partial, inputs).await {
                discard(&partial).await;
                return Err(e);
            }
            publish(&partial, key).await
        })
    }

    fn aggregate<'a>(&'a self, outputs: &'a [PathBuf]) -> RetrieverFuture<'a, Option<PathBuf>> {
        Box::pin(async move {
            if !self.mosaic {
                return Ok(None);
            }

            let manifest = self.destination.join(MOSAIC_MANIFEST);
            let mut sorted: Vec<&PathBuf> = outputs.iter().collect();
            sorted.sort();
            let body: String = sorted
                .iter()
                .map(|p| format!("{}\n", p.display()))
                .collect();

            let partial = partial_path(&manifest);
            if let Err(e) = fs::write(&partial, body).await {
                discard(&partial).await;
                return Err(e.into());
            }
            publish(&partial, &manifest).await.map(Some)
        })
    }
}
