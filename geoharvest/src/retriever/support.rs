//! Helpers shared by retriever implementations.
//!
//! - Planning constituents from request parameters
//! - Persisting the constituent list so a resumed run reuses it
//! - Publishing outputs atomically so failed attempts leave nothing behind

use super::{ConstituentMap, RetrieverError};
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name of the persisted constituent list inside a request destination.
pub const CONSTITUENT_LIST_FILE: &str = "constituents.json";

/// Suffix appended to a destination while it is being produced.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Plans constituents from request parameters.
///
/// Two shapes are accepted:
///
/// ```text
/// { "constituents": { "a.tif": ["in1", "in2"], "b.tif": ["in3"] } }
/// { "inputs": ["/raw/a.ntf", "/raw/b.ntf"] }       one constituent per input
/// ```
///
/// Keys are joined onto `destination`; group names must be relative paths
/// without `..` or root components. In the `inputs` shape the key is the
/// input's file name, with its extension replaced by `extension` if given.
pub fn plan_from_parameters(
    parameters: &Value,
    destination: &Path,
    extension: Option<&str>,
) -> Result<ConstituentMap, RetrieverError> {
    if let Some(groups) = parameters.get("constituents") {
        let groups = groups.as_object().ok_or_else(|| {
            RetrieverError::InvalidParameters("'constituents' must be an object".into())
        })?;
        let mut map = ConstituentMap::new();
        for (name, inputs) in groups {
            let inputs = string_list(inputs, name)?;
            map.insert(destination.join(relative_name(name)?), inputs);
        }
        return Ok(map);
    }

    if let Some(inputs) = parameters.get("inputs") {
        let inputs = string_list(inputs, "inputs")?;
        let mut map = ConstituentMap::new();
        for input in inputs {
            let file_name = Path::new(&input)
                .file_name()
                .map(PathBuf::from)
                .ok_or_else(|| {
                    RetrieverError::InvalidParameters(format!("input '{}' has no file name", input))
                })?;
            let file_name = match extension {
                Some(ext) => file_name.with_extension(ext),
                None => file_name,
            };
            let key = destination.join(file_name);
            if map.contains_key(&key) {
                return Err(RetrieverError::InvalidParameters(format!(
                    "inputs map to the same output '{}'",
                    key.display()
                )));
            }
            map.insert(key, vec![input]);
        }
        return Ok(map);
    }

    Err(RetrieverError::InvalidParameters(
        "expected 'constituents' or 'inputs'".into(),
    ))
}

/// Accepts only names made of plain components, so keys stay inside the
/// request destination.
fn relative_name(name: &str) -> Result<&Path, RetrieverError> {
    let path = Path::new(name);
    let plain = path
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if name.is_empty() || !plain {
        return Err(RetrieverError::InvalidParameters(format!(
            "constituent name '{}' must be a relative path without '..'",
            name
        )));
    }
    Ok(path)
}

fn string_list(value: &Value, field: &str) -> Result<Vec<String>, RetrieverError> {
    let items = value.as_array().ok_or_else(|| {
        RetrieverError::InvalidParameters(format!("'{}' must be a list of strings", field))
    })?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                RetrieverError::InvalidParameters(format!("'{}' must be a list of strings", field))
            })
        })
        .collect()
}

/// Fails if the plan exceeds `max` constituents. `0` disables the check.
pub fn enforce_limit(map: &ConstituentMap, max: usize) -> Result<(), RetrieverError> {
    if max > 0 && map.len() > max {
        return Err(RetrieverError::TooManyConstituents {
            count: map.len(),
            max,
        });
    }
    Ok(())
}

/// Returns the constituent list stored at `list_path`, or runs `plan` and
/// stores its result there.
///
/// A resumed request therefore sees exactly the decomposition of its first
/// run, even if the source would answer differently now.
pub async fn load_or_plan<F>(list_path: &Path, plan: F) -> Result<ConstituentMap, RetrieverError>
where
    F: FnOnce() -> Result<ConstituentMap, RetrieverError>,
{
    if fs::try_exists(list_path).await? {
        let bytes = fs::read(list_path).await?;
        let map: ConstituentMap = serde_json::from_slice(&bytes)?;
        debug!(
            path = %list_path.display(),
            constituents = map.len(),
            "Reusing persisted constituent list"
        );
        return Ok(map);
    }

    let map = plan()?;
    if let Some(parent) = list_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(list_path);
    fs::write(&partial, serde_json::to_vec_pretty(&map)?).await?;
    fs::rename(&partial, list_path).await?;
    Ok(map)
}

/// Returns the in-progress path for `destination` (`<destination>.partial`).
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Moves a finished partial file onto its destination.
pub async fn publish(partial: &Path, destination: &Path) -> Result<PathBuf, RetrieverError> {
    fs::rename(partial, destination).await?;
    Ok(destination.to_path_buf())
}

/// Removes a partial file left by a failed attempt. Missing files are ignored.
pub async fn discard(partial: &Path) {
    if let Err(e) = fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %partial.display(), error = %e, "Could not remove partial output");
        }
    }
}

/// Creates the parent directory of `path` if needed.
pub async fn ensure_parent(path: &Path) -> Result<(), RetrieverError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_plan_from_groups() {
        let params = json!({ "constituents": { "a.tif": ["in1", "in2"], "b.tif": ["in3"] } });
        let map = plan_from_parameters(&params, Path::new("/out"), None).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map[Path::new("/out/a.tif")], vec!["in1", "in2"]);
        assert_eq!(map[Path::new("/out/b.tif")], vec!["in3"]);
    }

    #[test]
    fn test_plan_rejects_names_outside_destination() {
        for name in ["../escape.tif", "/etc/passwd", "tiles/../../x.tif", "./a.tif", ""] {
            let params = json!({ "constituents": { name: ["in1"] } });
            let err = plan_from_parameters(&params, Path::new("/out"), None).unwrap_err();
            assert!(
                matches!(err, RetrieverError::InvalidParameters(_)),
                "{name} was accepted"
            );
        }

        let params = json!({ "constituents": { "tiles/a.tif": ["in1"] } });
        let map = plan_from_parameters(&params, Path::new("/out"), None).unwrap();
        assert!(map.contains_key(Path::new("/out/tiles/a.tif")));
    }

    #[test]
    fn test_plan_from_inputs_with_extension() {
        let params = json!({ "inputs": ["/raw/scene1.ntf", "/raw/scene2.ntf"] });
        let map = plan_from_parameters(&params, Path::new("/out"), Some("tif")).unwrap();

        assert_eq!(map[Path::new("/out/scene1.tif")], vec!["/raw/scene1.ntf"]);
        assert_eq!(map[Path::new("/out/scene2.tif")], vec!["/raw/scene2.ntf"]);
    }

    #[test]
    fn test_plan_rejects_colliding_inputs() {
        let params = json!({ "inputs": ["/a/scene.ntf", "/b/scene.ntf"] });
        let err = plan_from_parameters(&params, Path::new("/out"), None).unwrap_err();
        assert!(matches!(err, RetrieverError::InvalidParameters(_)));
    }

    #[test]
    fn test_plan_requires_a_shape() {
        let err = plan_from_parameters(&json!({}), Path::new("/out"), None).unwrap_err();
        assert!(matches!(err, RetrieverError::InvalidParameters(_)));

        let err = plan_from_parameters(&json!({ "inputs": [1] }), Path::new("/out"), None)
            .unwrap_err();
        assert!(matches!(err, RetrieverError::InvalidParameters(_)));
    }

    #[test]
    fn test_empty_inputs_plan_is_empty() {
        let map = plan_from_parameters(&json!({ "inputs": [] }), Path::new("/out"), None).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_enforce_limit() {
        let mut map = ConstituentMap::new();
        map.insert(PathBuf::from("/a"), vec![]);
        map.insert(PathBuf::from("/b"), vec![]);

        assert!(enforce_limit(&map, 0).is_ok());
        assert!(enforce_limit(&map, 2).is_ok());
        assert!(matches!(
            enforce_limit(&map, 1),
            Err(RetrieverError::TooManyConstituents { count: 2, max: 1 })
        ));
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/out/a.tif")),
            PathBuf::from("/out/a.tif.partial")
        );
    }

    #[tokio::test]
    async fn test_load_or_plan_reuses_persisted_list() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join(CONSTITUENT_LIST_FILE);

        let first = load_or_plan(&list, || {
            let mut map = ConstituentMap::new();
            map.insert(PathBuf::from("/out/a.tif"), vec!["in1".into()]);
            Ok(map)
        })
        .await
        .unwrap();

        let second = load_or_plan(&list, || panic!("must not re-plan"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(!partial_path(&list).exists());
    }

    #[tokio::test]
    async fn test_failed_plan_persists_nothing() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join(CONSTITUENT_LIST_FILE);

        let err = load_or_plan(&list, || Err(RetrieverError::Unreachable("catalog".into())))
            .await
            .unwrap_err();

        assert!(matches!(err, RetrieverError::Unreachable(_)));
        assert!(!list.exists());
    }

    #[tokio::test]
    async fn test_publish_and_discard() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.tif");
        let partial = partial_path(&dest);

        tokio::fs::write(&partial, b"data").await.unwrap();
        let published = publish(&partial, &dest).await.unwrap();
        assert_eq!(published, dest);
        assert!(!partial.exists());

        // Discarding a missing partial is a no-op.
        discard(&partial).await;
    }
}
