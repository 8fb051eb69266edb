use crate::core::error::SceneError;
use log::warn;
use serde::Deserialize;
use std::path::Path;

/// One dialogue line destined for one voice clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneRecord {
    pub id: String,
    pub text: String,
}

#[derive(Deserialize)]
struct SceneDocument {
    #[serde(default)]
    scenes: Option<Vec<RawScene>>,
}

// Only the fields needed for voicing; everything else in a scene is ignored.
#[derive(Deserialize)]
struct RawScene {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    dialogue: Option<RawDialogue>,
}

#[derive(Deserialize)]
struct RawDialogue {
    #[serde(default)]
    text: Option<String>,
}

/// Scene ids become file names, so they may not name a path of their own.
fn is_file_safe_id(id: &str) -> bool {
    !id.contains(['/', '\\'])
        && !id.contains("..")
        && !Path::new(id).is_absolute()
}

/// Extracts voiced scenes in document order.
///
/// Entries without an id or without dialogue text are skipped, as are ids
/// that would leave the output directory. A document with no eligible scenes
/// yields an empty list, not an error. A wrongly typed `id` or `text` in any
/// entry rejects the whole document.
pub fn extract_scenes(content: &str) -> Result<Vec<SceneRecord>, SceneError> {
    let document: SceneDocument = serde_json::from_str(content)?;

    Ok(document
        .scenes
        .unwrap_or_default()
        .into_iter()
        .filter_map(|scene| {
            let id = scene.id.filter(|id| !id.is_empty())?;
            if !is_file_safe_id(&id) {
                warn!("Skipping scene with unusable id {:?}", id);
                return None;
            }
            let text = scene
                .dialogue
                .and_then(|d| d.text)
                .filter(|text| !text.is_empty())?;
            Some(SceneRecord { id, text })
        })
        .collect())
}

pub async fn load_scenes(path: &Path) -> Result<Vec<SceneRecord>, SceneError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SceneError::Read {
            path: path.display().to_string(),
            source,
        })?;
    extract_scenes(&content)
}
