//! # Scene Loading
//!
//! Resolves `--scene` to a file and turns it into the role-play block that is
//! injected into every prompt for the session.

use crate::strings::prompts;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const SCENES_DIR: &str = "scenes";
const SCENE_EXTENSIONS: &[&str] = &["yaml", "yml", "json", "txt"];

/// A loaded scene. `context` is immutable for the rest of the session.
#[derive(Debug, Clone)]
pub struct Scene {
    pub name: String,
    pub context: String,
    pub source: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SceneFile {
    name: String,
    roles: SceneRoles,
    scene: String,
    #[serde(default)]
    constraints: SceneConstraints,
}

#[derive(Debug, Deserialize)]
struct SceneRoles {
    user: String,
    client: String,
}

#[derive(Debug, Default, Deserialize)]
struct SceneConstraints {
    max_steps: Option<u32>,
    style: Option<String>,
}

impl SceneFile {
    fn render(&self) -> String {
        prompts::scene_block(
            &self.roles.client,
            &self.roles.user,
            self.scene.trim(),
            self.constraints.max_steps,
            self.constraints.style.as_deref(),
        )
    }
}

/// Loads a scene by path, or by bare name from `scenes_dir`.
pub fn load(spec: &str, scenes_dir: &Path) -> Result<Scene> {
    let path = locate(spec, scenes_dir)
        .with_context(|| {
            format!("Scene '{}' not found (looked in {})", spec, scenes_dir.display())
        })?;
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read scene {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let parsed: Option<SceneFile> = match extension.as_str() {
        "yaml" | "yml" => Some(
            serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid scene file {}", path.display()))?,
        ),
        "json" => Some(
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid scene file {}", path.display()))?,
        ),
        _ => None,
    };

    let scene = match parsed {
        Some(file) => Scene {
            context: file.render(),
            name: file.name,
            source: path,
        },
        None => {
            let text = content.trim();
            if text.is_empty() {
                bail!("Scene file {} is empty", path.display());
            }
            Scene {
                name: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| spec.to_string()),
                context: format!("\n## Role-play\n{}\n", text),
                source: path,
            }
        }
    };

    tracing::info!("Loaded scene '{}' from {}", scene.name, scene.source.display());
    Ok(scene)
}

fn locate(spec: &str, scenes_dir: &Path) -> Option<PathBuf> {
    let direct = PathBuf::from(spec);
    if direct.is_file() {
        return Some(direct);
    }

    // Only bare names are looked up in the scenes directory.
    if direct.components().count() != 1 {
        return None;
    }

    let in_dir = scenes_dir.join(spec);
    if in_dir.is_file() {
        return Some(in_dir);
    }
    SCENE_EXTENSIONS
        .iter()
        .map(|ext| scenes_dir.join(format!("{spec}.{ext}")))
        .find(|p| p.is_file())
}
