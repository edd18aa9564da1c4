use crate::HubError;
use exechub_runtime::{load_recipe, ContainerEngine, Recipe, RuntimeError, RECIPE_FILE};
use exechub_schema::{parse_manifest_file, ImageIdentity, Manifest, MANIFEST_FILE};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MODULE_EXTENSIONS: &[&str] = &["py"];
const MAX_MODULE_DEPTH: usize = 3;

/// Entry-module candidates in an artifact directory, sorted.
pub fn find_entry_modules(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    collect_modules(dir, 0, &mut found);
    found.sort();
    found
}

fn collect_modules(dir: &Path, depth: usize, found: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let hidden = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            if depth + 1 < MAX_MODULE_DEPTH {
                collect_modules(&path, depth + 1, found);
            }
        } else if path
            .extension()
            .is_some_and(|ext| MODULE_EXTENSIONS.iter().any(|m| ext == *m))
        {
            found.push(path);
        }
    }
}

/// Checks an artifact directory and turns it into an engine image.
pub struct ImageBuilder<'a> {
    engine: &'a dyn ContainerEngine,
    namespace: &'a str,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(engine: &'a dyn ContainerEngine, namespace: &'a str) -> Self {
        Self { engine, namespace }
    }

    pub fn require_recipe(&self, dir: &Path) -> Result<(), HubError> {
        let recipe = dir.join(RECIPE_FILE);
        if recipe.is_file() {
            Ok(())
        } else {
            Err(HubError::RecipeMissing(recipe))
        }
    }

    pub fn load_manifest(&self, dir: &Path) -> Result<Manifest, HubError> {
        Ok(parse_manifest_file(dir.join(MANIFEST_FILE))?)
    }

    pub fn check_recipe(&self, dir: &Path) -> Result<Recipe, HubError> {
        Ok(load_recipe(dir)?)
    }

    /// A declared entrypoint must exist. Without one, a directory with no
    /// module still builds; it can only fail later, when started.
    pub fn check_entry_modules(&self, dir: &Path, manifest: &Manifest) -> Result<(), HubError> {
        if let Some(ref entrypoint) = manifest.entrypoint {
            if !dir.join(entrypoint).is_file() {
                return Err(HubError::ModuleInvalid(format!(
                    "entrypoint '{entrypoint}' not found in {}",
                    dir.display()
                )));
            }
            return Ok(());
        }
        if find_entry_modules(dir).is_empty() {
            warn!(
                "no entry module found in {}; the image may fail its usage test",
                dir.display()
            );
        }
        Ok(())
    }

    pub fn identity(&self, manifest: &Manifest) -> ImageIdentity {
        ImageIdentity::from_manifest(self.namespace, manifest)
    }

    pub fn build_image(&self, dir: &Path, identity: &ImageIdentity) -> Result<(), HubError> {
        if !self.engine.available() {
            return Err(RuntimeError::EngineUnavailable(self.engine.name().to_owned()).into());
        }
        info!("building {identity} from {} with {}", dir.display(), self.engine.name());
        self.engine.build(dir, &identity.tag())?;
        info!("built {identity}");
        Ok(())
    }
}
