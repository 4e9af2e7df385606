use crate::domain::pet::PetState;
use crate::error::TabbyError;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Pet persistence: one JSON file shared across daemon restarts. Writes are
/// whole-file replacements (temp file + rename).
pub struct PetStore {
    path: PathBuf,
}

impl PetStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join("pet.json"),
        }
    }

    pub async fn load(&self) -> PetState {
        match fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => PetState::default(),
        }
    }

    pub async fn save(&self, pet: &PetState) -> Result<(), TabbyError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(pet)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Consume a thought dropped next to the pet file by the external
    /// generator. The file is removed once read.
    pub async fn take_thought(&self) -> Option<String> {
        let path = self.path.with_file_name("thought.txt");
        let content = fs::read_to_string(&path).await.ok()?;
        let _ = fs::remove_file(&path).await;
        let thought = content.trim();
        if thought.is_empty() {
            None
        } else {
            Some(thought.to_string())
        }
    }
}
