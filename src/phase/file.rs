use super::*;
use anyhow::Context;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

#[derive(Default, Serialize, Deserialize)]
struct PersistedStatus {
    #[serde(rename = "auctionStatus", default)]
    auction_status: Option<String>,
}

/// Phase store keeping the status in a small JSON file
///
/// Survives process restarts the way the flag survives page reloads.
pub struct FilePhaseStore {
    path: PathBuf,
}

impl FilePhaseStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }

    pub fn new_shared(path: impl AsRef<Path>) -> SharedPhaseStore {
        Arc::new(Self::new(path))
    }
}

impl PhaseStore for FilePhaseStore {
    fn load_raw(&self) -> Result<Option<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading auction status from {}", self.path.display()))
            }
        };

        let persisted: PersistedStatus = serde_json::from_str(&content)
            .with_context(|| format!("parsing auction status in {}", self.path.display()))?;
        Ok(persisted.auction_status)
    }

    fn store_raw(&self, value: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(&PersistedStatus {
            auction_status: Some(value.to_owned()),
        })?;

        // write-then-rename, so readers never see a half written file
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("writing auction status to {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
