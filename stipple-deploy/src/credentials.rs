use std::{io::ErrorKind, path::PathBuf};

use crate::DeployError;

pub const DEFAULT_API_KEY_FILES: [&str; 2] = ["runpod-api-key.txt", "../runpod-api-key.txt"];

/// Picks the key out of a credentials file: the second line if there is one,
/// otherwise the first.
pub fn read_api_key(contents: &str) -> Option<String> {
    let lines: Vec<&str> = contents.trim().lines().collect();
    let key = match lines.as_slice() {
        [] => return None,
        [only] => only,
        [_, second, ..] => second,
    };
    let key = key.trim();
    (!key.is_empty()).then(|| key.to_string())
}

/// Reads the key from the first candidate file that exists.
pub fn load_api_key(candidates: &[PathBuf]) -> Result<String, DeployError> {
    for path in candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "read API key file");
                return read_api_key(&contents)
                    .ok_or_else(|| DeployError::MissingCredentials(vec![path.clone()]));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(DeployError::Io {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
    Err(DeployError::MissingCredentials(candidates.to_vec()))
}
