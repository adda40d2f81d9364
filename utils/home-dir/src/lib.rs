use dirs::home_dir;
use std::path::PathBuf;

/// Environment variable that overrides where recordings and the recording
/// log live.
pub const REPLAY_DIR_ENV_VAR: &str = "RECORD_REPLAY_DIRECTORY";

/// Returns the directory holding `recordings.log`, the recording files and
/// `config.toml`.
///
/// - If `RECORD_REPLAY_DIRECTORY` is set it is used verbatim. Capture may not
///   have created it yet, so a missing path is fine, but an existing path
///   that is not a directory is an error.
/// - Otherwise this is `~/.replay`.
pub fn find_replay_dir() -> std::io::Result<PathBuf> {
    let replay_dir_env = std::env::var(REPLAY_DIR_ENV_VAR)
        .ok()
        .filter(|val| !val.is_empty());
    find_replay_dir_from_env(replay_dir_env.as_deref())
}

fn find_replay_dir_from_env(replay_dir_env: Option<&str>) -> std::io::Result<PathBuf> {
    match replay_dir_env {
        Some(val) => {
            let path = PathBuf::from(val);
            match std::fs::metadata(&path) {
                Ok(metadata) if !metadata.is_dir() => Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{REPLAY_DIR_ENV_VAR} points to {val:?}, but that path is not a directory"),
                )),
                Ok(_) => Ok(path),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(path),
                Err(err) => Err(std::io::Error::new(
                    err.kind(),
                    format!("failed to read {REPLAY_DIR_ENV_VAR} {val:?}: {err}"),
                )),
            }
        }
        None => {
            let mut p = home_dir().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not find home directory",
                )
            })?;
            p.push(".replay");
            Ok(p)
        }
    }
}
