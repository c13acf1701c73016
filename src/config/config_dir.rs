use std::path::PathBuf;

use tracing::debug;

use super::error::{ConfigError, ConfigResult};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Debug builds always read `./config.toml`; release builds prefer the per-user
/// config directory and fall back to the working directory.
pub fn find_config_file(use_local: bool) -> PathBuf {
    let local = PathBuf::from(format!("./{}", CONFIG_FILE_NAME));
    if use_local {
        return local;
    }

    #[cfg(unix)]
    let base = std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"));
    #[cfg(windows)]
    let base = std::env::var_os("APPDATA").map(PathBuf::from);
    #[cfg(not(any(unix, windows)))]
    let base: Option<PathBuf> = None;

    base.map(|dir| dir.join(crate::APPLICATION_NAME).join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
        .unwrap_or(local)
}

pub fn read_config(use_local: bool) -> ConfigResult<Vec<u8>> {
    let filename = find_config_file(use_local);

    tracing::trace!("looking for config at: {}", filename.display());
    if !filename.exists() {
        return Err(ConfigError::ConfigNotFound);
    }

    let filename = filename.canonicalize()?;
    debug!("using {} as configuration file", filename.display());

    Ok(std::fs::read(filename)?)
}
