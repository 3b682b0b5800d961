//! Configuration loading and root folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Resolve the VCHK root folder (database + captured asset spool) in
/// priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(root_folder));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_root_folder())
}

/// Locate the platform configuration file (`vchk.toml`)
pub fn locate_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/vchk/vchk.toml first, then /etc/vchk/vchk.toml
        if let Some(path) = dirs::config_dir().map(|d| d.join("vchk").join("vchk.toml")) {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/vchk/vchk.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else {
        let path = dirs::config_dir()
            .map(|d| d.join("vchk").join("vchk.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    }
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("vchk"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vchk"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("vchk"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/vchk"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("vchk"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vchk"))
    } else {
        PathBuf::from("./vchk_data")
    }
}

/// Ensure the root folder exists, creating it if missing
pub fn ensure_root_folder(root: &PathBuf) -> Result<()> {
    std::fs::create_dir_all(root)?;
    Ok(())
}
