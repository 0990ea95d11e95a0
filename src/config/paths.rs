//!
//! Platform-native path resolution for BingMux configuration.
//!
//! - Linux/Unix: XDG Base Directory Specification (~/.config)
//! - macOS: Application Support directories (~/Library/...)
//! - Windows: Known Folder system (%APPDATA%)
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::error::{ProxyError, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/* --- constants ------------------------------------------------------------------------------- */

/// Application name for directory resolution
const APP_NAME: &str = "bingmux";
/// Organization qualifier for directory resolution
const ORGANIZATION: &str = "com";
/// Organization name for directory resolution
const ORG_NAME: &str = "SkyCorp";
/// Configuration file name inside the config directories
const CONFIG_FILE_NAME: &str = "config.toml";

/* --- public functions ------------------------------------------------------------------------ */

/// Get the user configuration directory for BingMux
///
/// Returns the platform-appropriate configuration directory:
/// - Linux: ~/.config/bingmux/
/// - macOS: ~/Library/Application Support/com.SkyCorp.bingmux/
/// - Windows: %APPDATA%/SkyCorp/bingmux/config/
///
/// Does not touch the filesystem; see [`ensure_user_config_dir`].
///
/// # Returns
/// * `Ok(PathBuf)` - Path to user configuration directory
/// * `Err(ProxyError)` - Unable to determine config directory
pub fn user_config_dir() -> Result<PathBuf> {
    Ok(get_project_dirs()?.config_dir().to_path_buf())
}

/// Get the user configuration directory, creating it if missing
pub fn ensure_user_config_dir() -> Result<PathBuf> {
    let config_dir = user_config_dir()?;
    ensure_directory_exists(&config_dir)?;
    Ok(config_dir)
}

/// Get the system configuration directory for BingMux
///
/// - Linux: /etc/bingmux/
/// - macOS: /Library/Preferences/bingmux/
/// - Windows: %PROGRAMDATA%/bingmux/
///
/// Note: Does NOT create the directory (requires admin privileges)
pub fn system_config_dir() -> Result<PathBuf> {
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Ok(PathBuf::from("/etc").join(APP_NAME))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(PathBuf::from("/Library/Preferences").join(APP_NAME))
    }

    #[cfg(windows)]
    {
        std::env::var("PROGRAMDATA").map(|path| PathBuf::from(path).join(APP_NAME)).map_err(|_| {
            ProxyError::Config("PROGRAMDATA environment variable not found".to_string())
        })
    }
}

/// Get the default user configuration file path
pub fn user_config_file() -> Result<PathBuf> {
    Ok(user_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Get the system configuration file path
pub fn system_config_file() -> Result<PathBuf> {
    Ok(system_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand tilde (~) and environment variables in file paths
///
/// # Arguments
/// * `path` - Path string that may contain ~ or environment variables
///
/// # Returns
/// * `Ok(PathBuf)` - Expanded path
/// * `Err(ProxyError)` - Path expansion failed
///
/// # Examples
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let expanded = bingmux::config::paths::expand_path("~/.config/bingmux/config.toml")?;
/// assert!(!expanded.to_string_lossy().starts_with('~'));
/// # Ok(())
/// # }
/// ```
pub fn expand_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path_str = path.as_ref().to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        return match directories::UserDirs::new() {
            Some(dirs) => Ok(dirs.home_dir().join(rest)),
            None => Err(ProxyError::Config(
                "Unable to determine user home directory for tilde expansion".to_string(),
            )),
        };
    }

    if path_str.contains('$') {
        let expanded = shellexpand::full(&path_str).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to expand environment variables in path '{}': {}",
                path_str, e
            ))
        })?;
        return Ok(PathBuf::from(expanded.as_ref()));
    }

    Ok(path.as_ref().to_path_buf())
}

/// Check if a configuration file exists and is readable
///
/// # Arguments
/// * `path` - Path to configuration file to check
///
/// # Returns
/// * `Ok(())` - File exists and is readable
/// * `Err(ProxyError)` - File doesn't exist, isn't readable, or is invalid
pub fn validate_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ProxyError::Config(format!(
            "Configuration file '{}' does not exist",
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(ProxyError::Config(format!(
            "Configuration path '{}' exists but is not a regular file",
            path.display()
        )));
    }

    std::fs::File::open(path).map_err(|e| {
        ProxyError::Config(format!(
            "Configuration file '{}' exists but cannot be read: {}\n\
             \n\
             Please check file permissions. You can fix this with: chmod 644 '{}'",
            path.display(),
            e,
            path.display()
        ))
    })?;

    Ok(())
}

/// Get all implicit configuration file paths in precedence order (highest first)
pub fn config_file_paths() -> Vec<PathBuf> {
    [user_config_file(), system_config_file()].into_iter().filter_map(|p| p.ok()).collect()
}

/* --- private functions ----------------------------------------------------------------------- */

/// Get ProjectDirs instance for BingMux
fn get_project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from(ORGANIZATION, ORG_NAME, APP_NAME).ok_or_else(|| {
        ProxyError::Config(
            "Unable to determine user directories. Please ensure your user account has a valid \
             home directory."
                .to_string(),
        )
    })
}

/// Ensure a directory exists, creating it if necessary
fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if path.exists() {
        if !path.is_dir() {
            return Err(ProxyError::Config(format!(
                "Path '{}' exists but is not a directory",
                path.display()
            )));
        }
        return Ok(());
    }

    std::fs::create_dir_all(path).map_err(|e| {
        ProxyError::Config(format!(
            "Failed to create configuration directory '{}': {}",
            path.display(),
            e
        ))
    })
}

/* --- tests ----------------------------------------------------------------------------------- */
