//! Host-specific paths for mediagrab
//!
//! Resolves the scratch directory and the yt-dlp / ffmpeg executables.

use std::path::PathBuf;
use tracing::debug;

/// Returns the default scratch directory for downloaded artifacts
/// - macOS: ~/Library/Caches/mediagrab
/// - Windows: %LOCALAPPDATA%\mediagrab
/// - Linux: ~/.cache/mediagrab
pub fn default_scratch_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("mediagrab")
}

/// Returns the path to the yt-dlp executable, if one can be found
pub fn ytdlp_path() -> Option<PathBuf> {
    find_tool("yt-dlp")
}

/// Returns the path to the ffmpeg executable, if one can be found
pub fn ffmpeg_path() -> Option<PathBuf> {
    find_tool("ffmpeg")
}

/// Look next to the executable, then on PATH, then in common install locations
fn find_tool(name: &str) -> Option<PathBuf> {
    let binary_name = format!("{}{}", name, exe_extension());

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let adjacent = exe_dir.join(&binary_name);
            if adjacent.is_file() {
                debug!("Using bundled {}: {:?}", name, adjacent);
                return Some(adjacent);
            }
        }
    }

    if let Ok(path) = which::which(&binary_name) {
        debug!("Using {} from PATH: {:?}", name, path);
        return Some(path);
    }

    let common_dirs = [
        "/opt/homebrew/bin",
        "/usr/local/bin",
        "/usr/bin",
    ];
    for dir in common_dirs {
        let candidate = PathBuf::from(dir).join(&binary_name);
        if candidate.is_file() {
            debug!("Using {} from common path: {:?}", name, candidate);
            return Some(candidate);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let candidate = home.join(".local").join("bin").join(&binary_name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    None
}

/// Platform-specific executable extension
pub fn exe_extension() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        ".exe"
    }
    #[cfg(not(target_os = "windows"))]
    {
        ""
    }
}
