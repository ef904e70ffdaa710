use std::path::{Path, PathBuf};

/// Replace path separators the way yt-dlp does when writing the output
/// file, so the post-process step can find what was written.
pub fn sanitize_title(title: &str) -> String {
    title.replace('/', "_")
}

/// Truncate to at most `max` characters, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Locate an external tool binary.
///
/// Bundled apps don't inherit the user's shell PATH, so check a sidecar
/// next to the executable and the usual install prefixes before falling
/// back to the bare command name (Homebrew on Apple Silicon/Intel,
/// MacPorts, system and per-user pip locations).
pub fn find_tool(base_name: &str) -> PathBuf {
    let bin_name = if cfg!(windows) {
        format!("{base_name}.exe")
    } else {
        base_name.to_string()
    };

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let sidecar = exe_dir.join(&bin_name);
            if sidecar.exists() {
                tracing::info!(tool = base_name, path = %sidecar.display(), "found bundled sidecar");
                return sidecar;
            }
            // macOS .app bundles keep resources next to Contents/MacOS/
            if let Some(contents) = exe_dir.parent() {
                let resource = contents.join("Resources").join(&bin_name);
                if resource.exists() {
                    tracing::info!(tool = base_name, path = %resource.display(), "found bundled resource");
                    return resource;
                }
            }
        }
    }

    let prefixes = [
        "/opt/homebrew/bin",
        "/usr/local/bin",
        "/usr/bin",
        "/opt/local/bin",
    ];
    for prefix in prefixes {
        let candidate = Path::new(prefix).join(&bin_name);
        if candidate.exists() {
            return candidate;
        }
    }
    if let Some(home) = dirs::home_dir() {
        let candidate = home.join(".local").join("bin").join(&bin_name);
        if candidate.exists() {
            return candidate;
        }
    }

    tracing::debug!(tool = base_name, "not found in known locations, relying on PATH");
    PathBuf::from(bin_name)
}
