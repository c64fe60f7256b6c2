// Canonical path helpers
// Snapshot paths are root-relative, slash separated and always start with '/'
// Local storage paths are relative to the storage root: "<folder>/<path>"

/// Normalize a path string into canonical form.
///
/// Backslashes become slashes, empty and `.` segments are dropped, `..`
/// pops a segment, and the result always starts with `/` and never ends
/// with one (except the root itself).
pub fn canonicalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    format!("/{}", segments.join("/"))
}

/// Canonical path of `name` inside the canonical folder `parent`.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" || parent.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Storage-relative path of a canonical path inside the synced local folder.
pub fn local_path(folder: &str, path: &str) -> String {
    let folder = folder.trim_matches('/');
    let path = path.trim_start_matches('/');
    if folder.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", folder, path)
    }
}

/// Split a path into (parent, file name).
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}
