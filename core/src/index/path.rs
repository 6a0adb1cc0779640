//! Rewrites tile output paths for the consumers of an index

/// Prefix that lets GDAL open a remote file over HTTP directly
pub const GDAL_HTTP_PREFIX: &str = "/vsicurl/";

const REMOTE_PREFIXES: [&str; 4] = ["http://", "https://", "s3://", GDAL_HTTP_PREFIX];

/// Checks whether a path points to a remote location
pub fn path_is_remote(path: &str) -> bool {
    REMOTE_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Returns the path to record in an index for a tile whose output is stored
/// at `orig_path`.
///
/// If `base_path` is given, everything but the trailing
/// `<zoom>/<row>/<col>.<ext>` part of `orig_path` is replaced by it. If
/// `for_gdal` is set, remote paths get the [`GDAL_HTTP_PREFIX`].
pub fn resolve_tile_path(orig_path: &str, base_path: Option<&str>, for_gdal: bool) -> String {
    let path = match base_path {
        Some(base) => join(base, &tile_suffix(orig_path)),
        None => orig_path.to_string(),
    };
    if for_gdal && path_is_remote(&path) && !path.starts_with(GDAL_HTTP_PREFIX) {
        format!("{GDAL_HTTP_PREFIX}{path}")
    } else {
        path
    }
}

/// The last three segments of a path
fn tile_suffix(path: &str) -> String {
    let segments = path.split('/').collect::<Vec<_>>();
    segments[segments.len().saturating_sub(3)..].join("/")
}

fn join(base: &str, suffix: &str) -> String {
    if base.is_empty() {
        suffix.to_string()
    } else if base.ends_with('/') {
        format!("{base}{suffix}")
    } else {
        format!("{base}/{suffix}")
    }
}
