pub mod gen;

use cogs_core::CoreError;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;

/// Render a core error for the terminal. Schema errors keep the
/// `manifest error:` prefix even when wrapped by a link name, so they map
/// to [`EXIT_MANIFEST_ERROR`].
pub fn core_error(err: &CoreError) -> String {
    let msg = err.to_string();
    if err.is_manifest_error() && !msg.starts_with("manifest error:") {
        format!("manifest error: {msg}")
    } else {
        msg
    }
}

/// Split a comma separated flag value, dropping empty entries.
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
