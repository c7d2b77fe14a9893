//! Mapping from problem display names to problem directory names.

/// Normalize a problem name into its directory name.
///
/// Lower-cases the name, turns every whitespace character into `_`, then drops
/// anything outside `[a-z_]`. Pure: it never consults the filesystem or the
/// catalog, so names that are not (yet) in the catalog still map.
pub fn problem_dir_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || *c == '_')
        .collect()
}
