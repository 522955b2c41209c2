//! Module reference resolution.
//!
//! Turns an import reference from a source file into a concrete
//! repo-relative path, given the set of all known paths. Non-relative
//! references are external libraries and resolve to none.

use std::collections::HashSet;

/// Probe order for file suffixes, then directory entry points.
const FILE_SUFFIXES: &[&str] = &["", ".ts", ".tsx", ".js", ".jsx", ".py"];
const INDEX_SUFFIXES: &[&str] = &[
    "/index.ts",
    "/index.tsx",
    "/index.js",
    "/index.jsx",
    "/__init__.py",
];

/// Resolve `reference` as imported from `source_file` against the known
/// path set. Returns the first existing candidate, or `None` for external
/// or unresolvable references.
pub fn resolve_import(
    source_file: &str,
    reference: &str,
    known_paths: &HashSet<String>,
) -> Option<String> {
    if !reference.starts_with("./") && !reference.starts_with("../") {
        return None;
    }

    let base = match source_file.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    };
    let joined = normalize_path(base, reference)?;

    for suffix in FILE_SUFFIXES.iter().chain(INDEX_SUFFIXES) {
        let candidate = if joined.is_empty() {
            suffix.trim_start_matches('/').to_string()
        } else {
            format!("{joined}{suffix}")
        };
        if known_paths.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Join and normalize, resolving `.` and `..` segments. References that
/// escape the repo root resolve to none.
fn normalize_path(base: &str, reference: &str) -> Option<String> {
    let mut stack: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in reference.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop()?;
            }
            other => stack.push(other),
        }
    }
    Some(stack.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> HashSet<String> {
        items.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn resolves_relative_with_suffix_probing() {
        let known = paths(&["src/dep.ts", "src/other.py"]);
        assert_eq!(
            resolve_import("src/a.ts", "./dep", &known),
            Some("src/dep.ts".to_string())
        );
        assert_eq!(
            resolve_import("src/a.ts", "./other", &known),
            Some("src/other.py".to_string())
        );
    }

    #[test]
    fn exact_match_wins_over_suffixes() {
        let known = paths(&["src/dep", "src/dep.ts"]);
        assert_eq!(
            resolve_import("src/a.ts", "./dep", &known),
            Some("src/dep".to_string())
        );
    }

    #[test]
    fn parent_references_resolve() {
        let known = paths(&["shared/util.ts"]);
        assert_eq!(
            resolve_import("src/feature/a.ts", "../../shared/util", &known),
            Some("shared/util.ts".to_string())
        );
    }

    #[test]
    fn directory_entry_points() {
        let known = paths(&["src/widgets/index.tsx", "src/pkg/__init__.py"]);
        assert_eq!(
            resolve_import("src/a.ts", "./widgets", &known),
            Some("src/widgets/index.tsx".to_string())
        );
        assert_eq!(
            resolve_import("src/job.py", "./pkg", &known),
            Some("src/pkg/__init__.py".to_string())
        );
    }

    #[test]
    fn suffix_order_prefers_ts_over_js() {
        let known = paths(&["src/dep.js", "src/dep.tsx"]);
        assert_eq!(
            resolve_import("src/a.ts", "./dep", &known),
            Some("src/dep.tsx".to_string())
        );
    }

    #[test]
    fn bare_specifiers_are_external() {
        let known = paths(&["react.ts"]);
        assert_eq!(resolve_import("src/a.ts", "react", &known), None);
        assert_eq!(resolve_import("src/a.ts", "@scope/pkg", &known), None);
    }

    #[test]
    fn escaping_the_root_resolves_to_none() {
        let known = paths(&["a.ts"]);
        assert_eq!(resolve_import("a.ts", "../../outside", &known), None);
    }

    #[test]
    fn unresolvable_reference_is_none() {
        let known = paths(&["src/dep.ts"]);
        assert_eq!(resolve_import("src/a.ts", "./missing", &known), None);
    }
}
