//! Import extraction from source text.
//!
//! Intentionally regex-grade: the goal is a dependency overlay for
//! conflict detection, not a compiler-accurate module graph. Import-like
//! statements, export-from, dynamic `import(...)` / `require(...)`, and
//! the Python `import` / `from … import` forms are recognized. Output is
//! deterministic for identical input.

use regex::Regex;

/// Languages the extractor understands, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedLanguage {
    TypeScript,
    JavaScript,
    Python,
}

impl SupportedLanguage {
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.').map(|(_, ext)| ext)?;
        match ext {
            "ts" | "tsx" => Some(Self::TypeScript),
            "js" | "jsx" => Some(Self::JavaScript),
            "py" => Some(Self::Python),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
        }
    }

    fn is_js_family(&self) -> bool {
        matches!(self, Self::TypeScript | Self::JavaScript)
    }
}

/// Extracts module references from one file's content.
pub trait ImportExtractor: Send + Sync {
    /// `(content, path) → [module reference]`, language detected from the
    /// path's extension. Unsupported extensions yield nothing.
    fn extract(&self, content: &str, path: &str) -> Vec<String>;
}

/// The default regex-grade extractor.
pub struct RegexImportExtractor {
    js_patterns: Vec<Regex>,
    py_import: Regex,
    py_from: Regex,
}

impl RegexImportExtractor {
    pub fn new() -> Self {
        // Compiled once; the patterns are fixed so unwrap is safe here.
        let js_patterns = [
            // import defaultExport, { a, b } from 'mod' (multiline bodies ok)
            r#"import\s+[\w$*{},\s]*?from\s+['"]([^'"]+)['"]"#,
            // export { a } from 'mod' / export * from 'mod'
            r#"export\s+[\w$*{},\s]*?from\s+['"]([^'"]+)['"]"#,
            // bare side-effect import: import 'mod'
            r#"import\s*['"]([^'"]+)['"]"#,
            // dynamic import('mod')
            r#"import\s*\(\s*['"]([^'"]+)['"]\s*\)"#,
            // require('mod')
            r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#,
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect();

        Self {
            js_patterns,
            py_import: Regex::new(r"(?m)^\s*import\s+([\w.]+(?:\s+as\s+\w+)?(?:\s*,\s*[\w.]+(?:\s+as\s+\w+)?)*)").unwrap(),
            py_from: Regex::new(r"(?m)^\s*from\s+([.\w]+)\s+import\b").unwrap(),
        }
    }

    fn extract_js(&self, content: &str) -> Vec<String> {
        let mut refs = Vec::new();
        for pattern in &self.js_patterns {
            for caps in pattern.captures_iter(content) {
                push_unique(&mut refs, caps[1].to_string());
            }
        }
        refs
    }

    fn extract_python(&self, content: &str) -> Vec<String> {
        let mut refs = Vec::new();
        for caps in self.py_import.captures_iter(content) {
            for item in caps[1].split(',') {
                let module = item.trim().split_whitespace().next().unwrap_or_default();
                if !module.is_empty() {
                    push_unique(&mut refs, python_module_to_path(module));
                }
            }
        }
        for caps in self.py_from.captures_iter(content) {
            push_unique(&mut refs, python_module_to_path(&caps[1]));
        }
        refs
    }
}

impl Default for RegexImportExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportExtractor for RegexImportExtractor {
    fn extract(&self, content: &str, path: &str) -> Vec<String> {
        match SupportedLanguage::from_path(path) {
            Some(lang) if lang.is_js_family() => self.extract_js(content),
            Some(SupportedLanguage::Python) => self.extract_python(content),
            _ => Vec::new(),
        }
    }
}

fn push_unique(refs: &mut Vec<String>, candidate: String) {
    if !refs.contains(&candidate) {
        refs.push(candidate);
    }
}

/// Convert a dotted Python module reference to path form so the resolver
/// probes one grammar: `a.b` → `a/b`, `.mod` → `./mod`, `..pkg.mod` →
/// `../pkg/mod`.
fn python_module_to_path(module: &str) -> String {
    let dots = module.chars().take_while(|c| *c == '.').count();
    let rest = module[dots..].replace('.', "/");
    match dots {
        0 => rest,
        1 => format!("./{rest}"),
        n => format!("{}{rest}", "../".repeat(n - 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(content: &str, path: &str) -> Vec<String> {
        RegexImportExtractor::new().extract(content, path)
    }

    #[test]
    fn js_import_forms() {
        let src = r#"
import React from 'react';
import { useState, useEffect } from "react";
import * as path from './path-utils';
import './side-effect.css';
export { helper } from '../shared/helpers';
const lazy = await import('./lazy-page');
const legacy = require('./legacy');
"#;
        let refs = extract(src, "src/app.tsx");
        assert_eq!(
            refs,
            vec![
                "react",
                "./path-utils",
                "../shared/helpers",
                "./side-effect.css",
                "./lazy-page",
                "./legacy",
            ]
        );
    }

    #[test]
    fn js_multiline_member_import() {
        let src = "import {\n  alpha,\n  beta,\n} from './members';\n";
        assert_eq!(extract(src, "a.js"), vec!["./members"]);
    }

    #[test]
    fn python_import_forms() {
        let src = r#"
import os
import utils.parsing as parsing, json
from .sibling import helper
from ..pkg.nested import thing
from models import User
"#;
        let refs = extract(src, "src/job.py");
        assert_eq!(
            refs,
            vec![
                "os",
                "utils/parsing",
                "json",
                "./sibling",
                "../pkg/nested",
                "models",
            ]
        );
    }

    #[test]
    fn unsupported_extension_yields_nothing() {
        assert!(extract("import x from 'y';", "README.md").is_empty());
        assert!(extract("import x from 'y';", "noext").is_empty());
    }

    #[test]
    fn deterministic_and_deduplicated() {
        let src = "import a from './a';\nimport again from './a';\n";
        let first = extract(src, "m.ts");
        let second = extract(src, "m.ts");
        assert_eq!(first, vec!["./a"]);
        assert_eq!(first, second);
    }
}
