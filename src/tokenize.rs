//! Identifier tokenization shared by the fragmenter, the concept
//! extractor and the similarity edges.
//!
//! Tokens are alphanumeric/underscore runs, additionally split at
//! `snake_case` and `camelCase` boundaries so that `XyzGizmo` and
//! `xyz_gizmo` both yield `xyz` and `gizmo` (plus the full token).
//! Everything is lowercased; short tokens and stopwords are dropped.
//!
//! Profiles adjust filtering per file family: code files use the full
//! keyword stopword set, documentation keeps prose words, data files
//! accept shorter keys.

use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("invalid identifier regex"));

/// Keywords of the supported languages plus placeholder noise words.
/// Lowercase; matching is case-insensitive.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Python
        "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del",
        "elif", "else", "except", "finally", "for", "from", "global", "import", "in", "is",
        "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with",
        "yield", "none", "true", "false",
        // Rust
        "fn", "let", "mut", "impl", "pub", "use", "mod", "struct", "enum", "trait", "match",
        "loop", "ref", "move", "crate", "super", "dyn", "where", "unsafe", "extern", "const",
        "static", "type",
        // JavaScript / TypeScript
        "var", "function", "new", "this", "typeof", "instanceof", "null", "undefined",
        "export", "default", "interface", "extends", "implements", "switch", "case",
        // Go
        "func", "package", "chan", "defer", "go", "map", "range", "select", "fallthrough",
        "var", "nil",
        // Placeholder noise
        "todo", "fixme", "note", "hack", "xxx", "foo", "bar", "baz", "qux", "tmp", "temp",
        "self", "cls", "args", "kwargs",
    ]
    .into_iter()
    .collect()
});

/// Filtering profile, derived from the file family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenProfile {
    Code,
    Docs,
    Data,
    Generic,
}

const CODE_EXTENSIONS: &[&str] = &[
    "py", "pyi", "pyw", "rs", "js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts", "go",
    "java", "kt", "scala", "c", "h", "cpp", "hpp", "cc", "cs", "rb", "php", "swift", "sh",
    "bash", "zsh", "lua", "pl", "ex", "exs", "hs", "ml", "zig", "nim",
];

const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "mdx", "rst", "txt", "adoc", "tex"];

const DATA_EXTENSIONS: &[&str] =
    &["yaml", "yml", "json", "jsonl", "toml", "ini", "env", "csv", "xml"];

impl TokenProfile {
    /// Classify a path by extension. Extensionless files (Dockerfile,
    /// Makefile) count as generic.
    pub fn from_path(path: &str) -> Self {
        let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        if CODE_EXTENSIONS.contains(&ext.as_str()) {
            TokenProfile::Code
        } else if DOC_EXTENSIONS.contains(&ext.as_str()) {
            TokenProfile::Docs
        } else if DATA_EXTENSIONS.contains(&ext.as_str()) {
            TokenProfile::Data
        } else {
            TokenProfile::Generic
        }
    }

    pub fn min_len(&self) -> usize {
        match self {
            TokenProfile::Data => 2,
            _ => 3,
        }
    }

    fn uses_stopwords(&self) -> bool {
        matches!(self, TokenProfile::Code | TokenProfile::Generic)
    }
}

/// Whether the path's extension marks a code file.
pub fn is_code_path(path: &str) -> bool {
    TokenProfile::from_path(path) == TokenProfile::Code
}

/// Split one identifier at snake_case and camelCase boundaries.
/// `HTTPServer` yields `http` and `server`; `parse_diff` yields
/// `parse` and `diff`. Output is lowercase, may contain duplicates.
fn split_subtokens(ident: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    for piece in ident.split('_').filter(|p| !p.is_empty()) {
        let chars: Vec<char> = piece.chars().collect();
        let mut start = 0;
        for i in 1..chars.len() {
            let boundary = (chars[i].is_uppercase() && chars[i - 1].is_lowercase())
                // Acronym end: "HTTPServer" splits before the 'S'
                || (chars[i].is_uppercase()
                    && i + 1 < chars.len()
                    && chars[i + 1].is_lowercase()
                    && chars[i - 1].is_uppercase());
            if boundary {
                parts.push(chars[start..i].iter().collect::<String>().to_lowercase());
                start = i;
            }
        }
        parts.push(chars[start..].iter().collect::<String>().to_lowercase());
    }
    parts
}

fn keep(token: &str, profile: TokenProfile) -> bool {
    token.len() >= profile.min_len()
        && !(profile.uses_stopwords() && STOPWORDS.contains(token))
        && !token.chars().all(|c| c.is_ascii_digit())
}

/// Extract the deduplicated identifier set of a text.
pub fn extract_identifiers(text: &str, profile: TokenProfile) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for m in IDENT_RE.find_iter(text) {
        let raw = m.as_str();
        let lowered = raw.to_lowercase();
        if keep(&lowered, profile) {
            out.insert(lowered);
        }
        for sub in split_subtokens(raw) {
            if keep(&sub, profile) {
                out.insert(sub);
            }
        }
    }
    out
}

/// Extract identifiers with duplicates preserved, for term-frequency
/// computation. Sub-tokens are not expanded here: TF over full tokens
/// keeps vectors sparse.
pub fn extract_identifier_list(text: &str, profile: TokenProfile) -> Vec<String> {
    IDENT_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| keep(t, profile))
        .collect()
}
