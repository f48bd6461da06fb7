//! AST fragmentation via tree-sitter.
//!
//! Top-level definitions (functions, classes, impls, type declarations)
//! become fragments; whatever lies between them is left for the engine's
//! generic gap fill. Containers larger than the fragment size limit are
//! split at method boundaries, with the container's header kept as its
//! own fragment so the diff mapper can pull "the enclosing container"
//! into the core set.
//!
//! A parse tree with errors downgrades the whole file to the next
//! strategy rather than emitting half-right spans.

use std::sync::Arc;

use tree_sitter::{Node, Parser};

use crate::fragment::{make_fragment, FragmentStrategy, StrategyOutcome, MAX_FRAGMENT_LINES};
use crate::tokenize::TokenProfile;
use crate::types::{Fragment, FragmentKind};

/// Languages with a bundled grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lang {
    Python,
    Rust,
    JavaScript,
    TypeScript,
    Go,
}

impl Lang {
    fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit('.').next()?;
        match ext {
            "py" | "pyi" | "pyw" => Some(Lang::Python),
            "rs" => Some(Lang::Rust),
            "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
            "ts" | "tsx" | "mts" | "cts" => Some(Lang::TypeScript),
            "go" => Some(Lang::Go),
            _ => None,
        }
    }

    fn grammar(self) -> tree_sitter::Language {
        match self {
            Lang::Python => tree_sitter_python::LANGUAGE.into(),
            Lang::Rust => tree_sitter_rust::LANGUAGE.into(),
            Lang::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Lang::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Lang::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }

    /// Map a top-level node kind to a fragment kind.
    fn classify(self, kind: &str) -> Option<FragmentKind> {
        let mapped = match self {
            Lang::Python => match kind {
                "function_definition" => FragmentKind::Function,
                "class_definition" => FragmentKind::Class,
                _ => return None,
            },
            Lang::Rust => match kind {
                "function_item" => FragmentKind::Function,
                "struct_item" | "enum_item" | "trait_item" | "impl_item" | "mod_item" => {
                    FragmentKind::Class
                }
                _ => return None,
            },
            Lang::JavaScript | Lang::TypeScript => match kind {
                "function_declaration" | "generator_function_declaration" => {
                    FragmentKind::Function
                }
                "class_declaration" | "abstract_class_declaration" | "interface_declaration"
                | "enum_declaration" => FragmentKind::Class,
                "type_alias_declaration" if self == Lang::TypeScript => FragmentKind::Class,
                _ => return None,
            },
            Lang::Go => match kind {
                "function_declaration" => FragmentKind::Function,
                "method_declaration" => FragmentKind::Method,
                "type_declaration" => FragmentKind::Class,
                _ => return None,
            },
        };
        Some(mapped)
    }

    /// Node kinds that count as methods when splitting a container.
    fn is_method_kind(self, kind: &str) -> bool {
        match self {
            Lang::Python => matches!(kind, "function_definition" | "decorated_definition"),
            Lang::Rust => kind == "function_item",
            Lang::JavaScript | Lang::TypeScript => kind == "method_definition",
            Lang::Go => false,
        }
    }
}

/// 1-based inclusive line span of a node. Tree-sitter's end position
/// points past the last byte; a node ending exactly at a newline would
/// otherwise claim the following line.
fn span(node: Node) -> (u32, u32) {
    let start = node.start_position().row as u32 + 1;
    let mut end_row = node.end_position().row as u32;
    if node.end_position().column == 0 && end_row > node.start_position().row as u32 {
        end_row -= 1;
    }
    (start, end_row + 1)
}

/// Unwrap decorator/export wrappers: the span stays the wrapper's, the
/// kind and name come from the inner definition.
fn unwrap_node(node: Node) -> Node {
    match node.kind() {
        "decorated_definition" => node.child_by_field_name("definition").unwrap_or(node),
        "export_statement" => node.child_by_field_name("declaration").unwrap_or(node),
        _ => node,
    }
}

fn node_symbol(lang: Lang, node: Node, source: &[u8]) -> Option<String> {
    let name_node = match (lang, node.kind()) {
        (Lang::Rust, "impl_item") => node.child_by_field_name("type"),
        (Lang::Go, "type_declaration") => {
            // First type_spec carries the declared name
            let mut cursor = node.walk();
            let spec = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "type_spec");
            spec.and_then(|s| s.child_by_field_name("name"))
        }
        _ => node.child_by_field_name("name"),
    }?;
    name_node.utf8_text(source).ok().map(|s| s.to_string())
}

pub struct AstStrategy;

impl FragmentStrategy for AstStrategy {
    fn name(&self) -> &'static str {
        "ast"
    }

    fn can_handle(&self, path: &str, _content: &str) -> bool {
        Lang::from_path(path).is_some()
    }

    fn fragment(&self, path: &Arc<str>, content: &str) -> StrategyOutcome {
        let Some(lang) = Lang::from_path(path) else {
            return StrategyOutcome::NotParseable;
        };

        let mut parser = Parser::new();
        if parser.set_language(&lang.grammar()).is_err() {
            return StrategyOutcome::NotParseable;
        }
        let Some(tree) = parser.parse(content, None) else {
            return StrategyOutcome::NotParseable;
        };
        let root = tree.root_node();
        if root.has_error() {
            return StrategyOutcome::NotParseable;
        }

        let lines: Vec<&str> = content.lines().collect();
        let source = content.as_bytes();
        let mut frags: Vec<Fragment> = Vec::new();

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            let inner = unwrap_node(child);
            let Some(kind) = lang.classify(inner.kind()) else {
                continue;
            };
            let (start, end) = span(child);
            if start > end || end as usize > lines.len() {
                continue;
            }
            let symbol = node_symbol(lang, inner, source);

            if end - start + 1 > MAX_FRAGMENT_LINES {
                split_container(
                    lang, path, &lines, source, inner, start, end, kind, symbol, &mut frags,
                );
            } else {
                frags.push(make_fragment(
                    path,
                    &lines,
                    start,
                    end,
                    kind,
                    symbol,
                    None,
                    TokenProfile::Code,
                ));
            }
        }

        StrategyOutcome::Fragments(frags)
    }
}

/// Split an oversized container at method boundaries: a header fragment
/// over the declaration, one fragment per method, generic fragments for
/// the lines in between. Every piece remembers the container's first
/// line so the diff mapper can find the header again.
#[allow(clippy::too_many_arguments)]
fn split_container(
    lang: Lang,
    path: &Arc<str>,
    lines: &[&str],
    source: &[u8],
    node: Node,
    start: u32,
    end: u32,
    kind: FragmentKind,
    symbol: Option<String>,
    frags: &mut Vec<Fragment>,
) {
    let methods = collect_methods(lang, node, source, end);

    if methods.len() < 2 {
        // No natural sub-boundaries: fall back to fixed-size chunks so
        // the span still honours the size limit.
        let mut chunk_start = start;
        while chunk_start <= end {
            let chunk_end = end.min(chunk_start + MAX_FRAGMENT_LINES - 1);
            frags.push(make_fragment(
                path,
                lines,
                chunk_start,
                chunk_end,
                if chunk_start == start { kind } else { FragmentKind::Generic },
                if chunk_start == start { symbol.clone() } else { None },
                if chunk_start == start { None } else { Some(start) },
                TokenProfile::Code,
            ));
            chunk_start = chunk_end + 1;
        }
        return;
    }

    let mut next = start;
    for (m_start, m_end, m_symbol) in methods {
        if m_start > next {
            // Header before the first method, interstitial lines after
            let (kind, sym) = if next == start {
                (kind, symbol.clone())
            } else {
                (FragmentKind::Generic, None)
            };
            let container = if next == start { None } else { Some(start) };
            frags.push(make_fragment(
                path, lines, next, m_start - 1, kind, sym, container, TokenProfile::Code,
            ));
        }
        frags.push(make_fragment(
            path,
            lines,
            m_start,
            m_end,
            FragmentKind::Method,
            m_symbol,
            Some(start),
            TokenProfile::Code,
        ));
        next = m_end + 1;
    }
    if next <= end {
        frags.push(make_fragment(
            path,
            lines,
            next,
            end,
            FragmentKind::Generic,
            None,
            Some(start),
            TokenProfile::Code,
        ));
    }
}

/// Method spans inside a container body, sorted and non-overlapping.
fn collect_methods(
    lang: Lang,
    node: Node,
    source: &[u8],
    container_end: u32,
) -> Vec<(u32, u32, Option<String>)> {
    let Some(body) = node.child_by_field_name("body") else {
        return Vec::new();
    };

    let mut methods = Vec::new();
    let mut cursor = body.walk();
    let mut last_end = 0u32;
    for child in body.named_children(&mut cursor) {
        if !lang.is_method_kind(child.kind()) {
            continue;
        }
        let inner = unwrap_node(child);
        let (m_start, m_end) = span(child);
        if m_start <= last_end || m_end > container_end {
            continue;
        }
        last_end = m_end;
        methods.push((m_start, m_end, node_symbol(lang, inner, source)));
    }
    methods
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragmenter;

    fn frag_file(path: &str, content: &str) -> Vec<Fragment> {
        Fragmenter::new().fragment_file(&Arc::from(path), content)
    }

    #[test]
    fn test_rust_definitions() {
        let content = "\
use std::fmt;

pub struct Connection {
    host: String,
}

impl Connection {
    pub fn open(host: &str) -> Self {
        Self { host: host.to_string() }
    }
}

fn helper() -> u32 {
    42
}
";
        let frags = frag_file("src/conn.rs", content);
        let symbols: Vec<_> = frags.iter().filter_map(|f| f.symbol.as_deref()).collect();
        assert!(symbols.contains(&"Connection"));
        assert!(symbols.contains(&"helper"));
        assert!(frags.iter().any(|f| f.kind == FragmentKind::Function));
        assert!(frags.iter().any(|f| f.kind == FragmentKind::Class));
        // The `use` line is a generic gap fragment
        assert_eq!(frags[0].kind, FragmentKind::Generic);
    }

    #[test]
    fn test_python_decorated_function() {
        let content = "\
@cached
def expensive(x):
    return x * 2
";
        let frags = frag_file("m.py", content);
        let func = frags.iter().find(|f| f.kind == FragmentKind::Function).unwrap();
        assert_eq!(func.symbol.as_deref(), Some("expensive"));
        // Decorator included in the span
        assert_eq!(func.start_line(), 1);
    }

    #[test]
    fn test_go_types_and_methods() {
        let content = "\
package main

type Server struct {
    addr string
}

func (s *Server) Start() error {
    return nil
}

func main() {
}
";
        let frags = frag_file("main.go", content);
        let symbols: Vec<_> = frags.iter().filter_map(|f| f.symbol.as_deref()).collect();
        assert!(symbols.contains(&"Server"));
        assert!(symbols.contains(&"Start"));
        assert!(symbols.contains(&"main"));
        assert!(frags.iter().any(|f| f.kind == FragmentKind::Method));
    }

    #[test]
    fn test_typescript_interface() {
        let content = "\
export interface Options {
    verbose: boolean;
}

export function run(opts: Options): void {
}
";
        let frags = frag_file("opts.ts", content);
        let symbols: Vec<_> = frags.iter().filter_map(|f| f.symbol.as_deref()).collect();
        assert!(symbols.contains(&"Options"));
        assert!(symbols.contains(&"run"));
    }

    #[test]
    fn test_broken_python_falls_back() {
        // Unbalanced paren: the AST strategy rejects the file and the
        // text partitioner takes over, still tiling it.
        let content = "def broken(:\n    pass\nmore text here\n";
        let frags = frag_file("bad.py", content);
        assert!(!frags.is_empty());
        assert!(frags.iter().all(|f| f.kind != FragmentKind::Function));
    }

    #[test]
    fn test_oversized_class_splits_at_methods() {
        let mut content = String::from("class Big:\n");
        for i in 0..30 {
            content.push_str(&format!("    def method_{}(self):\n", i));
            for j in 0..9 {
                content.push_str(&format!("        x_{} = {}\n", j, j));
            }
        }
        let frags = frag_file("big.py", &content);
        assert!(frags.iter().all(|f| f.line_count() <= MAX_FRAGMENT_LINES));
        let methods: Vec<_> = frags.iter().filter(|f| f.kind == FragmentKind::Method).collect();
        assert_eq!(methods.len(), 30);
        assert!(methods.iter().all(|f| f.container_line == Some(1)));
        // Header fragment survives as the container's representative
        let header = frags.iter().find(|f| f.kind == FragmentKind::Class).unwrap();
        assert_eq!(header.start_line(), 1);
        assert_eq!(header.symbol.as_deref(), Some("Big"));
    }
}
