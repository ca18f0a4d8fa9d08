//! AST-based chunking via tree-sitter: structural grouping, then line-based
//! splitting of oversized fragments and coalescing of small ones.

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser, Tree};

use crate::error::ChunkError;
use crate::languages::{NodeClass, classify, grammar};

/// Fragments whose trimmed text is shorter than this are dropped.
const MIN_FRAGMENT_CHARS: usize = 50;
/// A minor node joins the current group if it starts at most this many
/// lines after the group ends.
const MINOR_LINE_GAP: usize = 2;
/// Characters of overlap represented by one carried-over line.
const CHARS_PER_OVERLAP_LINE: usize = 50;
/// A trailing split remainder below this size is folded into the previous piece.
const SMALL_REMAINDER_CHARS: usize = 100;
/// Fragments below this size absorb their successors.
const MERGE_THRESHOLD_CHARS: usize = 150;

/// Structural category of a fragment, taken from its anchor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Function,
    Class,
    Import,
    Export,
    Variable,
    Expression,
    Code,
}

impl FragmentKind {
    fn is_anchor(self) -> bool {
        matches!(self, Self::Function | Self::Class)
    }
}

/// One contiguous slice of source with its 1-based inclusive line span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub id: usize,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: FragmentKind,
    /// Grammar node kind of the anchor, e.g. `function_declaration`.
    pub structural_type: String,
}

/// Chunker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Largest fragment, in characters, before a line-based split (default: 1000).
    pub max_size: usize,
    /// Characters of context carried between split pieces (default: 200).
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkerConfig {
    fn overlap_lines(self) -> usize {
        (self.overlap / CHARS_PER_OVERLAP_LINE).max(1)
    }
}

/// A classified node, copied out of the tree.
#[derive(Debug, Clone, Copy)]
struct MatchedNode {
    start_byte: usize,
    end_byte: usize,
    start_line: usize,
    end_line: usize,
    class: NodeClass,
    node_kind: &'static str,
}

impl MatchedNode {
    fn new(node: Node<'_>, class: NodeClass) -> Self {
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            class,
            node_kind: node.kind(),
        }
    }
}

struct Group {
    nodes: Vec<MatchedNode>,
    end_line: usize,
}

impl Group {
    fn new(node: MatchedNode) -> Self {
        Self {
            end_line: node.end_line,
            nodes: vec![node],
        }
    }

    fn push(&mut self, node: MatchedNode) {
        self.end_line = self.end_line.max(node.end_line);
        self.nodes.push(node);
    }
}

/// Parse and chunk a JavaScript source file.
///
/// # Errors
///
/// Returns [`ChunkError::Parse`] if the source contains syntax errors.
pub fn chunk(source: &str, config: &ChunkerConfig) -> Result<Vec<Fragment>, ChunkError> {
    let tree = parse(source)?;

    let mut fragments = structural_fragments(source, &tree);

    // Nothing structural survived: keep the file as a single fragment so
    // small or declaration-free files still get indexed.
    if fragments.is_empty() && !source.trim().is_empty() {
        fragments.push(Fragment {
            id: 0,
            content: source.to_string(),
            start_line: 1,
            end_line: source.lines().count().max(1),
            kind: FragmentKind::Code,
            structural_type: tree.root_node().kind().to_string(),
        });
    }

    let split: Vec<Fragment> = fragments
        .into_iter()
        .flat_map(|f| split_oversized(f, config))
        .collect();
    let mut merged = merge_small(split, config);

    for (id, fragment) in merged.iter_mut().enumerate() {
        fragment.id = id;
    }
    Ok(merged)
}

fn parse(source: &str) -> Result<Tree, ChunkError> {
    let mut parser = Parser::new();
    parser
        .set_language(&grammar())
        .map_err(|e| ChunkError::Grammar(e.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ChunkError::Parse("parser produced no tree".into()))?;

    let root = tree.root_node();
    if root.has_error() {
        let position = first_error(root).map_or(root.start_position(), |n| n.start_position());
        return Err(ChunkError::Parse(format!(
            "syntax error at line {}, column {}",
            position.row + 1,
            position.column + 1
        )));
    }
    Ok(tree)
}

fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

/// Depth-first walk collecting every named node that classifies.
fn collect_nodes(root: Node<'_>) -> Vec<MatchedNode> {
    let mut matched = Vec::new();
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_named()
            && let Some(class) = classify(node.kind())
        {
            matched.push(MatchedNode::new(node, class));
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return matched;
            }
        }
    }
}

fn structural_fragments(source: &str, tree: &Tree) -> Vec<Fragment> {
    let mut nodes = collect_nodes(tree.root_node());
    nodes.sort_by(|a, b| {
        a.start_byte
            .cmp(&b.start_byte)
            .then_with(|| b.end_byte.cmp(&a.end_byte))
    });

    let mut fragments = Vec::new();
    let mut current: Option<Group> = None;

    for node in nodes {
        if !node.class.is_major()
            && let Some(group) = current.as_mut()
            && node.start_line <= group.end_line + MINOR_LINE_GAP
        {
            group.push(node);
            continue;
        }
        if let Some(group) = current.replace(Group::new(node)) {
            fragments.extend(flush_group(source, &group));
        }
    }
    if let Some(group) = current {
        fragments.extend(flush_group(source, &group));
    }

    fragments
}

fn flush_group(source: &str, group: &Group) -> Option<Fragment> {
    let first = group.nodes.first()?;
    let start = group.nodes.iter().map(|n| n.start_byte).min()?;
    let end = group.nodes.iter().map(|n| n.end_byte).max()?;
    let content = &source[start..end];

    let trimmed = content.trim();
    if trimmed.is_empty() || char_len(trimmed) < MIN_FRAGMENT_CHARS {
        return None;
    }

    let anchor = group
        .nodes
        .iter()
        .find(|n| n.class.kind().is_anchor())
        .unwrap_or(first);

    Some(Fragment {
        id: 0,
        content: content.to_string(),
        start_line: group.nodes.iter().map(|n| n.start_line).min()?,
        end_line: group.nodes.iter().map(|n| n.end_line).max()?,
        kind: anchor.class.kind(),
        structural_type: anchor.node_kind.to_string(),
    })
}

/// Split a fragment longer than `max_size` on line boundaries. Each piece
/// after the first starts with the trailing lines of its predecessor.
fn split_oversized(fragment: Fragment, config: &ChunkerConfig) -> Vec<Fragment> {
    if char_len(&fragment.content) <= config.max_size {
        return vec![fragment];
    }

    let mut lines: Vec<&str> = fragment.content.split('\n').collect();
    // A trailing newline terminates the last line; it does not open another.
    if lines.len() > 1 && lines.last() == Some(&"") {
        lines.pop();
    }
    let overlap_lines = config.overlap_lines();
    let mut pieces: Vec<Fragment> = Vec::new();

    // Current piece is lines[window_start..i]; lines before fresh_start
    // were carried over from the previous piece.
    let mut window_start = 0;
    let mut fresh_start = 0;
    let mut size = 0;

    for (i, line) in lines.iter().enumerate() {
        let line_len = char_len(line);
        let added = if i == window_start { line_len } else { line_len + 1 };

        if i > fresh_start && size + added > config.max_size {
            pieces.push(make_piece(&fragment, &lines, window_start, i));

            window_start = i.saturating_sub(overlap_lines).max(window_start + 1);
            fresh_start = i;
            size = joined_len(&lines[window_start..i]);
            if size + line_len + 1 > config.max_size {
                window_start = i;
                size = 0;
            }
            size += if i == window_start { line_len } else { line_len + 1 };
        } else {
            size += added;
        }
    }

    let remainder = make_piece(&fragment, &lines, window_start, lines.len());
    let fresh = lines[fresh_start..].join("\n");
    let limit = config.max_size * 3 / 2;
    match pieces.last_mut() {
        Some(prev)
            if char_len(&remainder.content) < SMALL_REMAINDER_CHARS
                && char_len(&prev.content) + 1 + char_len(&fresh) < limit =>
        {
            prev.content.push('\n');
            prev.content.push_str(&fresh);
            prev.end_line = remainder.end_line;
        }
        _ => pieces.push(remainder),
    }

    pieces.retain(|p| !p.content.is_empty());
    pieces
}

fn make_piece(fragment: &Fragment, lines: &[&str], from: usize, to: usize) -> Fragment {
    Fragment {
        id: 0,
        content: lines[from..to].join("\n"),
        start_line: fragment.start_line + from,
        end_line: fragment.start_line + to.saturating_sub(1).max(from),
        kind: fragment.kind,
        structural_type: fragment.structural_type.clone(),
    }
}

/// Coalesce fragments below the merge threshold with their successors.
fn merge_small(fragments: Vec<Fragment>, config: &ChunkerConfig) -> Vec<Fragment> {
    let limit = config.max_size * 6 / 5;
    let mut merged = Vec::with_capacity(fragments.len());
    let mut pending: Option<Fragment> = None;

    for fragment in fragments {
        pending = Some(match pending.take() {
            None => fragment,
            Some(mut cur) => {
                let cur_len = char_len(&cur.content);
                if cur_len < MERGE_THRESHOLD_CHARS
                    && cur_len + 1 + char_len(&fragment.content) < limit
                {
                    cur.content.push('\n');
                    cur.content.push_str(&fragment.content);
                    cur.end_line = cur.end_line.max(fragment.end_line);
                    cur
                } else {
                    merged.push(cur);
                    fragment
                }
            }
        });
    }
    merged.extend(pending);
    merged
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn joined_len(lines: &[&str]) -> usize {
    lines.iter().map(|l| char_len(l)).sum::<usize>() + lines.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> ChunkerConfig {
        ChunkerConfig::default()
    }

    fn fragment(content: &str, start_line: usize) -> Fragment {
        Fragment {
            id: 0,
            content: content.to_string(),
            start_line,
            end_line: start_line + content.matches('\n').count(),
            kind: FragmentKind::Function,
            structural_type: "function_declaration".into(),
        }
    }

    const MODULE: &str = r"import { readFile } from 'node:fs/promises';
import path from 'node:path';

export async function loadConfig(dir) {
  const file = path.join(dir, 'config.json');
  const raw = await readFile(file, 'utf8');
  if (!raw) throw new Error('empty config');
  return JSON.parse(raw);
}

class Cache {
  constructor() {
    this.entries = new Map();
  }

  get(key) {
    return this.entries.get(key);
  }
}
";

    #[test]
    fn tiny_file_falls_back_to_whole_file() {
        let source = "function f(){}\n";
        let chunks = chunk(source, &default_config()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, source);
        assert_eq!(chunks[0].kind, FragmentKind::Code);
        assert_eq!(chunks[0].structural_type, "program");
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 1));
    }

    #[test]
    fn empty_and_blank_sources_produce_nothing() {
        assert!(chunk("", &default_config()).unwrap().is_empty());
        assert!(chunk("\n\n   \n", &default_config()).unwrap().is_empty());
    }

    #[test]
    fn syntax_error_is_parse_error() {
        let err = chunk("function broken( {\n  return 1;\n", &default_config()).unwrap_err();
        assert!(matches!(err, ChunkError::Parse(_)));
        assert!(err.to_string().contains("line"));
    }

    #[test]
    fn module_declarations_become_fragments() {
        let chunks = chunk(MODULE, &default_config()).unwrap();
        assert!(
            chunks
                .iter()
                .any(|c| c.kind == FragmentKind::Export && c.content.contains("loadConfig"))
        );
        assert!(
            chunks
                .iter()
                .any(|c| c.kind == FragmentKind::Class && c.content.starts_with("class Cache"))
        );
        // Imports are under the size floor on their own.
        assert!(chunks.iter().all(|c| !c.content.starts_with("import")));
    }

    #[test]
    fn class_fragment_spans_its_lines() {
        let chunks = chunk(MODULE, &default_config()).unwrap();
        let class = chunks
            .iter()
            .find(|c| c.kind == FragmentKind::Class)
            .unwrap();
        assert_eq!(class.start_line, 11);
        assert_eq!(class.end_line, 19);
        assert_eq!(class.structural_type, "class_declaration");
    }

    #[test]
    fn ids_are_sequential() {
        let chunks = chunk(MODULE, &default_config()).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.id, i);
        }
    }

    #[test]
    fn chunking_is_idempotent() {
        let a = chunk(MODULE, &default_config()).unwrap();
        let b = chunk(MODULE, &default_config()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn nearby_statements_group_and_distant_ones_split() {
        let source = "\
const alphaSetting = computeDefaults({ retries: 3, backoff: 250 });
const betaSetting = computeDefaults({ retries: 5, backoff: 500 });



const gammaSetting = computeDefaults({ retries: 8, backoff: 1000, jitter: true });
";
        let tree = parse(source).unwrap();
        let fragments = structural_fragments(source, &tree);
        assert_eq!(fragments.len(), 2);
        assert_eq!((fragments[0].start_line, fragments[0].end_line), (1, 2));
        assert_eq!(fragments[0].kind, FragmentKind::Variable);
        assert_eq!(fragments[1].start_line, 6);
    }

    #[test]
    fn statements_join_the_function_they_follow() {
        let source = "\
function bootstrapApplication(options) {
  return createServer(options);
}
bootstrapApplication({ port: 8080, host: 'localhost' });
";
        let tree = parse(source).unwrap();
        let fragments = structural_fragments(source, &tree);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].kind, FragmentKind::Function);
        assert_eq!((fragments[0].start_line, fragments[0].end_line), (1, 4));
        assert!(fragments[0].content.ends_with("});"));
    }

    #[test]
    fn anchor_prefers_function_over_first_node() {
        let source = "\
let handler = null;
handler = function onRequest(request, response) { response.end('ok'); };
";
        let tree = parse(source).unwrap();
        let fragments = structural_fragments(source, &tree);
        // The function expression is major and opens its own group.
        assert!(fragments.iter().any(|f| f.kind == FragmentKind::Function));
    }

    #[test]
    fn split_respects_max_size_and_carries_overlap() {
        let config = ChunkerConfig {
            max_size: 200,
            overlap: 100,
        };
        let content: String = (0..30)
            .map(|i| format!("  total = total + compute({i:02}, 42);"))
            .collect::<Vec<_>>()
            .join("\n");
        let pieces = split_oversized(fragment(&content, 10), &config);

        assert!(pieces.len() > 1);
        for piece in &pieces[..pieces.len() - 1] {
            assert!(char_len(&piece.content) <= config.max_size);
        }
        for pair in pieces.windows(2) {
            let prev: Vec<&str> = pair[0].content.lines().collect();
            let next: Vec<&str> = pair[1].content.lines().collect();
            // overlap 100 / 50 = 2 lines
            assert_eq!(next[..2], prev[prev.len() - 2..]);
            assert_eq!(pair[1].start_line, pair[0].end_line - 1);
        }
        assert_eq!(pieces[0].start_line, 10);
        assert_eq!(pieces.last().unwrap().end_line, 39);
    }

    #[test]
    fn small_remainder_is_appended_to_previous_piece() {
        let config = ChunkerConfig {
            max_size: 100,
            overlap: 50,
        };
        let line = |c: char| c.to_string().repeat(30);
        let content = format!(
            "{}\n{}\n{}\n{}\n{}\n{}\nend();",
            line('a'),
            line('b'),
            line('c'),
            line('d'),
            line('e'),
            line('f')
        );
        let pieces = split_oversized(fragment(&content, 1), &config);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].end_line, 3);
        // Only the fresh lines of the remainder are appended; `e` is not repeated.
        assert_eq!(
            pieces[1].content,
            [line('c'), line('d'), line('e'), line('f'), "end();".into()].join("\n")
        );
        assert_eq!(pieces[1].start_line, 3);
        assert_eq!(pieces[1].end_line, 7);
    }

    #[test]
    fn split_of_newline_terminated_file_stays_within_its_lines() {
        let source: String = (0..30)
            .map(|i| format!("// note {i:02}: {}\n", "x".repeat(48)))
            .collect();
        assert_eq!(char_len(&source), 1830);

        let chunks = chunk(&source, &default_config()).unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(chunks.iter().map(|c| c.end_line).max(), Some(30));
        assert!(chunks.last().unwrap().content.ends_with(&"x".repeat(48)));
    }

    #[test]
    fn single_overlong_line_stays_whole() {
        let config = ChunkerConfig {
            max_size: 50,
            overlap: 0,
        };
        let content = "y".repeat(120);
        let pieces = split_oversized(fragment(&content, 1), &config);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].content, content);
    }

    #[test]
    fn small_fragments_coalesce_until_threshold() {
        let config = default_config();
        let parts = vec![
            fragment(&"a".repeat(60), 1),
            fragment(&"b".repeat(60), 2),
            fragment(&"c".repeat(60), 3),
            fragment(&"d".repeat(60), 4),
        ];
        let merged = merge_small(parts, &config);
        // 60 + 1 + 60 = 121 keeps absorbing; 121 + 1 + 60 = 182 is flushed.
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].end_line, 3);
        assert_eq!(char_len(&merged[0].content), 182);
        assert_eq!(merged[1].start_line, 4);
    }

    #[test]
    fn merge_never_exceeds_limit() {
        let config = ChunkerConfig {
            max_size: 100,
            overlap: 0,
        };
        let parts = vec![fragment(&"a".repeat(90), 1), fragment(&"b".repeat(90), 2)];
        let merged = merge_small(parts, &config);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn large_function_is_split_into_bounded_pieces() {
        let mut source = String::from("function accumulate(values) {\n  let total = 0;\n");
        for i in 0..80 {
            source.push_str(&format!("  total = total + normalize(values[{i}], 1234567);\n"));
        }
        source.push_str("  return total;\n}\n");

        let config = default_config();
        let chunks = chunk(&source, &config).unwrap();
        assert!(chunks.len() > 2, "expected split, got {}", chunks.len());
        for c in &chunks {
            assert!(char_len(&c.content) < config.max_size * 3 / 2);
            assert!(c.start_line <= c.end_line);
        }
    }

    mod proptest_chunker {
        use super::*;
        use proptest::prelude::*;

        fn program(lines: usize) -> String {
            (0..lines)
                .map(|i| format!("let value{i} = compute({i}, \"segment\");\n"))
                .collect()
        }

        proptest! {
            #[test]
            fn fragments_are_well_formed(
                lines in 1usize..120,
                max_size in 150usize..1500,
                overlap in 0usize..400,
            ) {
                let config = ChunkerConfig { max_size, overlap };
                let source = program(lines);
                let chunks = chunk(&source, &config).unwrap();
                prop_assert!(!chunks.is_empty());
                for c in &chunks {
                    prop_assert!(c.start_line <= c.end_line);
                    prop_assert!(c.end_line <= lines);
                    prop_assert!(!c.content.is_empty());
                }
            }

            #[test]
            fn every_line_is_covered(
                lines in 1usize..120,
                max_size in 150usize..1500,
                overlap in 0usize..400,
            ) {
                let config = ChunkerConfig { max_size, overlap };
                let source = program(lines);
                let chunks = chunk(&source, &config).unwrap();
                for line in source.lines() {
                    prop_assert!(
                        chunks.iter().any(|c| c.content.contains(line)),
                        "missing {}",
                        line
                    );
                }
            }

            #[test]
            fn deterministic(lines in 1usize..60, max_size in 150usize..800) {
                let config = ChunkerConfig {
                    max_size,
                    overlap: 200,
                };
                let source = program(lines);
                prop_assert_eq!(
                    chunk(&source, &config).unwrap(),
                    chunk(&source, &config).unwrap()
                );
            }
        }
    }
}
