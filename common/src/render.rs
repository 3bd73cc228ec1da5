//! 抽出結果の表示構造
//!
//! 任意の深さの DocValue を入れ子の表示ノードに変換する。
//! 副作用なし。デスクトップは DisplayNode を直接描画し、
//! CLI は `to_text` でテキスト化して表示する。

use crate::types::{DocValue, ExtractionResult};

/// 表示ノード
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayNode {
    /// スカラー値（文字列表現）
    Leaf(String),
    /// 箇条書き
    List { depth: usize, items: Vec<DisplayNode> },
    /// 見出し付きの項目群（depth に応じて字下げ）
    Section { depth: usize, fields: Vec<Field> },
}

/// 見出しと値
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub label: String,
    pub value: DisplayNode,
}

/// 値を表示ノードに変換
///
/// 子要素は depth + 1 で再帰的に変換する。
pub fn render(value: &DocValue, depth: usize) -> DisplayNode {
    match value {
        DocValue::Scalar(scalar) => DisplayNode::Leaf(scalar.display_text()),
        DocValue::Sequence(items) => DisplayNode::List {
            depth,
            items: items.iter().map(|item| render(item, depth + 1)).collect(),
        },
        DocValue::Mapping(fields) => DisplayNode::Section {
            depth,
            fields: fields
                .iter()
                .map(|(label, v)| Field {
                    label: label.clone(),
                    value: render(v, depth + 1),
                })
                .collect(),
        },
    }
}

/// 紙面1ページ分
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 複数ページの場合のみ 1 始まりの番号
    pub number: Option<usize>,
    pub body: DisplayNode,
}

/// 抽出結果をページ単位に変換
pub fn render_pages(result: &ExtractionResult) -> Vec<Page> {
    match result {
        ExtractionResult::Single(doc) => vec![Page {
            number: None,
            body: render(doc, 0),
        }],
        ExtractionResult::Pages(docs) => docs
            .iter()
            .enumerate()
            .map(|(i, doc)| Page {
                number: Some(i + 1),
                body: render(doc, 0),
            })
            .collect(),
    }
}

// =============================================
// テキスト表示
// =============================================

const INDENT: &str = "  ";

/// 表示ノードをテキスト化（深さごとに2スペース字下げ）
pub fn to_text(node: &DisplayNode) -> String {
    let mut out = String::new();
    write_node(node, 0, &mut out);
    out
}

/// 全ページをテキスト化
pub fn pages_to_text(pages: &[Page]) -> String {
    let total = pages.len();
    let mut out = String::new();
    for page in pages {
        match page.number {
            Some(n) => out.push_str(&format!("──── {} / {} ────\n", n, total)),
            None => out.push_str("────────────\n"),
        }
        write_node(&page.body, 0, &mut out);
        out.push('\n');
    }
    out
}

fn push_line(out: &mut String, indent: usize, text: &str) {
    for _ in 0..indent {
        out.push_str(INDENT);
    }
    out.push_str(text);
    out.push('\n');
}

fn write_node(node: &DisplayNode, indent: usize, out: &mut String) {
    match node {
        DisplayNode::Leaf(text) => push_line(out, indent, text),
        DisplayNode::List { items, .. } => {
            for item in items {
                match item {
                    DisplayNode::Leaf(text) => push_line(out, indent, &format!("- {}", text)),
                    nested => {
                        push_line(out, indent, "-");
                        write_node(nested, indent + 1, out);
                    }
                }
            }
        }
        DisplayNode::Section { fields, .. } => {
            for field in fields {
                push_line(out, indent, &format!("[{}]", field.label));
                write_node(&field.value, indent + 1, out);
            }
        }
    }
}

// =============================================
// 平坦化（構造比較用）
// =============================================

/// パスの1要素
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathSegment {
    Label(String),
    Index(usize),
}

/// 末端の値
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FlatLeaf {
    Text(String),
    EmptyList,
    EmptySection,
}

pub type FlatEntry = (Vec<PathSegment>, FlatLeaf);

/// 値を (パス, 末端値) の列に平坦化
pub fn flatten_value(value: &DocValue) -> Vec<FlatEntry> {
    let mut out = Vec::new();
    flatten_value_into(value, &mut Vec::new(), &mut out);
    out
}

fn flatten_value_into(value: &DocValue, path: &mut Vec<PathSegment>, out: &mut Vec<FlatEntry>) {
    match value {
        DocValue::Scalar(s) => out.push((path.clone(), FlatLeaf::Text(s.display_text()))),
        DocValue::Sequence(items) if items.is_empty() => out.push((path.clone(), FlatLeaf::EmptyList)),
        DocValue::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(PathSegment::Index(i));
                flatten_value_into(item, path, out);
                path.pop();
            }
        }
        DocValue::Mapping(fields) if fields.is_empty() => out.push((path.clone(), FlatLeaf::EmptySection)),
        DocValue::Mapping(fields) => {
            for (label, v) in fields {
                path.push(PathSegment::Label(label.clone()));
                flatten_value_into(v, path, out);
                path.pop();
            }
        }
    }
}

/// 表示ノードを (パス, 末端値) の列に平坦化
pub fn flatten_node(node: &DisplayNode) -> Vec<FlatEntry> {
    let mut out = Vec::new();
    flatten_node_into(node, &mut Vec::new(), &mut out);
    out
}

fn flatten_node_into(node: &DisplayNode, path: &mut Vec<PathSegment>, out: &mut Vec<FlatEntry>) {
    match node {
        DisplayNode::Leaf(text) => out.push((path.clone(), FlatLeaf::Text(text.clone()))),
        DisplayNode::List { items, .. } if items.is_empty() => out.push((path.clone(), FlatLeaf::EmptyList)),
        DisplayNode::List { items, .. } => {
            for (i, item) in items.iter().enumerate() {
                path.push(PathSegment::Index(i));
                flatten_node_into(item, path, out);
                path.pop();
            }
        }
        DisplayNode::Section { fields, .. } if fields.is_empty() => {
            out.push((path.clone(), FlatLeaf::EmptySection))
        }
        DisplayNode::Section { fields, .. } => {
            for field in fields {
                path.push(PathSegment::Label(field.label.clone()));
                flatten_node_into(&field.value, path, out);
                path.pop();
            }
        }
    }
}
