use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use tree_sitter::{InputEdit, Language, Node, Parser, Point, Tree};

use super::PathMatcher;
use crate::error::{Result, UpdateError};
use crate::pipeline::DocumentFormat;

/// An `import ... from '<module>'` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDeclaration {
    pub module: String,
    /// Byte range of the module specifier without its quotes.
    pub module_range: Range<usize>,
    pub statement_range: Range<usize>,
    /// Names inside `{ ... }`, in source order.
    pub named: Vec<String>,
}

/// A TypeScript source file together with its syntax tree.
#[derive(Clone)]
pub struct SourceUnit {
    path: String,
    text: String,
    tree: Tree,
    language: Language,
}

impl SourceUnit {
    pub fn parse(path: impl Into<String>, text: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let text = text.into();
        let language = language_for(&path);
        let tree = parse_tree(&path, &language, &text, None)?;
        Ok(Self { path, text, tree, language })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Source text covered by `node`.
    pub fn node_text(&self, node: Node<'_>) -> &str {
        &self.text[node.byte_range()]
    }

    /// Top-level import statements in source order.
    pub fn imports(&self) -> Vec<ImportDeclaration> {
        let root = self.tree.root_node();
        let mut cursor = root.walk();
        let imports = root
            .children(&mut cursor)
            .filter(|node| node.kind() == "import_statement")
            .filter_map(|node| self.import_declaration(node))
            .collect();
        imports
    }

    fn import_declaration(&self, statement: Node<'_>) -> Option<ImportDeclaration> {
        let source = statement.child_by_field_name("source")?;
        let quoted = source.byte_range();
        if quoted.len() < 2 {
            return None;
        }
        let module_range = quoted.start + 1..quoted.end - 1;

        let mut named = Vec::new();
        collect_named_imports(statement, &self.text, &mut named);

        Some(ImportDeclaration {
            module: self.text[module_range.clone()].to_string(),
            module_range,
            statement_range: statement.byte_range(),
            named,
        })
    }

    /// Replaces the bytes in `range` with `replacement` and reparses
    /// incrementally.
    pub fn replace(&mut self, range: Range<usize>, replacement: &str) -> Result<()> {
        if range.start > range.end
            || range.end > self.text.len()
            || !self.text.is_char_boundary(range.start)
            || !self.text.is_char_boundary(range.end)
        {
            return Err(UpdateError::InvalidEdit {
                path: self.path.clone(),
                message: format!("range {}..{} is outside the source or splits a character", range.start, range.end),
            });
        }

        let start_position = point_at(&self.text, range.start);
        let old_end_position = point_at(&self.text, range.end);
        let mut text = String::with_capacity(self.text.len() - range.len() + replacement.len());
        text.push_str(&self.text[..range.start]);
        text.push_str(replacement);
        text.push_str(&self.text[range.end..]);
        let new_end_byte = range.start + replacement.len();

        self.tree.edit(&InputEdit {
            start_byte: range.start,
            old_end_byte: range.end,
            new_end_byte,
            start_position,
            old_end_position,
            new_end_position: point_at(&text, new_end_byte),
        });
        self.tree = parse_tree(&self.path, &self.language, &text, Some(&self.tree))?;
        self.text = text;
        Ok(())
    }

    /// Copy of this unit with one replacement applied.
    pub fn with_replacement(&self, range: Range<usize>, replacement: &str) -> Result<Self> {
        let mut next = self.clone();
        next.replace(range, replacement)?;
        Ok(next)
    }
}

impl fmt::Debug for SourceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceUnit")
            .field("path", &self.path)
            .field("len", &self.text.len())
            .field("has_errors", &self.has_errors())
            .finish()
    }
}

fn collect_named_imports(node: Node<'_>, text: &str, out: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "import_specifier" {
            if let Some(name) = child.child_by_field_name("name") {
                out.push(text[name.byte_range()].to_string());
            }
        } else if child.kind() != "string" {
            collect_named_imports(child, text, out);
        }
    }
}

fn language_for(path: &str) -> Language {
    if path.ends_with(".tsx") {
        tree_sitter_typescript::language_tsx()
    } else {
        tree_sitter_typescript::language_typescript()
    }
}

fn parse_tree(path: &str, language: &Language, text: &str, old: Option<&Tree>) -> Result<Tree> {
    let parse_error = |message: String| UpdateError::Parse { path: path.to_string(), format: "code", message };
    let mut parser = Parser::new();
    parser
        .set_language(language)
        .map_err(|e| parse_error(format!("failed to load grammar: {e}")))?;
    parser
        .parse(text, old)
        .ok_or_else(|| parse_error("parser returned no tree".to_string()))
}

/// Row and byte column of `byte` in `text`.
fn point_at(text: &str, byte: usize) -> Point {
    let before = &text[..byte];
    let row = before.matches('\n').count();
    let column = match before.rfind('\n') {
        Some(nl) => byte - nl - 1,
        None => byte,
    };
    Point::new(row, column)
}

/// Every source unit parsed during the current run, by path. Parsing a path
/// again replaces its unit; the map is emptied before each run.
#[derive(Debug, Clone, Default)]
pub struct SourceProject {
    units: HashMap<String, SourceUnit>,
}

impl SourceProject {
    pub fn get(&self, path: &str) -> Option<&SourceUnit> {
        self.units.get(path)
    }

    pub fn insert(&mut self, unit: SourceUnit) -> Option<SourceUnit> {
        self.units.insert(unit.path.clone(), unit)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }
}

/// TypeScript and TSX sources backed by tree-sitter.
#[derive(Debug, Clone)]
pub struct CodeFormat {
    matcher: PathMatcher,
    project: SourceProject,
}

impl CodeFormat {
    pub fn new() -> Self {
        Self { matcher: PathMatcher::extensions([".ts", ".tsx"]), project: SourceProject::default() }
    }

    pub fn with_matcher(mut self, matcher: PathMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn project(&self) -> &SourceProject {
        &self.project
    }
}

impl Default for CodeFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentFormat for CodeFormat {
    type Node = SourceUnit;

    fn name(&self) -> &'static str {
        "code"
    }

    fn supports(&self, path: &str) -> bool {
        self.matcher.matches(path)
    }

    fn parse(&mut self, src: &str, path: &str) -> Result<SourceUnit> {
        let unit = SourceUnit::parse(path, src)?;
        if unit.has_errors() {
            tracing::warn!(path, "syntax errors in source, continuing with a partial tree");
        }
        self.project.insert(unit.clone());
        Ok(unit)
    }

    fn serialize(&mut self, node: &SourceUnit, _path: &str) -> Result<String> {
        Ok(node.text.clone())
    }

    fn reset(&mut self) {
        self.project.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventStream;
    use crate::overlay::Overlay;
    use crate::pipeline::{FileUpdater, PluginOutcome, Updater};
    use pretty_assertions::assert_eq;

    const APP: &str = "import { Component } from '@angular/core';\nimport { Http, Headers } from '@angular/http';\n\nexport class App {}\n";

    #[test]
    fn lists_imports_with_their_ranges() {
        let unit = SourceUnit::parse("src/app.ts", APP).unwrap();
        assert!(!unit.has_errors());
        let imports = unit.imports();
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].module, "@angular/core");
        assert_eq!(imports[0].named, vec!["Component"]);
        assert_eq!(imports[1].module, "@angular/http");
        assert_eq!(imports[1].named, vec!["Http", "Headers"]);
        assert_eq!(&APP[imports[1].module_range.clone()], "@angular/http");
        assert!(APP[imports[1].statement_range.clone()].starts_with("import {"));
    }

    #[test]
    fn replace_updates_text_and_tree() {
        let mut unit = SourceUnit::parse("src/app.ts", APP).unwrap();
        let range = unit.imports()[1].module_range.clone();
        unit.replace(range, "@angular/common/http").unwrap();
        assert!(unit.text().contains("from '@angular/common/http';"));
        assert!(!unit.has_errors());
        assert_eq!(unit.imports()[1].module, "@angular/common/http");
        assert_eq!(unit.root_node().end_byte(), unit.text().len());
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let mut unit = SourceUnit::parse("a.ts", "const s = 'é';\n").unwrap();
        let inside_char = 12..13;
        assert!(matches!(unit.replace(inside_char, "e"), Err(UpdateError::InvalidEdit { .. })));
        assert!(matches!(unit.replace(3..100, ""), Err(UpdateError::InvalidEdit { .. })));
        assert_eq!(unit.text(), "const s = 'é';\n");
    }

    #[test]
    fn broken_sources_still_parse() {
        let mut format = CodeFormat::new();
        let unit = format.parse("export class {", "broken.ts").unwrap();
        assert!(unit.has_errors());
        assert_eq!(format.serialize(&unit, "broken.ts").unwrap(), "export class {");
    }

    #[test]
    fn parsing_again_replaces_the_project_entry() {
        let mut format = CodeFormat::new();
        format.parse("let a = 1;\n", "a.ts").unwrap();
        format.parse("let a = 2;\n", "a.ts").unwrap();
        format.parse("const b = <div />;\n", "b.tsx").unwrap();
        assert_eq!(format.project().len(), 2);
        assert_eq!(format.project().get("a.ts").unwrap().text(), "let a = 2;\n");
        assert!(!format.project().get("b.tsx").unwrap().has_errors());
    }

    #[tokio::test]
    async fn units_from_earlier_runs_are_dropped() {
        let mut updater = Updater::new(CodeFormat::new()).with_plugin(|_, _, _| Ok(PluginOutcome::Unchanged));
        let mut overlay = Overlay::new("/p", EventStream::default());
        updater.run("let a = 1;\n", "a.ts", &mut overlay).await.unwrap();
        updater.run("let b = 1;\n", "b.ts", &mut overlay).await.unwrap();
        assert_eq!(updater.format().project().len(), 2);

        FileUpdater::reset(&mut updater);
        assert!(updater.format().project().is_empty());
        updater.run("let b = 2;\n", "b.ts", &mut overlay).await.unwrap();
        assert!(updater.format().project().get("a.ts").is_none());
        assert_eq!(updater.format().project().get("b.ts").unwrap().text(), "let b = 2;\n");
    }

    #[tokio::test]
    async fn import_rewrites_flow_through_the_updater() {
        let mut updater = Updater::new(CodeFormat::new()).with_plugin(|unit: &SourceUnit, _, _| {
            let Some(import) = unit.imports().into_iter().find(|i| i.module == "@angular/http") else {
                return Ok(PluginOutcome::Unchanged);
            };
            Ok(PluginOutcome::Replace(unit.with_replacement(import.module_range, "@angular/common/http")?))
        });
        let mut overlay = Overlay::new("/p", EventStream::default());
        let out = updater.run(APP, "src/app.ts", &mut overlay).await.unwrap();
        assert_eq!(out, APP.replace("@angular/http", "@angular/common/http"));
    }
}
