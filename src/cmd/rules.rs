//! Built-in rules compiled into plugins for each document format.

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde_json::Value;
use updater_core::{MarkupTree, Plugin, PluginOutcome, ProjectHost, SourceUnit};

use crate::config::RuleConfig;

/// Plugins for each format, in rule order.
#[derive(Default)]
pub struct RuleSet {
    pub code: Vec<Plugin<SourceUnit>>,
    pub markup: Vec<Plugin<MarkupTree>>,
    pub json: Vec<Plugin<Value>>,
    pub text: Vec<Plugin<Vec<String>>>,
}

impl RuleSet {
    pub fn len(&self) -> usize {
        self.code.len() + self.markup.len() + self.json.len() + self.text.len()
    }
}

pub fn compile(rules: &[RuleConfig]) -> Result<RuleSet> {
    let mut set = RuleSet::default();
    for (idx, rule) in rules.iter().enumerate() {
        match rule.clone() {
            RuleConfig::RenameImport { from, to } => set.code.push(rename_import(from, to)),
            RuleConfig::JsonSet { file, pointer, value } => {
                if !pointer.is_empty() && !pointer.starts_with('/') {
                    bail!("rule #{idx}: JSON pointer {pointer:?} must start with '/'");
                }
                set.json.push(json_set(file, pointer, value));
            }
            RuleConfig::ReplaceText { pattern, find, replace } => {
                let pattern = pattern.as_deref().map(compile_regex).transpose().with_context(|| format!("rule #{idx}"))?;
                set.text.push(replace_text(pattern, find, replace));
            }
            RuleConfig::RenameAttribute { from, to } => set.markup.push(rename_attribute(from, to)),
            RuleConfig::DeleteFiles { pattern } => {
                let pattern = compile_regex(&pattern).with_context(|| format!("rule #{idx}"))?;
                set.code.push(delete_files(pattern.clone()));
                set.markup.push(delete_files(pattern.clone()));
                set.json.push(delete_files(pattern.clone()));
                set.text.push(delete_files(pattern));
            }
        }
    }
    Ok(set)
}

fn compile_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("invalid pattern {pattern:?}"))
}

fn rename_import(from: String, to: String) -> Plugin<SourceUnit> {
    Box::new(move |unit: &SourceUnit, _path: &str, _project: &mut dyn ProjectHost| {
        let mut ranges: Vec<_> =
            unit.imports().into_iter().filter(|i| i.module == from).map(|i| i.module_range).collect();
        if ranges.is_empty() {
            return Ok(PluginOutcome::Unchanged);
        }
        // Back to front so earlier ranges stay valid.
        ranges.sort_by_key(|r| std::cmp::Reverse(r.start));
        let mut next = unit.clone();
        for range in ranges {
            next.replace(range, &to)?;
        }
        Ok(PluginOutcome::Replace(next))
    })
}

fn json_set(file: String, pointer: String, value: Value) -> Plugin<Value> {
    Box::new(move |doc: &Value, path: &str, _project: &mut dyn ProjectHost| {
        if path != file && !path.ends_with(&format!("/{file}")) {
            return Ok(PluginOutcome::Unchanged);
        }
        if doc.pointer(&pointer) == Some(&value) {
            return Ok(PluginOutcome::Unchanged);
        }
        let mut next = doc.clone();
        set_pointer(&mut next, &pointer, value.clone()).with_context(|| format!("cannot set {pointer} in {path}"))?;
        Ok(PluginOutcome::Replace(next))
    })
}

/// Assigns `value` at an RFC 6901 pointer, creating missing objects on the way.
fn set_pointer(doc: &mut Value, pointer: &str, value: Value) -> Result<()> {
    if pointer.is_empty() {
        *doc = value;
        return Ok(());
    }
    let rest = pointer.strip_prefix('/').with_context(|| format!("pointer {pointer:?} must start with '/'"))?;
    let tokens: Vec<String> = rest.split('/').map(|t| t.replace("~1", "/").replace("~0", "~")).collect();
    let (last, parents) = tokens.split_last().context("empty pointer")?;
    let mut current = doc;
    for token in parents {
        current = child_mut(current, token)?;
    }
    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
            } else {
                let idx: usize = last.parse().with_context(|| format!("{last:?} is not an array index"))?;
                let len = items.len();
                match items.get_mut(idx) {
                    Some(slot) => *slot = value,
                    None if idx == len => items.push(value),
                    None => bail!("index {idx} is out of bounds"),
                }
            }
        }
        other => bail!("cannot set a member of {}", kind(other)),
    }
    Ok(())
}

fn child_mut<'a>(current: &'a mut Value, token: &str) -> Result<&'a mut Value> {
    match current {
        Value::Object(map) => Ok(map.entry(token.to_string()).or_insert_with(|| Value::Object(Default::default()))),
        Value::Array(items) => {
            let idx: usize = token.parse().with_context(|| format!("{token:?} is not an array index"))?;
            items.get_mut(idx).with_context(|| format!("index {idx} is out of bounds"))
        }
        other => bail!("cannot descend into {}", kind(other)),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn replace_text(pattern: Option<Regex>, find: String, replace: String) -> Plugin<Vec<String>> {
    Box::new(move |lines: &Vec<String>, path: &str, _project: &mut dyn ProjectHost| {
        if pattern.as_ref().is_some_and(|re| !re.is_match(path)) || find.is_empty() {
            return Ok(PluginOutcome::Unchanged);
        }
        if !lines.iter().any(|line| line.contains(&find)) {
            return Ok(PluginOutcome::Unchanged);
        }
        Ok(PluginOutcome::Replace(lines.iter().map(|line| line.replace(&find, &replace)).collect()))
    })
}

fn rename_attribute(from: String, to: String) -> Plugin<MarkupTree> {
    Box::new(move |tree: &MarkupTree, path: &str, _project: &mut dyn ProjectHost| {
        let renamed = tree.rename_attribute(&from, &to);
        if renamed > 0 {
            tracing::debug!(path, renamed, "renamed attributes");
        }
        Ok(PluginOutcome::Unchanged)
    })
}

/// Deletes matching files of any format. Paths no format claims are never
/// handed to plugins and so are never deleted.
fn delete_files<N: 'static>(pattern: Regex) -> Plugin<N> {
    Box::new(move |_node: &N, path: &str, _project: &mut dyn ProjectHost| {
        Ok(if pattern.is_match(path) { PluginOutcome::Delete } else { PluginOutcome::Unchanged })
    })
}
