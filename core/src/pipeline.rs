//! Generic plugin pipeline shared by every document format.

use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;

use crate::error::{Result, UpdateError};
use crate::overlay::ProjectHost;
use crate::walk::pause;

/// What a plugin did with the node it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginOutcome<N> {
    /// Leave the current node as is.
    Unchanged,
    /// Continue with this node instead.
    Replace(N),
    /// Stop running plugins and delete the file.
    Delete,
}

/// A transformation over one parsed document. It also gets the project-relative
/// path of the document and the project itself, so it can read or edit other files.
pub type Plugin<N> = Box<dyn Fn(&N, &str, &mut dyn ProjectHost) -> anyhow::Result<PluginOutcome<N>>>;

/// Translation between raw text and a structured node for one document kind.
pub trait DocumentFormat {
    type Node;

    fn name(&self) -> &'static str;

    /// Whether this format handles `path`.
    fn supports(&self, path: &str) -> bool;

    /// Parses `src`. Formats may remember per-file details (indentation, line
    /// ending) here for the following [`serialize`](Self::serialize).
    fn parse(&mut self, src: &str, path: &str) -> Result<Self::Node>;

    fn serialize(&mut self, node: &Self::Node, path: &str) -> Result<String>;

    /// Forgets whatever was kept from earlier runs.
    fn reset(&mut self) {}
}

/// Object-safe entry point the orchestrator dispatches files to.
pub trait FileUpdater {
    fn name(&self) -> &'static str;

    fn supports(&self, path: &str) -> bool;

    /// Returns the new content of `path`: `src` itself when nothing changed,
    /// an empty string when the file should be deleted.
    fn update<'a>(
        &'a mut self,
        src: &'a str,
        path: &'a str,
        project: &'a mut dyn ProjectHost,
    ) -> LocalBoxFuture<'a, Result<String>>;

    /// Called before every run.
    fn reset(&mut self) {}
}

/// Runs an ordered list of plugins over documents of format `F`.
pub struct Updater<F: DocumentFormat> {
    format: F,
    plugins: Vec<Plugin<F::Node>>,
    pacing: Duration,
}

impl<F: DocumentFormat> Updater<F> {
    pub fn new(format: F) -> Self {
        Self { format, plugins: Vec::new(), pacing: Duration::ZERO }
    }

    /// Appends a plugin; plugins run in the order they were added.
    pub fn with_plugin<P>(mut self, plugin: P) -> Self
    where
        P: Fn(&F::Node, &str, &mut dyn ProjectHost) -> anyhow::Result<PluginOutcome<F::Node>> + 'static,
    {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn with_plugins(mut self, plugins: impl IntoIterator<Item = Plugin<F::Node>>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Pause before each plugin invocation. Zero still yields to the runtime.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn format(&self) -> &F {
        &self.format
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Parses `src`, runs every plugin, and serializes the result.
    ///
    /// When the result serializes exactly like an untouched parse/serialize
    /// round trip, `src` is returned as is, so a reformatting serializer never
    /// produces a diff for a file no plugin changed.
    pub async fn run(&mut self, src: &str, path: &str, project: &mut dyn ProjectHost) -> Result<String> {
        let untouched = self.format.parse(src, path)?;
        let round_trip = self.format.serialize(&untouched, path)?;
        drop(untouched);

        let mut node = self.format.parse(src, path)?;
        for (index, plugin) in self.plugins.iter().enumerate() {
            pause(self.pacing).await;
            let outcome = plugin(&node, path, &mut *project).map_err(|source| UpdateError::Plugin {
                path: path.to_string(),
                index,
                source,
            })?;
            match outcome {
                PluginOutcome::Unchanged => {}
                PluginOutcome::Replace(next) => node = next,
                PluginOutcome::Delete => {
                    tracing::debug!(path, plugin = index, "plugin requested deletion");
                    return Ok(String::new());
                }
            }
        }

        let result = self.format.serialize(&node, path)?;
        if result == round_trip { Ok(src.to_string()) } else { Ok(result) }
    }
}

impl<F> FileUpdater for Updater<F>
where
    F: DocumentFormat + 'static,
{
    fn name(&self) -> &'static str {
        self.format.name()
    }

    fn supports(&self, path: &str) -> bool {
        self.format.supports(path)
    }

    fn update<'a>(
        &'a mut self,
        src: &'a str,
        path: &'a str,
        project: &'a mut dyn ProjectHost,
    ) -> LocalBoxFuture<'a, Result<String>> {
        self.run(src, path, project).boxed_local()
    }

    fn reset(&mut self) {
        self.format.reset();
    }
}
