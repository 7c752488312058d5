//! Project-wide source transformation engine: walk, parse, run plugins, diff, commit.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod diff;
pub mod error;
pub mod event;
pub mod formats;
pub mod orchestrator;
pub mod overlay;
pub mod pipeline;
pub mod text;
pub mod walk;

pub use error::{Result, UpdateError};
pub use event::{EventStream, FileEvent, ProgressEvent, ProgressKind, QUERY_FINISHED, UpdateEvent};
pub use formats::{
    CodeFormat, ImportDeclaration, JsonFormat, MarkupFormat, MarkupTree, PathMatcher, SourceProject, SourceUnit,
    TextFormat,
};
pub use orchestrator::{
    CancelHandle, ErrorPolicy, ProjectUpdater, ProjectUpdaterBuilder, RunState, SkippedFile,
    UpdateOptions,
};
pub use overlay::{ChangedFile, Overlay, ProjectFile, ProjectHost, WriteReport};
pub use pipeline::{DocumentFormat, FileUpdater, Plugin, PluginOutcome, Updater};
