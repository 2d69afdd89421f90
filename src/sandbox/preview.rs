use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::PreviewError;
use crate::workspace::CodeWorkspace;

/// Where rendered documents are presented. Write-only: sinks never hand
/// anything back to the host.
#[async_trait]
pub trait PreviewSink: Send + Sync {
    /// Replace whatever is shown with `document`.
    async fn present(&self, document: &str) -> Result<(), PreviewError>;
}

/// Keeps the document in the workspace buffer only.
pub struct NullSink;

#[async_trait]
impl PreviewSink for NullSink {
    async fn present(&self, _document: &str) -> Result<(), PreviewError> {
        Ok(())
    }
}

/// Writes a host page that shows the document inside a sandboxed iframe.
///
/// The frame gets `allow-scripts` and nothing else: no same-origin access
/// (so no storage or cookies), no top-level navigation, no forms or popups.
/// The page is written to a sibling temp file and renamed into place, so a
/// reader never observes a half-written preview.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl PreviewSink for FileSink {
    async fn present(&self, document: &str) -> Result<(), PreviewError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("html.tmp");
        tokio::fs::write(&tmp, isolated_page(document)).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = document.len(), "preview written");
        Ok(())
    }
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap a document in a host page that isolates it.
pub fn isolated_page(document: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Code Preview</title>\n\
         <style>html, body {{ margin: 0; height: 100%; }} iframe {{ border: 0; width: 100%; height: 100%; }}</style>\n\
         </head>\n<body>\n\
         <iframe sandbox=\"allow-scripts\" title=\"Code Preview\" srcdoc=\"{}\"></iframe>\n\
         </body>\n</html>\n",
        escape_attr(document)
    )
}

/// Full-replace renderer over a shared workspace.
///
/// Each call swaps the workspace buffer for the new document, then presents
/// it. Reads of the current code go through the workspace.
pub struct PreviewRenderer {
    workspace: CodeWorkspace,
    sink: Box<dyn PreviewSink>,
}

impl PreviewRenderer {
    pub fn new(workspace: CodeWorkspace) -> Self {
        Self {
            workspace,
            sink: Box::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: impl PreviewSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub async fn render(&self, document: &str) -> Result<(), PreviewError> {
        self.workspace.set_code(document);
        self.sink.present(document).await
    }

    pub fn workspace(&self) -> &CodeWorkspace {
        &self.workspace
    }
}
