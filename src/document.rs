//! Document and task-page collaborators.
//!
//! These traits keep the editor integration and the HTML hosting out of
//! the pipeline: the orchestrator reads paragraphs through
//! [`DocumentSource`] and publishes worker-facing pages through
//! [`TaskPageHost`], both of which concrete integrations implement.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DocumentError {
    #[error("paragraph {index} out of range (document has {count})")]
    #[diagnostic(code(shortn::document::out_of_range))]
    OutOfRange { index: usize, count: usize },

    #[error("page host error: {message}")]
    #[diagnostic(code(shortn::document::page_host))]
    PageHost { message: String },
}

/// Read-only access to the document being shortened.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn paragraph_count(&self) -> Result<usize, DocumentError>;
    async fn paragraph_text(&self, index: usize) -> Result<String, DocumentError>;
}

/// Renders a task template with substitutions and returns a hosted URL.
#[async_trait]
pub trait TaskPageHost: Send + Sync {
    async fn render(
        &self,
        template: &str,
        substitutions: &FxHashMap<String, String>,
    ) -> Result<String, DocumentError>;
}

/// A fixed list of paragraphs, for tests and offline runs.
#[derive(Clone, Debug, Default)]
pub struct StaticDocument {
    paragraphs: Vec<String>,
}

impl StaticDocument {
    pub fn new(paragraphs: Vec<String>) -> Self {
        Self { paragraphs }
    }
}

#[async_trait]
impl DocumentSource for StaticDocument {
    async fn paragraph_count(&self) -> Result<usize, DocumentError> {
        Ok(self.paragraphs.len())
    }

    async fn paragraph_text(&self, index: usize) -> Result<String, DocumentError> {
        self.paragraphs
            .get(index)
            .cloned()
            .ok_or(DocumentError::OutOfRange {
                index,
                count: self.paragraphs.len(),
            })
    }
}

/// Page host that fabricates opaque in-memory URLs without rendering.
#[derive(Clone, Debug, Default)]
pub struct NullPageHost;

#[async_trait]
impl TaskPageHost for NullPageHost {
    async fn render(
        &self,
        template: &str,
        _substitutions: &FxHashMap<String, String>,
    ) -> Result<String, DocumentError> {
        Ok(format!("mem://pages/{template}/{}", uuid::Uuid::new_v4()))
    }
}
