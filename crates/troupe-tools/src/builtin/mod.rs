pub mod documents;
pub mod scrape;
pub mod translate;
pub mod web_search;

use std::sync::Arc;

use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::ArtifactStore;
use troupe_core::types::ToolContext;

pub use documents::{CreateOutlineTool, EditDocumentTool, ReadDocumentTool, WriteDocumentTool};
pub use scrape::{ScrapeReferencesTool, ScrapeWebpagesTool};
pub use translate::TranslateTool;
pub use web_search::WebSearchTool;

pub(crate) fn exec_error(tool: &str, message: impl std::fmt::Display) -> TroupeError {
    TroupeError::ToolExecution {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}

pub(crate) fn store_of(tool: &str, ctx: &ToolContext) -> Result<Arc<dyn ArtifactStore>> {
    ctx.store
        .clone()
        .ok_or_else(|| exec_error(tool, "no artifact store attached to this run"))
}
