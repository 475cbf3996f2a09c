//! `wikipedia_search` and `arxiv_search`: text retrieval behind `TextSearch`.

use std::sync::Arc;

use serde_json::Value;

use matscout_contracts::{
    error::{HarnessError, HarnessResult},
    tool::{BoundArgs, ParamSpec, ParamType, ToolDescriptor},
};
use matscout_core::traits::{TextSearch, Tool};

pub struct SearchTool {
    descriptor: ToolDescriptor,
    backend: Arc<dyn TextSearch>,
}

impl SearchTool {
    pub const WIKIPEDIA: &'static str = "wikipedia_search";
    pub const ARXIV: &'static str = "arxiv_search";

    pub fn wikipedia(backend: Arc<dyn TextSearch>) -> Self {
        Self::new(
            Self::WIKIPEDIA,
            "Search Wikipedia and return a summary of the best matching page.",
            backend,
        )
    }

    pub fn arxiv(backend: Arc<dyn TextSearch>) -> Self {
        Self::new(
            Self::ARXIV,
            "Search arXiv and return the titles and abstracts of the most relevant papers.",
            backend,
        )
    }

    fn new(name: &str, description: &str, backend: Arc<dyn TextSearch>) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: name.to_string(),
                description: description.to_string(),
                inputs: vec![ParamSpec::new("query", ParamType::String, "The search query.")],
                output_type: ParamType::String,
                terminal: false,
            },
            backend,
        }
    }
}

impl Tool for SearchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn call(&self, args: &BoundArgs) -> HarnessResult<Value> {
        let query = args.str("query").unwrap_or_default().trim();
        if query.is_empty() {
            return Err(HarnessError::InvalidArguments {
                tool: self.descriptor.name.clone(),
                reason: "'query' must not be empty".to_string(),
            });
        }
        self.backend.search(query).map(Value::String)
    }
}
