use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    citations::{Citation, DEFAULT_CITATION_DISPLAY_LIMIT, select_citations},
    config::RetrievalConfig,
    embedding::EmbeddingBackend,
    error,
    retry::RetryPolicy,
    search::{Retriever, SearchParams, SearchResult},
};

struct RagState {
    retriever: Mutex<Retriever<EmbeddingBackend>>,
    defaults: SearchParams,
}

#[derive(Clone)]
pub struct RagMcpServer {
    state: Arc<RagState>,
    tool_router: ToolRouter<Self>,
}

impl RagMcpServer {
    fn new(
        retriever: Retriever<EmbeddingBackend>,
        defaults: SearchParams,
    ) -> Self {
        Self {
            state: Arc::new(RagState {
                retriever: Mutex::new(retriever),
                defaults,
            }),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl RagMcpServer {
    /// Retrieve passages relevant to a question, with confidence and citations.
    #[tool(
        name = "ragindex_retrieve",
        description = "Retrieve document passages relevant to a question. Returns ranked passages with similarity scores, an overall confidence in [-1, 1], and the distinct source documents to cite."
    )]
    pub async fn ragindex_retrieve(
        &self,
        params: Parameters<RetrieveParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let top_k = params.top_k.unwrap_or(self.state.defaults.top_k);
        let threshold = params
            .threshold
            .unwrap_or(self.state.defaults.similarity_threshold);
        if top_k == 0
            || !threshold.is_finite()
            || !(-1.0..=1.0).contains(&threshold)
        {
            return Err(rmcp::ErrorData::invalid_params(
                "topK must be at least 1 and threshold within [-1, 1]",
                None,
            ));
        }

        let mut retriever = self.state.retriever.lock().map_err(|_| {
            rmcp::ErrorData::internal_error("retriever lock poisoned", None)
        })?;

        let results = retriever
            .retrieve(&params.query, top_k, threshold)
            .map_err(|e| mcp_error("retrieval failed", e))?;
        let confidence = retriever
            .confidence(&params.query, &results)
            .map_err(|e| mcp_error("confidence estimation failed", e))?;
        drop(retriever);

        let citations: Vec<CitationItem> = select_citations(&results)
            .into_iter()
            .take(DEFAULT_CITATION_DISPLAY_LIMIT)
            .map(CitationItem::from)
            .collect();

        let include_text = params.include_text.unwrap_or(true);
        let items: Vec<PassageItem> = results
            .into_iter()
            .map(|r| PassageItem::new(r, include_text))
            .collect();

        let summary = format_summary(&params.query, &items, confidence);
        let structured = serde_json::to_value(RetrieveResponse {
            query: params.query,
            confidence,
            result_count: items.len(),
            results: items,
            citations,
        })
        .map_err(|e| mcp_error("failed to serialize results", e))?;

        let mut result = CallToolResult::default();
        result.content = vec![Content::text(summary)];
        result.structured_content = Some(structured);
        result.is_error = Some(false);
        result.meta = None;
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for RagMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut server_info =
            Implementation::new("ragindex", env!("CARGO_PKG_VERSION"));
        server_info.title = Some("ragindex MCP".to_string());
        server_info.icons = None;
        server_info.website_url = None;

        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info = server_info;
        info.instructions = Some(
            "Use ragindex_retrieve to ground answers in the indexed documents. Treat low confidence or an empty result as 'not covered by the documents'."
                .to_string(),
        );
        info
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveParams {
    /// Question or search query.
    pub query: String,
    /// Maximum number of passages (default: configured top_k).
    pub top_k: Option<usize>,
    /// Minimum similarity in [-1, 1] (default: configured threshold).
    pub threshold: Option<f32>,
    /// Include passage text in results (default: true).
    pub include_text: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    query: String,
    confidence: f32,
    result_count: usize,
    results: Vec<PassageItem>,
    citations: Vec<CitationItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PassageItem {
    source: PathBuf,
    file_name: String,
    page: u32,
    similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl PassageItem {
    fn new(result: SearchResult, include_text: bool) -> Self {
        let file_name = file_name(&result.source);
        Self {
            file_name,
            page: result.page,
            similarity: result.similarity,
            text: include_text.then_some(result.text),
            source: result.source,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CitationItem {
    source: PathBuf,
    file_name: String,
    similarity: f32,
}

impl From<Citation> for CitationItem {
    fn from(citation: Citation) -> Self {
        Self {
            file_name: citation.file_name(),
            similarity: citation.similarity,
            source: citation.source,
        }
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_summary(
    query: &str,
    items: &[PassageItem],
    confidence: f32,
) -> String {
    if items.is_empty() {
        return format!("No passages above the threshold for \"{query}\"");
    }

    let suffix = if items.len() == 1 { "" } else { "s" };
    let mut lines = Vec::with_capacity(items.len() + 1);
    lines.push(format!(
        "Found {} passage{suffix} for \"{query}\" (confidence {confidence:.4}):",
        items.len()
    ));
    for item in items {
        lines.push(format!(
            "{:.3} {} p.{}",
            item.similarity, item.file_name, item.page
        ));
    }
    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

/// Serve `ragindex_retrieve` over stdio until the client disconnects.
///
/// The model and the index are loaded before the server starts; either
/// failing aborts startup.
pub fn run_mcp(config: &RetrievalConfig) -> error::Result<()> {
    let backend =
        EmbeddingBackend::from_env(&config.model_id, &RetryPolicy::default())?;
    let mut retriever = Retriever::new(backend);
    retriever.load_index(&config.index_path)?;

    let server = RagMcpServer::new(retriever, config.search_params());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chunking::Chunk,
        embedding::HashEmbedder,
        vector_index::VectorIndex,
    };

    fn server() -> RagMcpServer {
        let chunks = vec![
            Chunk::new(
                "Welding requirements for steel pipes",
                "/docs/weld.txt",
                1,
                0,
            )
            .unwrap(),
            Chunk::new("Pipe welding inspection", "/docs/weld.txt", 2, 1)
                .unwrap(),
            Chunk::new("Banana bread recipe", "/docs/bake.md", 1, 0).unwrap(),
        ];
        let mut embedder = HashEmbedder::default();
        let index = VectorIndex::build(chunks, &mut embedder, 8).unwrap();
        let retriever = Retriever::new(EmbeddingBackend::Hash(embedder))
            .with_index(index)
            .unwrap();
        RagMcpServer::new(retriever, SearchParams::default())
    }

    #[tokio::test]
    async fn retrieve_tool_returns_structured_results() {
        let params = RetrieveParams {
            query: "welding requirements".to_string(),
            top_k: Some(5),
            threshold: Some(0.45),
            include_text: Some(true),
        };

        let result =
            server().ragindex_retrieve(Parameters(params)).await.unwrap();

        let structured = result.structured_content.expect("structured");
        let results = structured
            .get("results")
            .and_then(|v| v.as_array())
            .expect("results array");
        assert!(!results.is_empty());
        assert_eq!(
            results[0].get("fileName").and_then(|v| v.as_str()),
            Some("weld.txt")
        );
        assert!(results[0].get("text").is_some());

        let citations = structured
            .get("citations")
            .and_then(|v| v.as_array())
            .expect("citations array");
        assert_eq!(citations.len(), 1);

        let confidence = structured
            .get("confidence")
            .and_then(|v| v.as_f64())
            .expect("confidence");
        assert!(confidence > 0.0 && confidence <= 1.0);

        let summary = result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default();
        assert!(summary.contains("for \"welding requirements\""));
    }

    #[tokio::test]
    async fn no_match_is_empty_not_an_error() {
        let params = RetrieveParams {
            query: "quantum chromodynamics".to_string(),
            top_k: None,
            threshold: None,
            include_text: Some(false),
        };

        let result =
            server().ragindex_retrieve(Parameters(params)).await.unwrap();
        let structured = result.structured_content.expect("structured");

        assert_eq!(
            structured.get("resultCount").and_then(|v| v.as_u64()),
            Some(0)
        );
        assert_eq!(
            structured.get("confidence").and_then(|v| v.as_f64()),
            Some(0.0)
        );
    }

    #[tokio::test]
    async fn rejects_out_of_range_threshold() {
        let params = RetrieveParams {
            query: "welding".to_string(),
            top_k: Some(3),
            threshold: Some(2.0),
            include_text: None,
        };
        assert!(server().ragindex_retrieve(Parameters(params)).await.is_err());
    }
}
