use serde_json::{json, Value};

/// Retrieval tool backed by a Vertex AI Search datastore.
///
/// The model performs the search itself. The tool only contributes the
/// grounding declaration attached to each `generateContent` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAiSearchTool {
    pub data_store_id: String,
}

impl VertexAiSearchTool {
    pub fn new(data_store_id: impl Into<String>) -> Self {
        Self {
            data_store_id: data_store_id.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        "vertex_ai_search"
    }

    pub fn declaration(&self) -> Value {
        json!({
            "retrieval": {
                "vertexAiSearch": {
                    "datastore": self.data_store_id,
                }
            }
        })
    }
}
