use crate::error::IngestError;
use crate::models::{Element, ElementCategory};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_PARTITION_URL: &str = "https://api.unstructuredapp.io/general/v0/general";

/// Turns a PDF into typed layout elements.
#[async_trait]
pub trait Partitioner: Send + Sync {
    async fn partition(&self, path: &Path) -> Result<Vec<Element>, IngestError>;
}

/// Provides table elements rendered as HTML, used to enrich locally parsed tables.
#[async_trait]
pub trait TableHtmlSource: Send + Sync {
    async fn table_html_elements(&self, path: &Path) -> Result<Vec<Element>, IngestError>;
}

#[derive(Debug, Clone, Deserialize)]
struct ApiElement {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    element_id: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: ApiMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiMetadata {
    #[serde(default)]
    page_number: Option<u32>,
    #[serde(default)]
    coordinates: Option<ApiCoordinates>,
    #[serde(default)]
    text_as_html: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiCoordinates {
    #[serde(default)]
    points: Vec<(f64, f64)>,
}

impl From<ApiElement> for Element {
    fn from(value: ApiElement) -> Self {
        let element_id = value
            .element_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| fallback_element_id(value.metadata.page_number, &value.text));
        let coordinates = value
            .metadata
            .coordinates
            .map(|coordinates| coordinates.points)
            .filter(|points| !points.is_empty());

        Element {
            element_id,
            category: ElementCategory::from(value.kind),
            text: value.text,
            page_number: value.metadata.page_number,
            coordinates,
            text_as_html: value.metadata.text_as_html,
        }
    }
}

fn fallback_element_id(page: Option<u32>, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(page.unwrap_or(0).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn parse_elements(payload: &str) -> Result<Vec<Element>, IngestError> {
    let elements: Vec<ApiElement> = serde_json::from_str(payload)?;
    Ok(elements.into_iter().map(Element::from).collect())
}

/// Keeps only tables that carry an HTML rendering.
pub fn table_html_elements(elements: Vec<Element>) -> Vec<Element> {
    elements
        .into_iter()
        .filter(|element| element.category == ElementCategory::Table && element.text_as_html.is_some())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// Layout-aware local-model pass with table structure inference.
    HiRes,
    /// Vision-model pass, used for table HTML.
    Vlm,
}

impl PartitionStrategy {
    fn form_fields(self) -> Vec<(&'static str, &'static str)> {
        match self {
            Self::HiRes => vec![
                ("strategy", "hi_res"),
                ("pdf_infer_table_structure", "true"),
                ("coordinates", "true"),
            ],
            Self::Vlm => vec![
                ("strategy", "vlm"),
                ("vlm_model", "gpt-4o"),
                ("vlm_model_provider", "openai"),
            ],
        }
    }
}

pub struct UnstructuredClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl UnstructuredClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    pub async fn partition_with(
        &self,
        path: &Path,
        strategy: PartitionStrategy,
    ) -> Result<Vec<Element>, IngestError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;

        let mut form = Form::new().part(
            "files",
            Part::bytes(bytes)
                .file_name(file_name)
                .mime_str("application/pdf")?,
        );
        for (key, value) in strategy.form_fields() {
            form = form.text(key, value);
        }

        debug!(endpoint = %self.endpoint, ?strategy, path = %path.display(), "partition request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("unstructured-api-key", &self.api_key)
            .header("accept", "application/json")
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::PartitionFailed {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        parse_elements(&body)
    }
}

#[async_trait]
impl Partitioner for UnstructuredClient {
    async fn partition(&self, path: &Path) -> Result<Vec<Element>, IngestError> {
        self.partition_with(path, PartitionStrategy::HiRes).await
    }
}

#[async_trait]
impl TableHtmlSource for UnstructuredClient {
    async fn table_html_elements(&self, path: &Path) -> Result<Vec<Element>, IngestError> {
        let elements = self.partition_with(path, PartitionStrategy::Vlm).await?;
        Ok(table_html_elements(elements))
    }
}

/// Reads a previously saved partition response instead of calling the service.
pub struct ElementDumpPartitioner {
    dump: std::path::PathBuf,
}

impl ElementDumpPartitioner {
    pub fn new(dump: impl Into<std::path::PathBuf>) -> Self {
        Self { dump: dump.into() }
    }

    async fn load(&self) -> Result<Vec<Element>, IngestError> {
        let payload = tokio::fs::read_to_string(&self.dump).await?;
        parse_elements(&payload)
    }
}

#[async_trait]
impl Partitioner for ElementDumpPartitioner {
    async fn partition(&self, _path: &Path) -> Result<Vec<Element>, IngestError> {
        self.load().await
    }
}

#[async_trait]
impl TableHtmlSource for ElementDumpPartitioner {
    async fn table_html_elements(&self, _path: &Path) -> Result<Vec<Element>, IngestError> {
        Ok(table_html_elements(self.load().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"[
        {"type": "Title", "element_id": "a1", "text": "Barbarian",
         "metadata": {"page_number": 8, "coordinates": {"points": [[100.0, 200.0], [100.0, 240.0]], "system": "PixelSpace"}}},
        {"type": "Table", "element_id": "", "text": "Level Rages",
         "metadata": {"page_number": 8, "text_as_html": "<table></table>"}},
        {"type": "PageBreak", "text": ""}
    ]"#;

    #[test]
    fn api_payload_converts_to_elements() {
        let elements = parse_elements(PAYLOAD).expect("payload should parse");

        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].category, ElementCategory::Title);
        assert_eq!(elements[0].origin(), Some((100.0, 200.0)));
        assert_eq!(elements[1].coordinates, None);
        assert_eq!(elements[1].element_id.len(), 64);
        assert_eq!(
            elements[2].category,
            ElementCategory::Other("PageBreak".to_string())
        );
        assert_eq!(elements[2].page_number, None);
    }

    #[test]
    fn only_tables_with_html_are_kept() {
        let elements = parse_elements(PAYLOAD).expect("payload should parse");
        let tables = table_html_elements(elements);

        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].text, "Level Rages");
    }

    #[tokio::test]
    async fn dump_partitioner_reads_saved_elements() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let dump = dir.path().join("elements.json");
        std::fs::write(&dump, PAYLOAD)?;

        let partitioner = ElementDumpPartitioner::new(&dump);
        let elements = partitioner.partition(Path::new("rules.pdf")).await?;
        let tables = partitioner.table_html_elements(Path::new("rules.pdf")).await?;

        assert_eq!(elements.len(), 3);
        assert_eq!(tables.len(), 1);
        Ok(())
    }

    #[test]
    fn table_pass_uploads_the_whole_document() {
        let fields = PartitionStrategy::Vlm.form_fields();

        assert!(fields.contains(&("strategy", "vlm")));
        assert!(fields.iter().all(|(key, _)| !key.starts_with("split_pdf")));
    }
}
