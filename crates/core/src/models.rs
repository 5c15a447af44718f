use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ElementCategory {
    Title,
    NarrativeText,
    Table,
    UncategorizedText,
    ListItem,
    Header,
    Footer,
    Image,
    FigureCaption,
    Other(String),
}

impl ElementCategory {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Title => "Title",
            Self::NarrativeText => "NarrativeText",
            Self::Table => "Table",
            Self::UncategorizedText => "UncategorizedText",
            Self::ListItem => "ListItem",
            Self::Header => "Header",
            Self::Footer => "Footer",
            Self::Image => "Image",
            Self::FigureCaption => "FigureCaption",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for ElementCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Title" => Self::Title,
            "NarrativeText" => Self::NarrativeText,
            "Table" => Self::Table,
            "UncategorizedText" => Self::UncategorizedText,
            "ListItem" => Self::ListItem,
            "Header" => Self::Header,
            "Footer" => Self::Footer,
            "Image" => Self::Image,
            "FigureCaption" => Self::FigureCaption,
            _ => Self::Other(value),
        }
    }
}

impl From<ElementCategory> for String {
    fn from(value: ElementCategory) -> Self {
        value.as_str().to_string()
    }
}

/// A typed layout element produced by the partitioning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub element_id: String,
    pub category: ElementCategory,
    pub text: String,
    pub page_number: Option<u32>,
    /// Polygon points in page pixel space; the first point is the top-left corner.
    pub coordinates: Option<Vec<(f64, f64)>>,
    pub text_as_html: Option<String>,
}

impl Element {
    pub fn origin(&self) -> Option<(f64, f64)> {
        self.coordinates
            .as_ref()
            .and_then(|points| points.first().copied())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub page_numbers: Vec<u32>,
    pub section_title: Option<String>,
    pub element_ids: Vec<String>,
}

/// A title-keyed group of elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn first_page(&self) -> Option<u32> {
        self.metadata.page_numbers.iter().min().copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedChunkMetadata {
    #[serde(default)]
    pub page_numbers: Vec<u32>,
    #[serde(default)]
    pub section_titles: Vec<String>,
    #[serde(default)]
    pub element_ids: Vec<String>,
}

/// Size-merged chunk; the unit that gets embedded and loaded into the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedChunk {
    pub text: String,
    #[serde(default)]
    pub metadata: MergedChunkMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl MergedChunk {
    pub(crate) fn absorb(&mut self, chunk: &Chunk) {
        if !self.text.is_empty() {
            self.text.push_str("\n\n");
        }
        self.text.push_str(&chunk.text);

        let pages: BTreeSet<u32> = self
            .metadata
            .page_numbers
            .iter()
            .chain(chunk.metadata.page_numbers.iter())
            .copied()
            .collect();
        self.metadata.page_numbers = pages.into_iter().collect();

        if let Some(title) = chunk
            .metadata
            .section_title
            .as_ref()
            .filter(|title| !title.is_empty())
        {
            self.metadata.section_titles.push(title.clone());
        }
        self.metadata
            .element_ids
            .extend(chunk.metadata.element_ids.iter().cloned());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub page_numbers: Vec<String>,
    #[serde(default)]
    pub section_titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: VectorMetadata,
}

/// State threaded through the query graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryState {
    pub question: String,
    pub query_vector: Option<Vec<f32>>,
    pub context: Option<String>,
    pub answer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChunkingOptions {
    pub split_x: f64,
    pub table_match_threshold: f64,
    pub boilerplate: Vec<String>,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            split_x: crate::layout::DEFAULT_SPLIT_X,
            table_match_threshold: crate::tables::DEFAULT_TABLE_MATCH_THRESHOLD,
            boilerplate: vec![
                "Not for resale. Permission granted to print or photocopy this document for personal use only."
                    .to_string(),
                "System Reference Document 5.1".to_string(),
            ],
        }
    }
}
