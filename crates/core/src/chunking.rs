use crate::models::{Chunk, ChunkMetadata, Element, ElementCategory};
use std::collections::BTreeSet;

#[derive(Debug, Default)]
struct OpenChunk {
    texts: Vec<String>,
    page_numbers: BTreeSet<u32>,
    section_title: Option<String>,
    element_ids: Vec<String>,
}

impl OpenChunk {
    fn titled(title: String) -> Self {
        Self {
            texts: vec![title.clone()],
            section_title: Some(title),
            ..Self::default()
        }
    }

    fn into_chunk(self) -> Option<Chunk> {
        if self.texts.is_empty() {
            return None;
        }

        Some(Chunk {
            text: self.texts.join("\n"),
            metadata: ChunkMetadata {
                page_numbers: self.page_numbers.into_iter().collect(),
                section_title: self.section_title,
                element_ids: self.element_ids,
            },
        })
    }
}

/// Text an element contributes to its chunk: tables with an HTML rendering
/// are embedded as a tagged HTML block.
pub fn element_text(element: &Element) -> String {
    match (&element.category, &element.text_as_html) {
        (ElementCategory::Table, Some(html)) => {
            format!("\n\n[HTML_TABLE]\n{html}\n[/HTML_TABLE]")
        }
        _ => element.text.trim().to_string(),
    }
}

/// Titles that read like sentences (a period and more than four words) are
/// narrative text the partitioner mislabeled.
pub fn effective_category(element: &Element, text: &str) -> ElementCategory {
    if element.category == ElementCategory::Title
        && text.contains('.')
        && text.split_whitespace().count() > 4
    {
        ElementCategory::NarrativeText
    } else {
        element.category.clone()
    }
}

/// Groups reading-ordered elements into section chunks.
///
/// A title opens a new chunk unless it directly follows another title, in which
/// case the titles stack in the same chunk. Everything else is appended to the
/// open chunk; content before the first title lands in an untitled chunk.
pub fn combine_elements_for_rag(elements: &[Element]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Option<OpenChunk> = None;
    let mut prev_was_title = false;

    for element in elements {
        let text = element_text(element);
        let category = effective_category(element, &text);

        let open = if category == ElementCategory::Title {
            let open = match current.take() {
                Some(mut open) if prev_was_title => {
                    open.texts.push(text);
                    open
                }
                previous => {
                    chunks.extend(previous.and_then(OpenChunk::into_chunk));
                    OpenChunk::titled(text)
                }
            };
            prev_was_title = true;
            current.insert(open)
        } else {
            let open = current.get_or_insert_with(OpenChunk::default);
            open.texts.push(text);
            prev_was_title = false;
            open
        };

        if let Some(page) = element.page_number.filter(|page| *page != 0) {
            open.page_numbers.insert(page);
        }
        if !element.element_id.is_empty() {
            open.element_ids.push(element.element_id.clone());
        }
    }

    chunks.extend(current.and_then(OpenChunk::into_chunk));
    chunks
}
