use crate::chunking::combine_elements_for_rag;
use crate::filter::JunkFilter;
use crate::layout::split_and_sort_elements_by_page;
use crate::models::{Chunk, ChunkingOptions, MergedChunk, VectorMetadata, VectorRecord};
use crate::partition::{Partitioner, TableHtmlSource};
use crate::tables::enrich_tables_with_html;
use crate::traits::VectorIndex;
use crate::IngestError;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 100;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Resolves a CLI input into the PDFs to chunk: a single file or every PDF below a folder.
pub fn resolve_pdf_inputs(input: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let files = discover_pdf_files(input);
    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            input.display()
        )));
    }
    Ok(files)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkingReport {
    pub elements: usize,
    pub junk_dropped: usize,
    pub tables_enriched: usize,
    pub chunks: usize,
}

/// Runs the element pipeline for one PDF: partition, reading order, junk
/// removal, optional table HTML enrichment and title-keyed combination.
pub async fn chunk_pdf(
    partitioner: &dyn Partitioner,
    table_source: Option<&dyn TableHtmlSource>,
    path: &Path,
    options: &ChunkingOptions,
) -> Result<(Vec<Chunk>, ChunkingReport), IngestError> {
    let filter = JunkFilter::new(&options.boilerplate)?;

    let elements = partitioner.partition(path).await?;
    let element_count = elements.len();
    info!(path = %path.display(), elements = element_count, "partitioned pdf");

    let ordered = split_and_sort_elements_by_page(elements, options.split_x);
    let mut kept = filter.retain(ordered);
    let junk_dropped = element_count - kept.len();

    let tables_enriched = match table_source {
        Some(source) => {
            let api_tables = source.table_html_elements(path).await?;
            info!(api_tables = api_tables.len(), "fetched table html");
            enrich_tables_with_html(&mut kept, &api_tables, options.table_match_threshold)
        }
        None => 0,
    };

    let chunks = combine_elements_for_rag(&kept);
    let report = ChunkingReport {
        elements: element_count,
        junk_dropped,
        tables_enriched,
        chunks: chunks.len(),
    };
    info!(?report, "combined chunks");

    Ok((chunks, report))
}

/// Converts embedded chunks to index records with ids `chunk-{i}`.
pub fn to_vector_records(chunks: &[MergedChunk]) -> Result<Vec<VectorRecord>, IngestError> {
    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            let values = chunk.embedding.clone().ok_or_else(|| {
                IngestError::InvalidArgument(format!("chunk {index} has no embedding"))
            })?;

            Ok(VectorRecord {
                id: format!("chunk-{index}"),
                values,
                metadata: VectorMetadata {
                    text: chunk.text.clone(),
                    page_numbers: chunk
                        .metadata
                        .page_numbers
                        .iter()
                        .map(u32::to_string)
                        .collect(),
                    section_titles: chunk.metadata.section_titles.clone(),
                },
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub created_index: bool,
    pub skipped: bool,
    pub batches: usize,
    pub upserted: usize,
}

/// Populates the index from embedded chunks, only when it holds no vectors yet.
pub async fn load_vector_index<V>(
    index: &V,
    chunks: &[MergedChunk],
    batch_size: usize,
) -> Result<LoadReport, IngestError>
where
    V: VectorIndex + ?Sized,
{
    if batch_size == 0 {
        return Err(IngestError::InvalidArgument("batch size must be positive".to_string()));
    }

    let records = to_vector_records(chunks)?;
    let dimension = records
        .first()
        .map(|record| record.values.len())
        .ok_or_else(|| IngestError::InvalidArgument("no embedded chunks to load".to_string()))?;

    let created_index = index.ensure_index(dimension).await?;
    let existing = index.vector_count().await?;
    if existing > 0 {
        warn!(existing, "Index already contains data. Skipping upsert.");
        return Ok(LoadReport {
            created_index,
            skipped: true,
            ..LoadReport::default()
        });
    }

    info!(records = records.len(), "Index is empty. Populating it...");
    let mut report = LoadReport {
        created_index,
        ..LoadReport::default()
    };
    for (batch_index, batch) in records.chunks(batch_size).enumerate() {
        index.upsert(batch).await?;
        report.batches += 1;
        report.upserted += batch.len();
        info!(batch = batch_index + 1, size = batch.len(), "upserted batch");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Element, ElementCategory, MergedChunkMetadata};
    use crate::stores::MemoryVectorStore;
    use async_trait::async_trait;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    struct FixedPartitioner(Vec<Element>);

    #[async_trait]
    impl Partitioner for FixedPartitioner {
        async fn partition(&self, _path: &Path) -> Result<Vec<Element>, IngestError> {
            Ok(self.0.clone())
        }
    }

    #[async_trait]
    impl TableHtmlSource for FixedPartitioner {
        async fn table_html_elements(&self, _path: &Path) -> Result<Vec<Element>, IngestError> {
            Ok(self.0.clone())
        }
    }

    fn element(
        id: &str,
        category: ElementCategory,
        text: &str,
        page: u32,
        origin: (f64, f64),
    ) -> Element {
        Element {
            element_id: id.to_string(),
            category,
            text: text.to_string(),
            page_number: Some(page),
            coordinates: Some(vec![origin]),
            text_as_html: None,
        }
    }

    fn embedded(text: &str, pages: Vec<u32>) -> MergedChunk {
        MergedChunk {
            text: text.to_string(),
            metadata: MergedChunkMetadata {
                page_numbers: pages,
                section_titles: vec!["Spells".to_string()],
                element_ids: Vec::new(),
            },
            embedding: Some(vec![1.0, 0.0, 0.0]),
        }
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn folder_without_pdfs_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        assert!(resolve_pdf_inputs(dir.path()).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn chunk_pdf_runs_the_element_pipeline() -> Result<(), IngestError> {
        let mut api_table = element("api", ElementCategory::Table, "Level Rages", 8, (0.0, 0.0));
        api_table.text_as_html = Some("<table>rages</table>".to_string());

        let partitioner = FixedPartitioner(vec![
            element("r1", ElementCategory::NarrativeText, "Right column", 8, (900.0, 10.0)),
            element("t1", ElementCategory::Title, "Barbarian", 8, (100.0, 10.0)),
            element("n1", ElementCategory::UncategorizedText, "8", 8, (100.0, 990.0)),
            element("tab", ElementCategory::Table, "Level Rages", 8, (100.0, 500.0)),
        ]);
        let tables = FixedPartitioner(vec![api_table]);

        let (chunks, report) = chunk_pdf(
            &partitioner,
            Some(&tables),
            Path::new("rules.pdf"),
            &ChunkingOptions::default(),
        )
        .await?;

        assert_eq!(report.elements, 4);
        assert_eq!(report.junk_dropped, 1);
        assert_eq!(report.tables_enriched, 1);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.element_ids, vec!["t1", "tab", "r1"]);
        assert!(chunks[0].text.contains("[HTML_TABLE]\n<table>rages</table>"));
        assert!(chunks[0].text.ends_with("Right column"));
        Ok(())
    }

    #[test]
    fn records_use_positional_ids_and_string_pages() -> Result<(), IngestError> {
        let records = to_vector_records(&[embedded("a", vec![3, 4]), embedded("b", vec![5])])?;

        assert_eq!(records[0].id, "chunk-0");
        assert_eq!(records[1].id, "chunk-1");
        assert_eq!(records[0].metadata.page_numbers, vec!["3", "4"]);
        assert_eq!(records[1].metadata.section_titles, vec!["Spells"]);
        Ok(())
    }

    #[test]
    fn missing_embeddings_are_rejected() {
        let mut chunk = embedded("a", vec![1]);
        chunk.embedding = None;
        assert!(to_vector_records(&[chunk]).is_err());
    }

    #[tokio::test]
    async fn load_populates_empty_index_in_batches() -> Result<(), IngestError> {
        let store = MemoryVectorStore::new();
        let chunks: Vec<MergedChunk> = (0..5)
            .map(|index| embedded(&format!("chunk {index}"), vec![index]))
            .collect();

        let report = load_vector_index(&store, &chunks, 2).await?;

        assert!(report.created_index);
        assert!(!report.skipped);
        assert_eq!(report.batches, 3);
        assert_eq!(report.upserted, 5);
        assert_eq!(store.vector_count().await?, 5);
        Ok(())
    }

    #[tokio::test]
    async fn load_skips_populated_index() -> Result<(), IngestError> {
        let store = MemoryVectorStore::new();
        let chunks = vec![embedded("first", vec![1])];
        load_vector_index(&store, &chunks, DEFAULT_UPSERT_BATCH_SIZE).await?;

        let second = load_vector_index(&store, &chunks, DEFAULT_UPSERT_BATCH_SIZE).await?;

        assert!(!second.created_index);
        assert!(second.skipped);
        assert_eq!(second.upserted, 0);
        Ok(())
    }
}
