use crate::embeddings::Embedder;
use crate::llm::ChatModel;
use crate::models::{QueryState, VectorMatch};
use crate::traits::VectorIndex;
use crate::SearchError;
use serde::Serialize;
use std::fmt;
use tracing::info;

pub const DEFAULT_TOP_K: usize = 8;
const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    UserQuery,
    FetchQueryVector,
    FetchMatchesFromVectorstore,
    GenerateAnswer,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [
        Stage::UserQuery,
        Stage::FetchQueryVector,
        Stage::FetchMatchesFromVectorstore,
        Stage::GenerateAnswer,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::UserQuery => "User_query",
            Stage::FetchQueryVector => "Fetch_query_vector",
            Stage::FetchMatchesFromVectorstore => "Fetch_matches_from_vectorstore",
            Stage::GenerateAnswer => "Generate_answer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a stage wrote into the state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StageOutput {
    Question(String),
    QueryVector(Vec<f32>),
    Context(String),
    Answer(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageUpdate {
    pub stage: Stage,
    pub output: StageOutput,
}

impl fmt::Display for StageUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.output {
            StageOutput::Question(question) => write!(f, "{}: question={question}", self.stage),
            StageOutput::QueryVector(vector) => {
                write!(f, "{}: query_vector=[{} dims]", self.stage, vector.len())
            }
            StageOutput::Context(context) => {
                write!(f, "{}: context=\n{context}", self.stage)
            }
            StageOutput::Answer(answer) => write!(f, "{}: answer=\n{answer}", self.stage),
        }
    }
}

/// Four-stage retrieve-then-generate pipeline: question, embedding, vector
/// retrieval, grounded answer.
pub struct QueryGraph<E, V, L>
where
    E: Embedder,
    V: VectorIndex,
    L: ChatModel,
{
    embedder: E,
    index: V,
    llm: L,
    top_k: usize,
}

impl<E, V, L> QueryGraph<E, V, L>
where
    E: Embedder,
    V: VectorIndex,
    L: ChatModel,
{
    pub fn new(embedder: E, index: V, llm: L) -> Self {
        Self {
            embedder,
            index,
            llm,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub async fn invoke(&self, question: &str) -> Result<QueryState, SearchError> {
        self.run(question, |_| {}).await
    }

    pub async fn run<F>(&self, question: &str, mut on_update: F) -> Result<QueryState, SearchError>
    where
        F: FnMut(&StageUpdate) + Send,
    {
        if question.trim().is_empty() {
            return Err(SearchError::Request("question is empty".to_string()));
        }
        if self.top_k == 0 {
            return Err(SearchError::Request("top_k must be positive".to_string()));
        }

        let mut state = QueryState {
            question: question.to_string(),
            ..QueryState::default()
        };

        for stage in Stage::ORDER {
            let output = self.step(stage, &state).await?;
            apply(&mut state, &output);
            info!(stage = %stage, "stage complete");
            on_update(&StageUpdate { stage, output });
        }

        Ok(state)
    }

    async fn step(&self, stage: Stage, state: &QueryState) -> Result<StageOutput, SearchError> {
        match stage {
            Stage::UserQuery => Ok(StageOutput::Question(state.question.clone())),
            Stage::FetchQueryVector => {
                let vector = self.embedder.embed(&state.question).await?;
                Ok(StageOutput::QueryVector(vector))
            }
            Stage::FetchMatchesFromVectorstore => {
                let vector = state.query_vector.as_deref().ok_or_else(|| {
                    SearchError::Request("query vector missing before retrieval".to_string())
                })?;
                let matches = self.index.query(vector, self.top_k).await?;
                Ok(StageOutput::Context(format_context(&matches)))
            }
            Stage::GenerateAnswer => {
                let context = state.context.as_deref().unwrap_or_default();
                let prompt = answer_prompt(context, &state.question);
                let answer = self.llm.complete(&prompt).await?;
                Ok(StageOutput::Answer(answer))
            }
        }
    }
}

fn apply(state: &mut QueryState, output: &StageOutput) {
    match output {
        StageOutput::Question(question) => state.question = question.clone(),
        StageOutput::QueryVector(vector) => state.query_vector = Some(vector.clone()),
        StageOutput::Context(context) => state.context = Some(context.clone()),
        StageOutput::Answer(answer) => state.answer = Some(answer.clone()),
    }
}

fn join_or_na(values: &[String]) -> String {
    if values.is_empty() {
        "N/A".to_string()
    } else {
        values.join(", ")
    }
}

/// Renders retrieved matches as the context block handed to the model.
pub fn format_context(matches: &[VectorMatch]) -> String {
    matches
        .iter()
        .map(|hit| {
            format!(
                "Pages: {}\nChunk ID: {}\nSection: {}\n{}",
                join_or_na(&hit.metadata.page_numbers),
                hit.id,
                join_or_na(&hit.metadata.section_titles),
                hit.metadata.text
            )
        })
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}

pub fn answer_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a knowledgeable and helpful Dungeons & Dragons rules assistant. \
Your answer must be based exclusively on the provided context. \
Use the numbered context chunks to support your answer and reference the corresponding page numbers when applicable. \
If the context does not contain enough information, please state that additional details are needed.\n\n\
Example 1:\n\
Context:\n\
\"Pages 120-123: In this section, the rules for critical hits are detailed. A natural 20 triggers extra damage dice.\"\n\
Question:\n\
\"What happens when a player scores a critical hit?\"\n\
Answer:\n\
\"When a critical hit is scored, the attacker rolls all the damage dice twice and sums the results. (See pages 120-123 for details.)\"\n\n\
Example 2:\n\
Context:\n\
\"Pages 45-47: This section explains spell slot usage, detailing how spellcasters manage their limited resources.\"\n\
Question:\n\
\"How do spell slots work for a spellcaster?\"\n\
Answer:\n\
\"Spell slots represent a caster's limited resource for casting spells. Once used, they cannot be reused until a rest is taken. (Refer to pages 45-47.)\"\n\n\
Context:\n{context}\n\n\
Question: {question}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{VectorMetadata, VectorRecord};
    use crate::stores::MemoryVectorStore;
    use crate::CharacterNgramEmbedder;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn complete(&self, prompt: &str) -> Result<String, SearchError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            Ok("Meteor Swarm is a 9th-level spell (page 160).".to_string())
        }
    }

    fn hit(id: &str, pages: &[&str], sections: &[&str], text: &str) -> VectorMatch {
        VectorMatch {
            id: id.to_string(),
            score: 0.9,
            metadata: VectorMetadata {
                text: text.to_string(),
                page_numbers: pages.iter().map(|p| p.to_string()).collect(),
                section_titles: sections.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    #[test]
    fn context_lists_pages_ids_and_sections() {
        let context = format_context(&[
            hit("chunk-1", &["160", "161"], &["Meteor Swarm"], "Blazing orbs."),
            hit("chunk-2", &[], &[], "Loose text."),
        ]);

        assert_eq!(
            context,
            "Pages: 160, 161\nChunk ID: chunk-1\nSection: Meteor Swarm\nBlazing orbs.\
\n\n---\n\n\
Pages: N/A\nChunk ID: chunk-2\nSection: N/A\nLoose text."
        );
    }

    #[test]
    fn prompt_ends_with_context_and_question() {
        let prompt = answer_prompt("CTX", "Who can cast it?");
        assert!(prompt.starts_with("You are a knowledgeable and helpful Dungeons & Dragons rules assistant."));
        assert!(prompt.ends_with("Context:\nCTX\n\nQuestion: Who can cast it?"));
    }

    #[tokio::test]
    async fn graph_runs_stages_in_order_and_threads_state() -> Result<(), SearchError> {
        let embedder = CharacterNgramEmbedder { dimensions: 64 };
        let records = vec![
            VectorRecord {
                id: "chunk-0".to_string(),
                values: embedder.embed_sync("Meteor Swarm blazing orbs of fire"),
                metadata: VectorMetadata {
                    text: "Meteor Swarm: blazing orbs of fire plummet.".to_string(),
                    page_numbers: vec!["160".to_string()],
                    section_titles: vec!["Meteor Swarm".to_string()],
                },
            },
            VectorRecord {
                id: "chunk-1".to_string(),
                values: embedder.embed_sync("Barbarian rage unarmored defense"),
                metadata: VectorMetadata {
                    text: "Barbarians rage.".to_string(),
                    page_numbers: vec!["8".to_string()],
                    section_titles: vec!["Barbarian".to_string()],
                },
            },
        ];
        let graph = QueryGraph::new(
            embedder,
            MemoryVectorStore::with_records(records),
            RecordingModel::default(),
        )
        .with_top_k(1);

        let mut seen = Vec::new();
        let state = graph
            .run("Tell me about Meteor Swarm", |update| seen.push(update.stage))
            .await?;

        assert_eq!(seen, Stage::ORDER.to_vec());
        assert_eq!(state.query_vector.as_ref().map(Vec::len), Some(64));
        let context = state.context.clone().unwrap_or_default();
        assert!(context.contains("Chunk ID: chunk-0"));
        assert!(!context.contains("chunk-1"));
        assert_eq!(
            state.answer.as_deref(),
            Some("Meteor Swarm is a 9th-level spell (page 160).")
        );

        let prompts = graph.llm.prompts.lock().map(|p| p.clone()).unwrap_or_default();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(&context));
        Ok(())
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let graph = QueryGraph::new(
            CharacterNgramEmbedder::default(),
            MemoryVectorStore::new(),
            RecordingModel::default(),
        );

        assert!(graph.invoke("   ").await.is_err());
    }
}
