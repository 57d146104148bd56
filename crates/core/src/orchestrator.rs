use crate::chat::ChatMessage;
use crate::embeddings::Embedder;
use crate::traits::{ChatModel, VectorIndex};
use crate::{Answer, ChatTurn, RetrievedChunk, ServiceError};
use std::fmt::Write as _;
use tracing::debug;

pub const DEFAULT_TOP_K: usize = 4;
pub const PREVIEW_CHARS: usize = 160;

const ANSWER_INSTRUCTIONS: &str = "Use the following pieces of context to answer the user's \
question. If you don't know the answer, just say that you don't know, don't try to make up an \
answer.";

const CONDENSE_INSTRUCTIONS: &str = "Given the conversation so far and a follow-up question, \
rephrase the follow-up question to be a standalone question. Reply with the standalone question \
only.";

#[derive(Debug, Clone)]
pub struct ConversationOptions {
    pub top_k: usize,
    /// Rewrite follow-up questions into standalone ones before retrieval.
    pub condense_question: bool,
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            condense_question: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    AwaitingInput,
    Retrieving,
    Generating,
    Displaying,
}

/// Answers questions over one indexed collection and remembers the conversation.
pub struct ConversationCoordinator<E, V, C>
where
    E: Embedder,
    V: VectorIndex,
    C: ChatModel,
{
    embedder: E,
    index: V,
    model: C,
    options: ConversationOptions,
    history: Vec<ChatTurn>,
    phase: LoopPhase,
}

impl<E, V, C> ConversationCoordinator<E, V, C>
where
    E: Embedder,
    V: VectorIndex,
    C: ChatModel,
{
    pub fn new(embedder: E, index: V, model: C, options: ConversationOptions) -> Self {
        Self {
            embedder,
            index,
            model,
            options,
            history: Vec::new(),
            phase: LoopPhase::AwaitingInput,
        }
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    fn enter(&mut self, phase: LoopPhase) {
        debug!(from = ?self.phase, to = ?phase, "conversation phase");
        self.phase = phase;
    }

    /// Retrieves context for `question`, asks the model, and records the turn.
    pub async fn ask(&mut self, question: &str) -> Result<Answer, ServiceError> {
        if question.trim().is_empty() {
            return Err(ServiceError::Request("question is empty".to_string()));
        }

        let result = self.answer(question).await;
        self.enter(LoopPhase::AwaitingInput);
        result
    }

    async fn answer(&mut self, question: &str) -> Result<Answer, ServiceError> {
        self.enter(LoopPhase::Retrieving);
        let search_text = if self.options.condense_question && !self.history.is_empty() {
            let standalone = self
                .model
                .complete(&condense_messages(&self.history, question))
                .await?;
            debug!(%standalone, "condensed follow-up question");
            standalone
        } else {
            question.to_string()
        };

        let query_vector = self.embedder.embed(&search_text).await?;
        let sources = self.index.search(&query_vector, self.options.top_k).await?;
        debug!(hits = sources.len(), "retrieved context");

        self.enter(LoopPhase::Generating);
        let messages = answer_messages(&self.history, &sources, question);
        let text = self.model.complete(&messages).await?;

        self.history.push(ChatTurn {
            question: question.to_string(),
            answer: text.clone(),
        });
        self.enter(LoopPhase::Displaying);

        Ok(Answer {
            question: question.to_string(),
            text,
            sources,
        })
    }
}

fn history_messages(history: &[ChatTurn]) -> impl Iterator<Item = ChatMessage> + '_ {
    history.iter().flat_map(|turn| {
        [
            ChatMessage::user(turn.question.clone()),
            ChatMessage::assistant(turn.answer.clone()),
        ]
    })
}

/// System prompt with the retrieved context, then the prior turns, then the question.
pub fn answer_messages(
    history: &[ChatTurn],
    sources: &[RetrievedChunk],
    question: &str,
) -> Vec<ChatMessage> {
    let context = sources
        .iter()
        .map(|source| source.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut messages = vec![ChatMessage::system(format!(
        "{ANSWER_INSTRUCTIONS}\n----------------\n{context}"
    ))];
    messages.extend(history_messages(history));
    messages.push(ChatMessage::user(question));
    messages
}

fn condense_messages(history: &[ChatTurn], question: &str) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(CONDENSE_INSTRUCTIONS)];
    messages.extend(history_messages(history));
    messages.push(ChatMessage::user(format!("Follow-up question: {question}")));
    messages
}

pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Console rendering: each source's page and preview, then the answer.
pub fn render_answer(answer: &Answer) -> String {
    let mut output = String::from("\n\nSources:\n\n");
    for source in &answer.sources {
        let _ = writeln!(output, "Page: {}", source.chunk.page_number);
        let _ = writeln!(
            output,
            "Text chunks: {}...\n",
            preview(&source.chunk.content, PREVIEW_CHARS)
        );
    }
    let _ = write!(output, "Answer: {}", answer.text);
    output
}
