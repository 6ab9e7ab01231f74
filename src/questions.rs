//! Trivia question sourcing
//!
//! Questions come from a prioritized chain of sources: a generative text
//! source, the knowledge store, then a static pool. Every candidate is
//! compared against a bounded history of recently asked questions and
//! rejected when it is too similar to one of them. When every source comes
//! up empty the least recently asked static question is used as is, so a
//! question is always produced.

use std::{collections::VecDeque, fmt::Display, sync::Arc};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    config::Options,
    constants::questions::KNOWLEDGE_CATEGORY,
    session::{KnowledgeEntry, KnowledgeStore, TextGenerator},
};

const GENERATION_PROMPT: &str = "Write one short trivia question that has a single short \
    answer. Reply only with JSON of the form {\"question\": \"...\", \"answer\": \"...\"}.";

const DEFAULT_POOL: [(&str, &str); 5] = [
    ("What's the capital of Japan?", "tokyo"),
    ("What's 7 x 8?", "56"),
    ("What color do you get mixing red and blue?", "purple"),
    ("How many days are in a leap year?", "366"),
    ("What's the largest planet in our solar system?", "jupiter"),
];

/// Where a question came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Produced by the text generator
    Generative,
    /// Drawn from the knowledge store
    Knowledge,
    /// Drawn from the built-in pool
    Static,
}

impl Source {
    /// Every source in priority order
    pub const CHAIN: [Source; 3] = [Source::Generative, Source::Knowledge, Source::Static];
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Source::Generative => "generative",
            Source::Knowledge => "knowledge",
            Source::Static => "static",
        })
    }
}

/// A trivia prompt and its raw answer key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    /// Text shown to participants
    pub prompt: String,
    /// Answer key, possibly bundling several variants
    pub answer_key: String,
    /// Where the question came from
    pub source: Source,
}

/// Similarity ratio of two prompts in `[0, 1]`, ignoring case
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.trim().to_lowercase(), &b.trim().to_lowercase())
}

/// Fixed-capacity FIFO of recently asked prompts
#[derive(Debug, Clone)]
pub struct RecentHistory {
    capacity: usize,
    prompts: VecDeque<String>,
}

impl RecentHistory {
    /// Creates an empty history holding at most `capacity` prompts
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            prompts: VecDeque::with_capacity(capacity),
        }
    }

    /// Remembers `prompt`, evicting the oldest entry when full
    pub fn push(&mut self, prompt: &str) {
        if self.capacity == 0 {
            return;
        }
        while self.prompts.len() >= self.capacity {
            self.prompts.pop_front();
        }
        self.prompts.push_back(prompt.to_owned());
    }

    /// Whether `prompt` is more similar than `threshold` to a remembered one
    pub fn is_similar(&self, prompt: &str, threshold: f64) -> bool {
        self.prompts
            .iter()
            .any(|seen| similarity(seen, prompt) > threshold)
    }
}

/// Built-in questions with least-recently-seen bookkeeping
#[derive(Debug, Clone)]
pub struct StaticPool {
    entries: Vec<(String, String)>,
    last_seen: Vec<Option<u64>>,
    clock: u64,
}

impl Default for StaticPool {
    fn default() -> Self {
        Self::new(
            DEFAULT_POOL
                .iter()
                .map(|(prompt, answer)| ((*prompt).to_owned(), (*answer).to_owned())),
        )
    }
}

impl StaticPool {
    /// Creates a pool from `(prompt, answer key)` pairs
    pub fn new<I: IntoIterator<Item = (String, String)>>(entries: I) -> Self {
        let entries = entries.into_iter().collect_vec();
        let last_seen = vec![None; entries.len()];
        Self {
            entries,
            last_seen,
            clock: 0,
        }
    }

    /// Number of questions in the pool
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool has no questions
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn random(&self) -> Option<usize> {
        (!self.entries.is_empty()).then(|| fastrand::usize(..self.entries.len()))
    }

    fn least_recently_seen(&self) -> Option<usize> {
        self.last_seen
            .iter()
            .enumerate()
            .min_by_key(|(index, seen)| (seen.map_or(0, |s| s + 1), *index))
            .map(|(index, _)| index)
    }

    fn take(&mut self, index: usize) -> Question {
        self.clock += 1;
        self.last_seen[index] = Some(self.clock);
        let (prompt, answer_key) = self.entries[index].clone();
        Question {
            prompt,
            answer_key,
            source: Source::Static,
        }
    }
}

#[derive(Deserialize)]
struct GeneratedQuestion {
    question: String,
    answer: String,
}

/// Extracts a question from generated text
///
/// A JSON object with `question` and `answer` fields is preferred; failing
/// that, `Q:`/`A:` (or `Question:`/`Answer:`) lines are looked for. Returns
/// `None` when neither yields a non-blank pair.
pub fn parse_generated(text: &str) -> Option<(String, String)> {
    let structured = text
        .find('{')
        .zip(text.rfind('}'))
        .filter(|(start, end)| start < end)
        .and_then(|(start, end)| serde_json::from_str::<GeneratedQuestion>(&text[start..=end]).ok())
        .map(|generated| (generated.question, generated.answer));

    let (question, answer) = structured.or_else(|| {
        let field = |prefixes: &[&str]| {
            text.lines().find_map(|line| {
                let line = line.trim();
                prefixes.iter().find_map(|prefix| {
                    line.get(..prefix.len())
                        .filter(|head| head.eq_ignore_ascii_case(prefix))
                        .map(|_| line[prefix.len()..].trim().to_owned())
                })
            })
        };
        field(&["question:", "q:"]).zip(field(&["answer:", "a:"]))
    })?;

    let (question, answer) = (question.trim(), answer.trim());
    (!question.is_empty() && !answer.is_empty()).then(|| (question.to_owned(), answer.to_owned()))
}

struct Recent {
    history: RecentHistory,
    pool: StaticPool,
}

/// Produces de-duplicated trivia questions
///
/// Question sources are consulted without holding the selector's lock; only
/// the similarity check and the history push run under it, as one step.
pub struct Selector {
    recent: Mutex<Recent>,
    similarity_threshold: f64,
    max_attempts: usize,
    generator: Option<Arc<dyn TextGenerator>>,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
}

impl Selector {
    /// Creates a selector backed only by the built-in pool
    pub fn new(options: &Options) -> Self {
        Self {
            recent: Mutex::new(Recent {
                history: RecentHistory::new(options.history_capacity),
                pool: StaticPool::default(),
            }),
            similarity_threshold: options.similarity_threshold,
            max_attempts: options.max_attempts.max(1),
            generator: None,
            knowledge: None,
        }
    }

    /// Adds a generative source
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Adds a knowledge store source, also used to persist accepted questions
    #[must_use]
    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Replaces the built-in pool
    #[must_use]
    pub fn with_pool(mut self, pool: StaticPool) -> Self {
        self.recent.get_mut().pool = pool;
        self
    }

    /// Picks the next question
    ///
    /// With `forced` set only that source is consulted before the
    /// least-recently-seen fallback; otherwise the full chain is walked.
    /// Returns `None` only when every source and the static pool are empty.
    pub async fn select(&self, forced: Option<Source>) -> Option<Question> {
        let chain = forced.map_or_else(|| Source::CHAIN.to_vec(), |source| vec![source]);

        for source in chain {
            if let Some(question) = self.try_source(source).await {
                self.persist(&question).await;
                return Some(question);
            }
        }

        let question = {
            let mut recent = self.recent.lock().await;
            let index = recent.pool.least_recently_seen()?;
            let question = recent.pool.take(index);
            recent.history.push(&question.prompt);
            question
        };
        debug!(prompt = %question.prompt, "every source exhausted, reusing static question");
        self.persist(&question).await;
        Some(question)
    }

    async fn try_source(&self, source: Source) -> Option<Question> {
        for attempt in 1..=self.max_attempts {
            let candidate = match source {
                Source::Generative => self.generate().await?,
                Source::Knowledge => self.lookup().await?,
                Source::Static => match self.draw_static().await? {
                    Some(question) => return Some(question),
                    None => {
                        debug!(%source, attempt, "candidate too similar to a recent question");
                        continue;
                    }
                },
            };

            let Some(question) = candidate else {
                continue;
            };
            if self.admit(&question).await {
                return Some(question);
            }
            debug!(%source, attempt, "candidate too similar to a recent question");
        }
        None
    }

    /// Remembers `question` unless it is too similar to a recent one
    async fn admit(&self, question: &Question) -> bool {
        let mut recent = self.recent.lock().await;
        if recent
            .history
            .is_similar(&question.prompt, self.similarity_threshold)
        {
            return false;
        }
        recent.history.push(&question.prompt);
        true
    }

    /// `None` when the pool is empty; `Some(None)` when the draw was too similar
    async fn draw_static(&self) -> Option<Option<Question>> {
        let mut recent = self.recent.lock().await;
        let index = recent.pool.random()?;
        let (prompt, _) = &recent.pool.entries[index];
        if recent.history.is_similar(prompt, self.similarity_threshold) {
            return Some(None);
        }
        let question = recent.pool.take(index);
        recent.history.push(&question.prompt);
        Some(Some(question))
    }

    /// `None` stops the source; `Some(None)` is a malformed candidate worth retrying
    async fn generate(&self) -> Option<Option<Question>> {
        let generator = self.generator.as_ref()?;
        match generator.generate(GENERATION_PROMPT).await {
            Ok(Some(text)) => Some(parse_generated(&text).map(|(prompt, answer_key)| Question {
                prompt,
                answer_key,
                source: Source::Generative,
            })),
            Ok(None) => None,
            Err(error) => {
                warn!(%error, "question generation failed");
                None
            }
        }
    }

    async fn lookup(&self) -> Option<Option<Question>> {
        let knowledge = self.knowledge.as_ref()?;
        match knowledge.random_entry(KNOWLEDGE_CATEGORY).await {
            Ok(Some(entry)) => Some(
                (!entry.key_term.trim().is_empty() && !entry.content.trim().is_empty()).then(
                    || Question {
                        prompt: entry.key_term,
                        answer_key: entry.content,
                        source: Source::Knowledge,
                    },
                ),
            ),
            Ok(None) => None,
            Err(error) => {
                warn!(%error, "knowledge lookup failed");
                None
            }
        }
    }

    async fn persist(&self, question: &Question) {
        if question.source == Source::Knowledge {
            return;
        }
        let Some(knowledge) = &self.knowledge else {
            return;
        };
        let entry = KnowledgeEntry {
            key_term: question.prompt.clone(),
            content: question.answer_key.clone(),
        };
        if let Err(error) = knowledge.add_entry(KNOWLEDGE_CATEGORY, entry).await {
            warn!(%error, "could not persist question");
        }
    }
}
