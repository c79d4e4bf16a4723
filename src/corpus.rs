//! A collection of preprocessed sentences and its JSON interchange format.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AlignResult, CorpusError};
use crate::graph::{GraphData, SemanticGraph};
use crate::sentence::{CorpusResult, Sentence, Span};

/// One sentence as written by the preprocessing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceData {
    pub id: String,
    pub tokens: Vec<String>,
    /// Defaults to the tokens themselves.
    #[serde(default)]
    pub lemmas: Option<Vec<String>>,
    #[serde(default)]
    pub pos: Option<Vec<String>>,
    /// `[start, end)` pairs. Defaults to one span per token.
    #[serde(default)]
    pub spans: Option<Vec<(usize, usize)>>,
    /// Coreference chains of `[start, end)` mentions.
    #[serde(default)]
    pub coref: Vec<Vec<(usize, usize)>>,
    pub graph: GraphData,
}

impl SentenceData {
    /// Validate and build a [`Sentence`].
    pub fn into_sentence(self) -> AlignResult<Sentence> {
        let graph = SemanticGraph::from_data(&self.graph)?;
        let mut sentence = Sentence::new(self.id, self.tokens, graph);
        if let Some(lemmas) = self.lemmas {
            sentence = sentence.with_lemmas(lemmas)?;
        }
        if let Some(pos) = self.pos {
            sentence = sentence.with_pos(pos)?;
        }
        if let Some(spans) = self.spans {
            sentence = sentence.with_spans(spans.into_iter().map(|(s, e)| Span::new(s, e)).collect())?;
        }
        if !self.coref.is_empty() {
            let chains = self
                .coref
                .into_iter()
                .map(|chain| chain.into_iter().map(|(s, e)| Span::new(s, e)).collect())
                .collect();
            sentence = sentence.with_coref(chains)?;
        }
        Ok(sentence)
    }

    /// Inverse of [`into_sentence`](Self::into_sentence).
    pub fn from_sentence(sentence: &Sentence) -> Self {
        let pos = sentence.has_pos().then(|| {
            (0..sentence.tokens().len())
                .map(|t| sentence.pos(t).unwrap_or_default().to_string())
                .collect()
        });
        Self {
            id: sentence.id().to_string(),
            tokens: sentence.tokens().to_vec(),
            lemmas: Some(sentence.lemmas().to_vec()),
            pos,
            spans: Some(sentence.spans().iter().map(|s| (s.start, s.end)).collect()),
            coref: sentence
                .coref()
                .iter()
                .map(|chain| chain.iter().map(|m| (m.start, m.end)).collect())
                .collect(),
            graph: sentence.graph().to_data(),
        }
    }
}

/// Sentences in input order, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    sentences: Vec<Sentence>,
    index: HashMap<String, usize>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sentence. Ids must be unique.
    pub fn push(&mut self, sentence: Sentence) -> CorpusResult<()> {
        if self.index.contains_key(sentence.id()) {
            return Err(CorpusError::DuplicateSentence {
                id: sentence.id().to_string(),
            });
        }
        self.index
            .insert(sentence.id().to_string(), self.sentences.len());
        self.sentences.push(sentence);
        Ok(())
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Sentence> {
        self.index.get(id).map(|&i| &self.sentences[i])
    }

    pub fn require(&self, id: &str) -> CorpusResult<&Sentence> {
        self.get(id)
            .ok_or_else(|| CorpusError::UnknownSentence { id: id.into() })
    }

    /// Parse a JSON array of [`SentenceData`].
    pub fn from_json(json: &str) -> AlignResult<Self> {
        let data: Vec<SentenceData> =
            serde_json::from_str(json).map_err(|e| CorpusError::Parse {
                what: "corpus".into(),
                message: e.to_string(),
            })?;
        let mut corpus = Self::new();
        for item in data {
            corpus.push(item.into_sentence()?)?;
        }
        tracing::debug!(sentences = corpus.len(), "corpus parsed");
        Ok(corpus)
    }

    /// Load a corpus file.
    pub fn load(path: &Path) -> AlignResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Serialize back to the interchange format.
    pub fn to_json(&self) -> CorpusResult<String> {
        let data: Vec<SentenceData> = self.sentences.iter().map(SentenceData::from_sentence).collect();
        serde_json::to_string_pretty(&data).map_err(|e| CorpusError::Parse {
            what: "corpus".into(),
            message: e.to_string(),
        })
    }
}
