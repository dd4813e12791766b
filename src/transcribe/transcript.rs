//! Extraction of an ordered transcript from the batch transcription result
//! document.
//!
//! The service has produced two phrase layouts in the wild: a flat object
//! with a `display` field, and a nested best-candidate list under `nBest`.
//! Both are decoded through one untagged enum; anything else is an explicit
//! [`TranscriptionError::UnrecognizedFormat`], never a best-effort guess.

use serde::Deserialize;

use crate::error::TranscriptionError;

/// Ordered sequence of recognized phrases. Immutable after extraction;
/// joining with single spaces yields the full text.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub phrases: Vec<String>,
}

impl Transcript {
    pub fn text(&self) -> String {
        self.phrases.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PhraseShape {
    Flat {
        display: String,
    },
    BestCandidate {
        #[serde(rename = "nBest")]
        n_best: Vec<Candidate>,
    },
}

#[derive(Debug, Deserialize)]
struct Candidate {
    display: String,
}

/// Extract the ordered phrase list from a transcription result document.
pub fn extract_transcript(document: &serde_json::Value) -> Result<Transcript, TranscriptionError> {
    let phrases = document
        .get("combinedRecognizedPhrases")
        .and_then(|v| v.as_array())
        .ok_or(TranscriptionError::UnrecognizedFormat)?;

    let mut out = Vec::with_capacity(phrases.len());
    for phrase in phrases {
        let shape: PhraseShape = serde_json::from_value(phrase.clone())
            .map_err(|_| TranscriptionError::UnrecognizedFormat)?;
        match shape {
            PhraseShape::Flat { display } => out.push(display),
            PhraseShape::BestCandidate { n_best } => {
                let best = n_best
                    .into_iter()
                    .next()
                    .ok_or(TranscriptionError::UnrecognizedFormat)?;
                out.push(best.display);
            }
        }
    }

    Ok(Transcript { phrases: out })
}
