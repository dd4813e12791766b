use crate::error::StageWarning;
use crate::redact::chunk::{recombine, split, RedactedChunk};
use crate::redact::client::DeidApi;

/// Result of running chunked redaction over a document.
#[derive(Debug)]
pub struct RedactionOutcome {
    pub text: String,
    /// Indices of chunks that kept their original text (fail-open).
    pub failed_chunks: Vec<usize>,
}

impl RedactionOutcome {
    pub fn warnings(&self) -> Vec<StageWarning> {
        self.failed_chunks
            .iter()
            .map(|&index| StageWarning::ChunkNotRedacted {
                index,
                reason: "redaction request failed".to_string(),
            })
            .collect()
    }
}

/// Redact a document by splitting it into bounded chunks and sending each to
/// the collaborator independently.
///
/// A failed chunk does not abort the stage: the original text is substituted
/// for that index, the index is recorded, and processing continues. Assembly
/// is keyed by chunk index, never arrival order.
pub fn redact_document(api: &dyn DeidApi, text: &str, chunk_size: usize) -> RedactionOutcome {
    if text.is_empty() {
        return RedactionOutcome {
            text: String::new(),
            failed_chunks: Vec::new(),
        };
    }

    let chunks = split(text, chunk_size);
    let total = chunks.len();
    tracing::info!("Redacting {} chunk(s) of up to {} chars", total, chunk_size);

    let mut redacted = Vec::with_capacity(total);
    let mut failed = Vec::new();

    for chunk in chunks {
        match api.redact(&chunk.text) {
            Ok(output) => {
                tracing::debug!("Chunk {}/{} redacted", chunk.index + 1, total);
                redacted.push(RedactedChunk {
                    index: chunk.index,
                    text: output,
                });
            }
            Err(e) => {
                tracing::warn!(
                    "Chunk {}/{} not redacted, keeping original text: {:#}",
                    chunk.index + 1,
                    total,
                    e
                );
                failed.push(chunk.index);
                redacted.push(RedactedChunk {
                    index: chunk.index,
                    text: chunk.text,
                });
            }
        }
    }

    RedactionOutcome {
        text: recombine(redacted),
        failed_chunks: failed,
    }
}
