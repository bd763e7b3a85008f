use itertools::Itertools;
use std::fmt::Write;

use crate::store::ChunkRecord;

/// Assemble the grounded-answer prompt from retrieved context records.
///
/// The model is instructed to answer only from the supplied context; each
/// context line is prefixed with its source file and section.
#[inline]
pub fn build_prompt(question: &str, contexts: &[&ChunkRecord]) -> String {
    let context = contexts
        .iter()
        .map(|record| format!("[{} | {}] {}", record.file, record.section, record.chunk))
        .join("\n");

    format!(
        "You are a helpful research assistant.\n\
         CRITICAL INSTRUCTIONS:\n\
         1. Answer ONLY using the provided context below. Do NOT use general knowledge.\n\
         2. If information is not explicitly in the context, you MUST say 'I don't know'.\n\
         3. Do not make inferences or assumptions beyond what is stated.\n\
         \n\
         Context:\n{context}\n\
         \n\
         Question: {question}\n\
         Answer (ONLY from context, or say 'I don't know'):"
    )
}

/// One line per distinct (file, section) pair, in first-seen order.
#[inline]
pub fn format_unique_contexts(contexts: &[&ChunkRecord]) -> String {
    let mut out = String::from("Context used:");
    for record in contexts
        .iter()
        .unique_by(|record| (record.file.as_str(), record.section.as_str()))
    {
        let _ = write!(out, "\n- {} | {}", record.file, record.section);
    }
    out
}
