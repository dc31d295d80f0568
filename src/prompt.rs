//! Grounded prompt assembly.
//!
//! [`PromptAssembler::assemble`] is a pure function of the retrieved context,
//! the question and the static prompt settings: identical inputs always give
//! byte-identical prompts. The layout, in order:
//!
//! ```text
//! <grounding instruction naming the exact refusal sentence>
//!
//! Relevant context from the knowledge base and chat memory:
//!
//! --- DOCUMENT CONTEXT ---
//! <document chunks, one per line>          (block always present)
//!
//! --- CONVERSATION HISTORY (MEMORY) ---
//! <memory records, one per line>           (only when there are memories)
//!
//! User question: <query>
//! Answer:
//! ```

use crate::config::PromptConfig;

pub const DOCUMENT_HEADER: &str = "--- DOCUMENT CONTEXT ---";
pub const MEMORY_HEADER: &str = "--- CONVERSATION HISTORY (MEMORY) ---";

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    assistant_name: String,
    refusal: String,
}

impl PromptAssembler {
    pub fn new(assistant_name: impl Into<String>, refusal: impl Into<String>) -> Self {
        Self {
            assistant_name: assistant_name.into(),
            refusal: refusal.into(),
        }
    }

    pub fn from_config(config: &PromptConfig) -> Self {
        Self::new(&config.assistant_name, &config.refusal)
    }

    /// The short persona line sent as the system message.
    pub fn system_message(&self) -> String {
        format!("You are {}, a friendly and helpful assistant.", self.assistant_name)
    }

    pub fn assemble(&self, documents: &[String], memories: &[String], query: &str) -> String {
        let mut context = format!("\n{}\n{}", DOCUMENT_HEADER, documents.join("\n"));
        if !memories.is_empty() {
            context.push_str(&format!("\n\n{}\n{}", MEMORY_HEADER, memories.join("\n")));
        }

        format!(
            "You are {name}, a friendly and helpful assistant that answers ONLY with information \
             from the private knowledge base provided below.\n\
             If the answer is not clearly in the knowledge base, reply exactly: \"{refusal}\"\n\
             Do not invent anything and do not use outside knowledge.\n\
             \n\
             Relevant context from the knowledge base and chat memory:\n\
             {context}\n\
             \n\
             User question: {query}\n\
             Answer:\n",
            name = self.assistant_name,
            refusal = self.refusal,
            context = context,
            query = query,
        )
    }
}
