//! Persona context builder — who the assistant is, assembled once at startup.
//!
//! A persona is built from three inputs: a name, a free-text experience
//! note, and resume text extracted from a PDF. The assembled system prompt
//! instructs the model to stay in character, to record questions it cannot
//! answer through `record_unknown_question`, and to steer engaged visitors
//! toward leaving an email recorded through `record_user_details`.
//!
//! Prompt assembly is pure string concatenation with no truncation or
//! token budgeting: oversized documents are the operator's problem, not
//! this module's.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where the persona's source documents live.
#[derive(Debug, Clone)]
pub struct PersonaPaths {
    /// The name the assistant stays in character as.
    pub name: String,
    /// PDF resume, extracted page by page.
    pub resume_path: PathBuf,
    /// Plain-text experience note, read verbatim.
    pub experience_path: PathBuf,
}

/// The static identity and background context the assistant role-plays.
///
/// Immutable after construction; built once per process lifetime.
#[derive(Debug, Clone)]
pub struct Persona {
    pub name: String,
    pub experience: String,
    pub resume: String,
}

impl Persona {
    /// Create a persona from already-loaded strings.
    pub fn new(
        name: impl Into<String>,
        experience: impl Into<String>,
        resume: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            experience: experience.into(),
            resume: resume.into(),
        }
    }

    /// Load a persona from its source documents.
    pub fn load(paths: &PersonaPaths) -> Result<Self, PersonaError> {
        let resume = extract_pdf_text(&paths.resume_path)?;
        let experience =
            std::fs::read_to_string(&paths.experience_path).map_err(|e| PersonaError::Read {
                path: paths.experience_path.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            name = %paths.name,
            resume_chars = resume.len(),
            experience_chars = experience.len(),
            "Persona documents loaded"
        );

        Ok(Self::new(paths.name.clone(), experience, resume))
    }

    /// Assemble the system prompt. Deterministic: same inputs, same string.
    pub fn system_prompt(&self) -> String {
        let name = &self.name;
        let mut prompt = format!(
            "You are acting as {name}. You are answering questions on {name}'s website, \
particularly questions related to {name}'s career, background, skills and experience. \
Your responsibility is to represent {name} for interactions on the website as faithfully as possible. \
You are given a summary of {name}'s background and resume which you can use to answer questions. \
Be professional and engaging, as if talking to a potential client or future employer who came across the website. \
If you don't know the answer to any question, use your record_unknown_question tool to record \
the question that you couldn't answer, even if it's about something trivial or unrelated to career. \
If the user is engaging in discussion, try to steer them towards getting in touch via email; \
ask for their email and record it using your record_user_details tool. "
        );

        prompt.push_str(&format!(
            "\n\n## Experience:\n{}\n\n## Resume:\n{}\n\n",
            self.experience, self.resume
        ));
        prompt.push_str(&format!(
            "With this context, please chat with the user, always staying in character as {name}."
        ));
        prompt
    }

    /// Rough token estimate of the assembled prompt (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.system_prompt().len() / 4
    }

    /// A diagnostic summary for the `prompt` CLI command.
    pub fn diagnostic_summary(&self) -> String {
        format!(
            "Persona: {}\nExperience: {} chars\nResume: {} chars\nSystem prompt: ~{} tokens\n",
            self.name,
            self.experience.len(),
            self.resume.len(),
            self.estimated_tokens()
        )
    }
}

/// Extract plain text from a PDF, page by page, concatenated in page order.
///
/// Pages whose extraction fails contribute nothing; a resume with one
/// unreadable page still yields the rest.
fn extract_pdf_text(path: &Path) -> Result<String, PersonaError> {
    let doc = lopdf::Document::load(path).map_err(|e| PersonaError::Pdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut text = String::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => {
                warn!(page = page_number, error = %e, "Skipping unextractable PDF page");
            }
        }
    }

    Ok(text)
}

/// Errors from persona construction.
#[derive(Debug, thiserror::Error)]
pub enum PersonaError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to load PDF {path}: {reason}")]
    Pdf { path: PathBuf, reason: String },
}
