//! Context assembler for the system instruction.
//!
//! The instruction is built from three inputs:
//! - a verbosity tier chosen from the request temperature (or a custom persona)
//! - the project the chat belongs to: name, goal, non-goals
//! - previously extracted text of the project's documents (RAG block)

use crate::projects::ProjectContext;

use super::tokens::truncate_chars;

/// Characters of extracted text injected per project document.
pub const RAG_CHARS_PER_DOCUMENT: usize = 10_000;

/// Response-length policy selected from a temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityTier {
    /// <= 0.2: bullet points only
    Terse,
    /// <= 0.4: short and direct
    Short,
    /// <= 0.6: normal explanatory
    Normal,
    /// <= 0.8: detailed with background
    Detailed,
    /// > 0.8: as elaborate as possible, with examples
    Elaborate,
}

impl VerbosityTier {
    pub fn from_temperature(temperature: f32) -> Self {
        if temperature.is_nan() {
            return VerbosityTier::Normal;
        }
        let t = temperature.clamp(0.0, 1.0);
        if t <= 0.2 {
            VerbosityTier::Terse
        } else if t <= 0.4 {
            VerbosityTier::Short
        } else if t <= 0.6 {
            VerbosityTier::Normal
        } else if t <= 0.8 {
            VerbosityTier::Detailed
        } else {
            VerbosityTier::Elaborate
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            VerbosityTier::Terse => {
                "Du bist ein präziser Assistent. Antworte ausschließlich in knappen Stichpunkten, ohne Einleitung und ohne Fließtext."
            }
            VerbosityTier::Short => {
                "Du bist ein hilfreicher Assistent. Antworte kurz und direkt in wenigen Sätzen."
            }
            VerbosityTier::Normal => {
                "Du bist ein hilfreicher Assistent. Antworte verständlich und erkläre die wichtigsten Punkte in angemessener Länge."
            }
            VerbosityTier::Detailed => {
                "Du bist ein gründlicher Assistent. Antworte ausführlich und liefere relevantes Hintergrundwissen und Zusammenhänge."
            }
            VerbosityTier::Elaborate => {
                "Du bist ein sehr ausführlicher Assistent. Antworte so umfassend wie möglich, beleuchte alle Aspekte und veranschauliche sie mit konkreten Beispielen."
            }
        }
    }
}

/// Builds the provider-agnostic system instruction.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    rag_chars_per_document: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self {
            rag_chars_per_document: RAG_CHARS_PER_DOCUMENT,
        }
    }
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rag_limit(mut self, chars_per_document: usize) -> Self {
        self.rag_chars_per_document = chars_per_document;
        self
    }

    /// Build the instruction. A non-blank persona replaces the tier text.
    pub fn build(
        &self,
        temperature: f32,
        persona: Option<&str>,
        project: Option<&ProjectContext>,
    ) -> String {
        let base = match persona.map(str::trim).filter(|p| !p.is_empty()) {
            Some(persona) => persona.to_string(),
            None => VerbosityTier::from_temperature(temperature)
                .instruction()
                .to_string(),
        };

        let Some(project) = project else {
            return base;
        };

        let mut parts = Vec::with_capacity(4);
        parts.push(base);
        parts.push(self.project_section(project));

        let rag = self.rag_block(project);
        if !rag.is_empty() {
            parts.push(rag);
        }

        parts.join("\n\n")
    }

    fn project_section(&self, project: &ProjectContext) -> String {
        let mut section = format!("# Projekt: {}", project.name);

        if let Some(goal) = non_blank(project.goal.as_deref()) {
            section.push_str(&format!("\n\n## Ziel und Anweisungen\n{}", goal));
        }

        if let Some(non_goals) = non_blank(project.non_goals.as_deref()) {
            section.push_str(&format!(
                "\n\n## Nicht-Ziele (ausdrücklich vermeiden)\n{}",
                non_goals
            ));
        }

        section
    }

    fn rag_block(&self, project: &ProjectContext) -> String {
        let mut block = String::new();

        for doc in &project.documents {
            let Some(text) = non_blank(doc.parsed_content.as_deref()) else {
                continue;
            };

            let body = match truncate_chars(text, self.rag_chars_per_document) {
                Some(cut) => format!("{}\n[... gekürzt]", cut),
                None => text.to_string(),
            };

            if block.is_empty() {
                block.push_str("# Projektwissen\nNutze die folgenden Dokumente als Grundlage deiner Antworten.");
            }
            block.push_str(&format!(
                "\n\n--- START DOKUMENT '{}' ---\n{}\n--- ENDE DOKUMENT '{}' ---",
                doc.filename, body, doc.filename
            ));
        }

        block
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}
