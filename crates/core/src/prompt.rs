use crate::models::{ChatTurn, ScoredChunk};
use crate::QaError;

pub const CONTEXT_VAR: &str = "context";
pub const INPUT_VAR: &str = "input";
pub const HISTORY_VAR: &str = "chat_history";

pub const DEFAULT_TEMPLATE: &str = "Answer the question based only on the following context:
{context}

Question: {input}

Chat History: {chat_history}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Context,
    Input,
    History,
}

/// Template with `{context}`, `{input}` and `{chat_history}` placeholders.
/// `{{` and `}}` render as literal braces.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn parse(source: &str) -> Result<Self, QaError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(ch) = rest.chars().next() {
            if rest.starts_with("{{") || rest.starts_with("}}") {
                literal.push(ch);
                rest = &rest[2..];
                continue;
            }

            match ch {
                '{' => {
                    let close = rest.find('}').ok_or_else(|| {
                        QaError::Prompt(format!(
                            "unclosed placeholder at byte {}",
                            source.len() - rest.len()
                        ))
                    })?;
                    let segment = match rest[1..close].trim() {
                        CONTEXT_VAR => Segment::Context,
                        INPUT_VAR => Segment::Input,
                        HISTORY_VAR => Segment::History,
                        other => {
                            return Err(QaError::Prompt(format!("unknown placeholder {{{other}}}")))
                        }
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                    rest = &rest[close + 1..];
                }
                '}' => {
                    return Err(QaError::Prompt(format!(
                        "unmatched '}}' at byte {}",
                        source.len() - rest.len()
                    )));
                }
                other => {
                    literal.push(other);
                    rest = &rest[other.len_utf8()..];
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for (required, segment) in [(CONTEXT_VAR, Segment::Context), (INPUT_VAR, Segment::Input)] {
            if !segments.contains(&segment) {
                return Err(QaError::Prompt(format!("template is missing {{{required}}}")));
            }
        }

        Ok(Self { segments })
    }

    pub fn render(&self, context: &str, input: &str, chat_history: &str) -> String {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Context => rendered.push_str(context),
                Segment::Input => rendered.push_str(input),
                Segment::History => rendered.push_str(chat_history),
            }
        }
        rendered
    }
}

/// Joins retrieved chunk texts with blank lines.
pub fn format_context(documents: &[ScoredChunk]) -> String {
    documents
        .iter()
        .map(|document| document.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn format_history(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("Human: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}
