//! Message rendering.
//!
//! Templates use named placeholders in braces, e.g.
//! `"Agent {agent_identity} health is {agent_status}"`. `{{` and `}}` produce
//! literal braces. Only the placeholders listed in [`Placeholder`] exist;
//! anything else is a template error.

use crate::core::AlertEvent;
use thiserror::Error;

/// Text used for a value the alert did not carry.
pub const ABSENT_VALUE: &str = "None";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("unknown placeholder '{{{0}}}' in message template")]
    UnknownPlaceholder(String),

    #[error("placeholder '{{{0}}}' uses a format specification, which is not supported")]
    UnsupportedFormatSpec(String),

    #[error("unbalanced '{brace}' at position {position} in message template")]
    UnbalancedBrace { brace: char, position: usize },
}

/// The fields of an alert that a template can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    AgentClass,
    AgentIdentity,
    AgentStatus,
    AlertKey,
    StatusContext,
}

impl Placeholder {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "agent_class" => Some(Self::AgentClass),
            "agent_identity" => Some(Self::AgentIdentity),
            "agent_status" => Some(Self::AgentStatus),
            "alert_key" => Some(Self::AlertKey),
            "status_context" => Some(Self::StatusContext),
            _ => None,
        }
    }

    fn value(&self, event: &AlertEvent) -> String {
        match self {
            Self::AgentClass => event.announcing_class.clone(),
            Self::AgentIdentity => event.announcing_identity.clone(),
            Self::AgentStatus => display_value(event.status.as_ref()),
            Self::AlertKey => event
                .alert_key
                .clone()
                .unwrap_or_else(|| ABSENT_VALUE.to_string()),
            Self::StatusContext => display_value(event.context.as_ref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field(Placeholder),
}

/// A parsed message template.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplate {
    segments: Vec<Segment>,
}

impl MessageTemplate {
    /// Parses a template string.
    ///
    /// # Returns
    /// * `Err(RenderError)` if the template references an unknown placeholder,
    ///   uses a format specification or has an unbalanced brace
    pub fn parse(template: &str) -> Result<Self, RenderError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((position, c)) = chars.next() {
            match c {
                '{' => {
                    if chars.next_if(|&(_, next)| next == '{').is_some() {
                        literal.push('{');
                        continue;
                    }
                    let mut field = String::new();
                    let mut closed = false;
                    while let Some((inner_pos, inner)) = chars.next() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => {
                                return Err(RenderError::UnbalancedBrace {
                                    brace: '{',
                                    position: inner_pos,
                                })
                            }
                            other => field.push(other),
                        }
                    }
                    if !closed {
                        return Err(RenderError::UnbalancedBrace {
                            brace: '{',
                            position,
                        });
                    }
                    if field.contains(':') || field.contains('!') {
                        return Err(RenderError::UnsupportedFormatSpec(field));
                    }
                    let placeholder = Placeholder::from_name(&field)
                        .ok_or(RenderError::UnknownPlaceholder(field))?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(placeholder));
                }
                '}' => {
                    if chars.next_if(|&(_, next)| next == '}').is_some() {
                        literal.push('}');
                    } else {
                        return Err(RenderError::UnbalancedBrace {
                            brace: '}',
                            position,
                        });
                    }
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Substitutes the fields of `event` into the template.
    pub fn render(&self, event: &AlertEvent) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.clone(),
                Segment::Field(placeholder) => placeholder.value(event),
            })
            .collect()
    }
}

/// Parses `template` and renders it for `event` in one step.
pub fn render_message(template: &str, event: &AlertEvent) -> Result<String, RenderError> {
    Ok(MessageTemplate::parse(template)?.render(event))
}

/// Converts a decoded payload value to the text shown in a message.
///
/// Strings are shown verbatim, numbers by their natural text, booleans as
/// lowercase `true`/`false` and mappings or lists as compact JSON
/// (`{"cpu":12}`), never as a language-specific repr such as `True` or
/// `{'cpu': 12}`.
pub fn display_value(value: Option<&serde_yml::Value>) -> String {
    use serde_yml::Value;

    match value {
        None | Some(Value::Null) => ABSENT_VALUE.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Tagged(tagged)) => display_value(Some(&tagged.value)),
        Some(other) => serde_json::to_string(other).unwrap_or_else(|_| {
            serde_yml::to_string(other)
                .map(|s| s.trim_end().to_string())
                .unwrap_or_default()
        }),
    }
}
