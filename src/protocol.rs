//! Tool-call and verdict grammar (protocol version 1).
//!
//! The conversation prompts instruct the model to request the retrieval tool
//! and to emit judge verdicts inside fenced code blocks. This module is the
//! only place that grammar is interpreted; the prompts in [`crate::agent`]
//! must stay in sync with it.
//!
//! Grammar v1:
//!
//! ```text
//! block      = "```" info-string? "\n" body "```"
//! invocation = IDENT ws* "(" ws* "\"" argument "\"" ws* ")"
//! IDENT      = [A-Za-z_][A-Za-z0-9_]*
//! argument   = any characters except '"'
//! verdict    = "TRUE" | "FALSE"
//! ```
//!
//! The info string after the opening fence (e.g. a language tag) is ignored.
//! A block whose body carries trailing material after the closing `)` — such
//! as a reported tool result — is not an invocation.

use crate::error::{Error, Result};

/// A parsed tool invocation extracted from a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub argument: String,
}

/// Outcome of the judge step, branched on by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    NeedsEscalation,
}

/// Return the first well-formed invocation of `name` in `reply`, if any.
///
/// Later matches in the same reply are ignored.
pub fn first_tool_call(reply: &str, name: &str) -> Option<ToolCall> {
    fenced_blocks(reply)
        .into_iter()
        .filter_map(parse_invocation)
        .find(|call| call.name == name)
}

/// Parse the judge reply: the first fenced block must contain exactly the
/// literal `TRUE` or `FALSE`.
pub fn parse_verdict(reply: &str) -> Result<Verdict> {
    let block = fenced_blocks(reply)
        .into_iter()
        .next()
        .ok_or_else(|| Error::Validation("no fenced verdict block in judge reply".into()))?;

    match block.trim() {
        "TRUE" => Ok(Verdict::Accepted),
        "FALSE" => Ok(Verdict::NeedsEscalation),
        other => Err(Error::Validation(format!(
            "verdict outside grammar: {:?}",
            other
        ))),
    }
}

/// The text preceding the first fence, trimmed; `None` when nothing remains.
///
/// Used by the orchestrator to salvage a reply that still carries an
/// unresolved tool-call block.
pub fn text_before_first_fence(reply: &str) -> Option<&str> {
    let pos = reply.find("```")?;
    let head = reply[..pos].trim();
    if head.is_empty() {
        None
    } else {
        Some(head)
    }
}

/// Bodies of all fenced blocks in `text`, in order of appearance.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        // The info string runs to the end of the opening line.
        let body_start = after.find('\n').map(|p| p + 1).unwrap_or(after.len());
        let body = &after[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        blocks.push(&body[..close]);
        rest = &body[close + 3..];
    }

    blocks
}

/// Parse a block body as a bare invocation, rejecting trailing material.
fn parse_invocation(body: &str) -> Option<ToolCall> {
    let s = body.trim();

    let first = s.chars().next()?;
    if !first.is_ascii_alphabetic() && first != '_' {
        return None;
    }
    let ident_len = s
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .count();
    // IDENT characters are ASCII, so char count equals byte length.
    let (name, rest) = s.split_at(ident_len);

    let rest = rest.trim_start().strip_prefix('(')?;
    let rest = rest.trim_start().strip_prefix('"')?;
    let close = rest.find('"')?;
    let argument = &rest[..close];
    let tail = rest[close + 1..].trim_start().strip_prefix(')')?;
    if !tail.trim().is_empty() {
        return None;
    }

    Some(ToolCall {
        name: name.to_string(),
        argument: argument.to_string(),
    })
}
