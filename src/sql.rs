//! Minimal SQL text inspection: positional placeholder counting and recognition of the
//! `{call name(...)}` / `{? = call name(...)}` escape. Anything beyond that is the driver's job.

mod parsers;
mod scanner;

use parsers::{is_routine_name, strip_keyword};
use scanner::{scan_digits, walk};

use crate::error::SqlBridgeError;

/// One argument of a callable escape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    /// A `?` placeholder, carrying its 1-based position in the bound parameter list.
    Placeholder(usize),
    /// Literal SQL text passed through to the driver.
    Literal(String),
}

/// Parsed `{call ...}` escape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTarget {
    pub name: String,
    pub args: Vec<CallArg>,
    /// `{? = call f(...)}`: parameter 1 receives the routine's return value.
    pub has_return: bool,
}

impl CallTarget {
    /// Parameter positions bound to call arguments, in argument order.
    pub fn placeholder_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.args.iter().filter_map(|arg| match arg {
            CallArg::Placeholder(pos) => Some(*pos),
            CallArg::Literal(_) => None,
        })
    }
}

/// What the bridge needs to know about a statement's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlShape {
    /// Number of parameters the text expects (SQLite numbering rules for `?` and `?NNN`).
    pub placeholders: usize,
    pub call: Option<CallTarget>,
}

/// Inspect `sql` for placeholders and a callable escape.
///
/// # Errors
/// Returns [`SqlBridgeError::StatementError`] for a malformed `{call ...}` escape.
pub fn analyze(sql: &str) -> Result<SqlShape, SqlBridgeError> {
    let placeholders = count_placeholders(sql);
    let call = parse_call(sql)?;
    if let Some(call) = &call {
        let expected = usize::from(call.has_return) + call.placeholder_positions().count();
        if expected != placeholders {
            return Err(SqlBridgeError::StatementError(format!(
                "call arguments must be `?` placeholders or literals without placeholders: {sql}"
            )));
        }
    }
    Ok(SqlShape { placeholders, call })
}

/// Count parameters referenced by `?` and `?NNN` outside literals and comments.
///
/// A bare `?` takes the number after the largest one seen so far, matching SQLite.
#[must_use]
pub fn count_placeholders(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut highest = 0usize;
    walk(sql, |idx, b, _| {
        if b != b'?' {
            return 0;
        }
        if let Some((end, digits)) = scan_digits(bytes, idx + 1) {
            let number = digits.parse::<usize>().unwrap_or(0);
            highest = highest.max(number);
            end - idx - 1
        } else {
            highest += 1;
            0
        }
    });
    highest
}

fn parse_call(sql: &str) -> Result<Option<CallTarget>, SqlBridgeError> {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    let Some(body) = trimmed.strip_prefix('{') else {
        return Ok(None);
    };
    let Some(body) = body.strip_suffix('}') else {
        return Err(malformed(sql, "unterminated call escape"));
    };
    let mut rest = body.trim();

    let has_return = if let Some(after) = rest.strip_prefix('?') {
        let Some(after) = after.trim_start().strip_prefix('=') else {
            return Err(malformed(sql, "expected `=` after return placeholder"));
        };
        rest = after.trim_start();
        true
    } else {
        false
    };

    let Some(rest) = strip_keyword(rest, "call") else {
        return Err(malformed(sql, "expected `call` keyword"));
    };

    let name_end = rest
        .find(|c: char| c == '(' || c.is_whitespace())
        .unwrap_or(rest.len());
    let name = &rest[..name_end];
    if !is_routine_name(name) {
        return Err(malformed(sql, "invalid routine name"));
    }

    let arg_text = rest[name_end..].trim();
    let raw_args = if arg_text.is_empty() {
        Vec::new()
    } else {
        let inner = arg_text
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| malformed(sql, "argument list must be parenthesised"))?;
        split_arguments(inner).map_err(|reason| malformed(sql, reason))?
    };

    let mut next_position = usize::from(has_return) + 1;
    let mut args = Vec::with_capacity(raw_args.len());
    for raw in raw_args {
        if raw == "?" {
            args.push(CallArg::Placeholder(next_position));
            next_position += 1;
        } else {
            args.push(CallArg::Literal(raw.to_owned()));
        }
    }

    Ok(Some(CallTarget {
        name: name.to_owned(),
        args,
        has_return,
    }))
}

fn split_arguments(inner: &str) -> Result<Vec<&str>, &'static str> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut cuts = Vec::new();
    walk(inner, |idx, b, depth| {
        if b == b',' && depth == 0 {
            cuts.push(idx);
        }
        0
    });

    let mut args = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(inner.len())) {
        let arg = inner[start..cut].trim();
        if arg.is_empty() {
            return Err("empty call argument");
        }
        args.push(arg);
        start = cut + 1;
    }
    Ok(args)
}

fn malformed(sql: &str, reason: &str) -> SqlBridgeError {
    SqlBridgeError::StatementError(format!("{reason}: {sql}"))
}
