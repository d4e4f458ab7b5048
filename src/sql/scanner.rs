#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

pub(super) fn scan_digits(bytes: &[u8], start: usize) -> Option<(usize, &str)> {
    let mut idx = start;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == start {
        None
    } else {
        std::str::from_utf8(&bytes[start..idx])
            .ok()
            .map(|digits| (idx, digits))
    }
}

/// Walk `sql`, calling `on_normal(idx, byte, depth)` for every byte outside quotes and comments.
/// `depth` is the parenthesis depth at that byte; the callback returns how many following bytes
/// to skip.
pub(super) fn walk<F>(sql: &str, mut on_normal: F)
where
    F: FnMut(usize, u8, u32) -> usize,
{
    let bytes = sql.as_bytes();
    let mut state = State::Normal;
    let mut depth: u32 = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if super::parsers::is_line_comment_start(bytes, idx) => {
                    state = State::LineComment;
                }
                _ if super::parsers::is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment;
                    idx += 1;
                }
                _ => {
                    if b == b')' {
                        depth = depth.saturating_sub(1);
                    }
                    idx += on_normal(idx, b, depth);
                    if b == b'(' {
                        depth += 1;
                    }
                }
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            // SQLite block comments do not nest: the first `*/` closes.
            State::BlockComment => {
                if super::parsers::is_block_comment_end(bytes, idx) {
                    state = State::Normal;
                    idx += 1;
                }
            }
        }
        idx += 1;
    }
}
