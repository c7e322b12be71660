//! Tokenizer for sandbox snippets.

use super::value::{ScriptError, ScriptErrorKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    /// Raw body of an f-string, interpolated at parse time.
    FStr(String),
    Name(String),
    Op(&'static str),
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub line: usize,
}

/// Longest operators first so that prefix matching picks `**=` over `**`.
const OPERATORS: &[&str] = &[
    "**=", "//=", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "->", "+",
    "-", "*", "/", "%", "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", "@", "&",
    "|", "^", "~",
];

pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<SpannedToken> = Vec::new();
    let mut pos = 0;
    let mut line = 1;
    let mut depth: usize = 0;

    let push_newline = |tokens: &mut Vec<SpannedToken>, line: usize| {
        if !matches!(
            tokens.last().map(|t| &t.token),
            None | Some(Token::Newline)
        ) {
            tokens.push(SpannedToken {
                token: Token::Newline,
                line,
            });
        }
    };

    while pos < chars.len() {
        let c = chars[pos];

        if c == '\n' {
            if depth == 0 {
                push_newline(&mut tokens, line);
            }
            line += 1;
            pos += 1;
            continue;
        }
        if c == '\\' && chars.get(pos + 1) == Some(&'\n') {
            line += 1;
            pos += 2;
            continue;
        }
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        if c == '#' {
            while pos < chars.len() && chars[pos] != '\n' {
                pos += 1;
            }
            continue;
        }
        if c == ';' {
            push_newline(&mut tokens, line);
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(pos + 1).is_some_and(|d| d.is_ascii_digit()))
        {
            let (token, next) = lex_number(&chars, pos, line)?;
            tokens.push(SpannedToken { token, line });
            pos = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            let word: String = chars[start..pos].iter().collect();

            if let Some(&quote) = chars.get(pos) {
                if (quote == '"' || quote == '\'') && is_string_prefix(&word) {
                    let lower = word.to_lowercase();
                    let raw = lower.contains('r');
                    let (body, next, lines) = lex_string(&chars, pos, raw, line)?;
                    let token = if lower.contains('f') {
                        Token::FStr(body)
                    } else {
                        Token::Str(body)
                    };
                    tokens.push(SpannedToken { token, line });
                    line += lines;
                    pos = next;
                    continue;
                }
            }

            tokens.push(SpannedToken {
                token: Token::Name(word),
                line,
            });
            continue;
        }

        if c == '"' || c == '\'' {
            let (body, next, lines) = lex_string(&chars, pos, false, line)?;
            tokens.push(SpannedToken {
                token: Token::Str(body),
                line,
            });
            line += lines;
            pos = next;
            continue;
        }

        let rest: String = chars[pos..chars.len().min(pos + 3)].iter().collect();
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
            return Err(ScriptError::new(
                ScriptErrorKind::SyntaxError,
                format!("invalid character '{}'", c),
            )
            .at_line(line));
        };
        match *op {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth = depth.saturating_sub(1),
            _ => {}
        }
        tokens.push(SpannedToken {
            token: Token::Op(op),
            line,
        });
        pos += op.len();
    }

    push_newline(&mut tokens, line);
    tokens.push(SpannedToken {
        token: Token::Eof,
        line,
    });
    Ok(tokens)
}

fn is_string_prefix(word: &str) -> bool {
    matches!(
        word.to_lowercase().as_str(),
        "r" | "f" | "b" | "u" | "rf" | "fr" | "rb" | "br"
    )
}

fn lex_number(chars: &[char], start: usize, line: usize) -> Result<(Token, usize), ScriptError> {
    let mut pos = start;
    let mut text = String::new();
    let mut is_float = false;

    let take_digits = |pos: &mut usize, text: &mut String| {
        while *pos < chars.len() && (chars[*pos].is_ascii_digit() || chars[*pos] == '_') {
            if chars[*pos] != '_' {
                text.push(chars[*pos]);
            }
            *pos += 1;
        }
    };

    take_digits(&mut pos, &mut text);
    if pos < chars.len() && chars[pos] == '.' {
        is_float = true;
        text.push('.');
        pos += 1;
        take_digits(&mut pos, &mut text);
    }
    if pos < chars.len() && (chars[pos] == 'e' || chars[pos] == 'E') {
        let mut look = pos + 1;
        if look < chars.len() && (chars[look] == '+' || chars[look] == '-') {
            look += 1;
        }
        if look < chars.len() && chars[look].is_ascii_digit() {
            is_float = true;
            text.push('e');
            text.extend(&chars[pos + 1..look]);
            pos = look;
            take_digits(&mut pos, &mut text);
        }
    }

    let invalid = || {
        ScriptError::new(
            ScriptErrorKind::SyntaxError,
            format!("invalid number literal '{}'", text),
        )
        .at_line(line)
    };

    if is_float {
        let value: f64 = text.parse().map_err(|_| invalid())?;
        return Ok((Token::Float(value), pos));
    }
    match text.parse::<i64>() {
        Ok(value) => Ok((Token::Int(value), pos)),
        Err(_) => {
            let value: f64 = text.parse().map_err(|_| invalid())?;
            Ok((Token::Float(value), pos))
        }
    }
}

/// Lexes a quoted string starting at `start`; returns the body, the index
/// after the closing quote and the number of newlines consumed.
fn lex_string(
    chars: &[char],
    start: usize,
    raw: bool,
    line: usize,
) -> Result<(String, usize, usize), ScriptError> {
    let quote = chars[start];
    let triple = chars.get(start + 1) == Some(&quote) && chars.get(start + 2) == Some(&quote);
    let mut pos = if triple { start + 3 } else { start + 1 };
    let mut body = String::new();
    let mut lines = 0;

    loop {
        let Some(&c) = chars.get(pos) else {
            return Err(ScriptError::new(
                ScriptErrorKind::SyntaxError,
                "unterminated string literal",
            )
            .at_line(line));
        };

        if c == quote {
            if !triple {
                return Ok((body, pos + 1, lines));
            }
            if chars.get(pos + 1) == Some(&quote) && chars.get(pos + 2) == Some(&quote) {
                return Ok((body, pos + 3, lines));
            }
        }
        if c == '\n' {
            if !triple {
                return Err(ScriptError::new(
                    ScriptErrorKind::SyntaxError,
                    "unterminated string literal",
                )
                .at_line(line));
            }
            lines += 1;
        }
        if c == '\\' && !raw {
            let escaped = chars.get(pos + 1).copied().unwrap_or('\\');
            match escaped {
                'n' => body.push('\n'),
                't' => body.push('\t'),
                'r' => body.push('\r'),
                '0' => body.push('\0'),
                '\\' | '\'' | '"' => body.push(escaped),
                '\n' => lines += 1,
                other => {
                    body.push('\\');
                    body.push(other);
                }
            }
            pos += 2;
            continue;
        }

        body.push(c);
        pos += 1;
    }
}
