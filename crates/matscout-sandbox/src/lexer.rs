//! Tokenizer for the sandbox language.
//!
//! Produces Python-style logical lines: `Newline` ends a statement, `Indent`
//! and `Dedent` bracket blocks, and newlines inside brackets are ignored.

use crate::error::SandboxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Body of an f-string with escapes already processed; holes still raw.
    FStr(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

const THREE_CHAR_OPS: &[&str] = &["**=", "//="];
const TWO_CHAR_OPS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=",
];
const ONE_CHAR_OPS: &[&str] = &[
    "+", "-", "*", "/", "%", "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, SandboxError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.replace("\r\n", "\n").chars().collect(),
            pos: 0,
            line: 1,
            depth: 0,
            indents: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token { tok, line: self.line });
    }

    fn error(&self, message: impl Into<String>) -> SandboxError {
        SandboxError::Syntax { line: self.line, message: message.into() }
    }

    fn run(mut self) -> Result<Vec<Token>, SandboxError> {
        while self.pos < self.chars.len() {
            if self.at_line_start && self.depth == 0 {
                if self.handle_indentation()? {
                    continue;
                }
            }

            let c = self.chars[self.pos];
            match c {
                ' ' | '\t' => self.pos += 1,
                '\\' if self.peek(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '#' => {
                    while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
                        self.pos += 1;
                    }
                }
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        self.end_line();
                        self.at_line_start = true;
                    }
                    self.line += 1;
                }
                '0'..='9' => self.number()?,
                '.' if self.peek(1).map(|d| d.is_ascii_digit()).unwrap_or(false) => self.number()?,
                '\'' | '"' => self.string(false, false)?,
                c if c.is_alphabetic() || c == '_' => self.word()?,
                _ => self.operator()?,
            }
        }

        self.end_line();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(self.tokens)
    }

    fn end_line(&mut self) {
        let open = matches!(
            self.tokens.last().map(|t| &t.tok),
            Some(tok) if *tok != Tok::Newline && *tok != Tok::Indent && *tok != Tok::Dedent
        );
        if open {
            self.push(Tok::Newline);
        }
    }

    /// Measure leading whitespace. Returns true when the line was blank and
    /// has been consumed entirely.
    fn handle_indentation(&mut self) -> Result<bool, SandboxError> {
        let mut width = 0;
        let mut cursor = self.pos;
        while let Some(&c) = self.chars.get(cursor) {
            match c {
                ' ' => width += 1,
                '\t' => width += 4,
                _ => break,
            }
            cursor += 1;
        }

        match self.chars.get(cursor) {
            None => {
                self.pos = cursor;
                return Ok(true);
            }
            Some('\n') => {
                self.pos = cursor + 1;
                self.line += 1;
                return Ok(true);
            }
            Some('#') => {
                while cursor < self.chars.len() && self.chars[cursor] != '\n' {
                    cursor += 1;
                }
                self.pos = cursor;
                return Ok(true);
            }
            _ => {}
        }

        self.pos = cursor;
        self.at_line_start = false;
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(Tok::Indent);
        } else if width < current {
            while self.indents.last().copied().unwrap_or(0) > width {
                self.indents.pop();
                self.push(Tok::Dedent);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(false)
    }

    fn number(&mut self) -> Result<(), SandboxError> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek(0) {
            if c.is_ascii_digit() || c == '_' {
                self.pos += 1;
            } else if c == '.' && !is_float {
                is_float = true;
                self.pos += 1;
            } else if (c == 'e' || c == 'E')
                && self
                    .peek(1)
                    .map(|n| n.is_ascii_digit() || n == '-' || n == '+')
                    .unwrap_or(false)
            {
                is_float = true;
                self.pos += 2;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();

        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                self.push(Tok::Int(i));
                return Ok(());
            }
        }
        let f = text
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid number literal '{}'", text)))?;
        self.push(Tok::Float(f));
        Ok(())
    }

    fn word(&mut self) -> Result<(), SandboxError> {
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek(0), Some('\'') | Some('"')) {
            let prefix = word.to_ascii_lowercase();
            if matches!(prefix.as_str(), "f" | "r" | "rf" | "fr" | "u" | "b" | "rb" | "br") {
                return self.string(prefix.contains('f'), prefix.contains('r'));
            }
        }

        self.push(Tok::Name(word));
        Ok(())
    }

    fn string(&mut self, formatted: bool, raw: bool) -> Result<(), SandboxError> {
        let quote = self.chars[self.pos];
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        let start_line = self.line;
        self.pos += if triple { 3 } else { 1 };

        let mut body = String::new();
        loop {
            let Some(c) = self.peek(0) else {
                return Err(SandboxError::Syntax {
                    line: start_line,
                    message: "unterminated string literal".to_string(),
                });
            };

            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }

            if c == '\n' {
                if !triple {
                    return Err(SandboxError::Syntax {
                        line: start_line,
                        message: "unterminated string literal".to_string(),
                    });
                }
                self.line += 1;
            }

            if c == '\\' && !raw {
                self.pos += 1;
                self.escape(&mut body)?;
                continue;
            }
            if c == '\\' && raw {
                // Raw strings keep the backslash but still cannot end on an escaped quote.
                body.push(c);
                if let Some(next) = self.peek(1) {
                    body.push(next);
                    self.pos += 2;
                    continue;
                }
            }

            body.push(c);
            self.pos += 1;
        }

        let tok = if formatted { Tok::FStr(body) } else { Tok::Str(body) };
        self.tokens.push(Token { tok, line: start_line });
        Ok(())
    }

    fn escape(&mut self, body: &mut String) -> Result<(), SandboxError> {
        let Some(c) = self.peek(0) else {
            return Err(self.error("unterminated string literal"));
        };
        self.pos += 1;
        match c {
            'n' => body.push('\n'),
            't' => body.push('\t'),
            'r' => body.push('\r'),
            '0' => body.push('\0'),
            '\\' => body.push('\\'),
            '\'' => body.push('\''),
            '"' => body.push('"'),
            '\n' => self.line += 1,
            'x' | 'u' => {
                let len = if c == 'x' { 2 } else { 4 };
                let digits: String = (0..len).filter_map(|i| self.peek(i)).collect();
                let decoded = u32::from_str_radix(&digits, 16)
                    .ok()
                    .filter(|_| digits.len() == len)
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error(format!("invalid \\{} escape", c)))?;
                body.push(decoded);
                self.pos += len;
            }
            other => {
                body.push('\\');
                body.push(other);
            }
        }
        Ok(())
    }

    fn operator(&mut self) -> Result<(), SandboxError> {
        let rest: String = (0..3).filter_map(|i| self.peek(i)).collect();
        for table in [THREE_CHAR_OPS, TWO_CHAR_OPS, ONE_CHAR_OPS] {
            if let Some(op) = table.iter().find(|op| rest.starts_with(**op)) {
                match *op {
                    "(" | "[" | "{" => self.depth += 1,
                    ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                }
                self.pos += op.chars().count();
                self.push(Tok::Op(op));
                return Ok(());
            }
        }
        Err(self.error(format!("unexpected character '{}'", self.chars[self.pos])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        tokenize(source).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn simple_assignment() {
        assert_eq!(
            kinds("x = 1.5\n"),
            vec![
                Tok::Name("x".into()),
                Tok::Op("="),
                Tok::Float(1.5),
                Tok::Newline,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn indentation_produces_indent_and_dedent() {
        let toks = kinds("if x:\n    y = 1\nz = 2");
        assert!(toks.contains(&Tok::Indent));
        assert!(toks.contains(&Tok::Dedent));
        assert_eq!(toks.last(), Some(&Tok::Eof));
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let toks = kinds("f(\n  1,\n  2\n)\n");
        let newlines = toks.iter().filter(|t| **t == Tok::Newline).count();
        assert_eq!(newlines, 1, "only the closing line should end the statement");
    }

    #[test]
    fn string_prefixes_and_escapes() {
        assert_eq!(kinds("'a\\nb'")[0], Tok::Str("a\nb".into()));
        assert_eq!(kinds("r'a\\nb'")[0], Tok::Str("a\\nb".into()));
        assert_eq!(kinds("f'{x}!'")[0], Tok::FStr("{x}!".into()));
        assert_eq!(kinds("\"\"\"one\ntwo\"\"\"")[0], Tok::Str("one\ntwo".into()));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let toks = kinds("# heading\n\nx = 1  # trailing\n\n");
        assert_eq!(toks[0], Tok::Name("x".into()));
        assert_eq!(toks.iter().filter(|t| **t == Tok::Newline).count(), 1);
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = tokenize("x = 'open\n").unwrap_err();
        assert!(matches!(err, SandboxError::Syntax { line: 1, .. }));
    }
}
