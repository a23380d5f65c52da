//! PB tokenizer.
//!
//! Line-oriented: every physical line is measured for indentation, then
//! lexed left to right. Indentation widths form a stack; growing width
//! emits `Indent`, shrinking width emits one `Dedent` per level unwound.
//! Blank and comment-only lines emit `Newline` without touching the
//! stack. F-strings are split into START / MIDDLE / `{` expr `}` / END
//! token groups by recursively lexing the placeholder text.

mod error;
mod token;

pub use error::{LexError, LexResult};
pub use token::{Span, Token, TokenKind, keyword_kind};

pub struct Lexer<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    indent_stack: Vec<usize>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            indent_stack: vec![0],
        }
    }

    pub fn tokenize(mut self) -> LexResult<Vec<Token>> {
        let mut line_num = 0;
        for raw_line in self.source.split('\n') {
            line_num += 1;
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            self.tokenize_line(line, line_num)?;
        }

        let eof_line = line_num + 1;
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.tokens
                .push(Token::new(TokenKind::Dedent, Span::new(eof_line, 1, 0)));
        }
        self.tokens
            .push(Token::new(TokenKind::EOF, Span::new(eof_line, 1, 0)));
        Ok(self.tokens)
    }

    fn tokenize_line(&mut self, line: &str, line_num: usize) -> LexResult<()> {
        let bytes = line.as_bytes();
        let mut indent = 0;
        while indent < bytes.len() && (bytes[indent] == b' ' || bytes[indent] == b'\t') {
            if bytes[indent] == b'\t' {
                return Err(LexError::MixedIndentation {
                    line: line_num,
                    column: indent + 1,
                });
            }
            indent += 1;
        }

        let rest = &line[indent..];
        if rest.is_empty() || rest.starts_with('#') {
            // Blank and comment-only lines keep the indentation stack untouched.
            self.tokens.push(Token::new(
                TokenKind::Newline,
                Span::new(line_num, line.len() + 1, 0),
            ));
            return Ok(());
        }

        self.handle_indentation(indent, line_num)?;

        let mut cursor = Cursor::new(line, indent, line.len(), line_num);
        lex_code(&mut cursor, &mut self.tokens)?;

        self.tokens.push(Token::new(
            TokenKind::Newline,
            Span::new(line_num, line.len() + 1, 0),
        ));
        Ok(())
    }

    fn handle_indentation(&mut self, indent: usize, line_num: usize) -> LexResult<()> {
        let current = *self
            .indent_stack
            .last()
            .expect("indent stack always holds the 0 level");
        let span = Span::new(line_num, 1, 0);

        if indent > current {
            self.indent_stack.push(indent);
            self.tokens.push(Token::new(TokenKind::Indent, span));
        } else if indent < current {
            while let Some(&top) = self.indent_stack.last() {
                if top > indent {
                    self.indent_stack.pop();
                    self.tokens.push(Token::new(TokenKind::Dedent, span));
                } else {
                    break;
                }
            }
            if *self.indent_stack.last().expect("0 level never popped") != indent {
                return Err(LexError::InconsistentDedent {
                    indent,
                    line: line_num,
                    column: 1,
                });
            }
        }
        Ok(())
    }
}

pub fn tokenize(source: &str) -> LexResult<Vec<Token>> {
    Lexer::new(source).tokenize()
}

/// Byte cursor over one physical line (or an f-string placeholder slice
/// of it). Columns are 1-based byte offsets into the line.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    end: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, pos: usize, end: usize, line: usize) -> Self {
        Self {
            text,
            pos,
            end,
            line,
        }
    }

    fn column(&self) -> usize {
        self.pos + 1
    }

    fn peek_char(&self) -> Option<char> {
        self.text[self.pos..self.end].chars().next()
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.text[self.pos..self.end].chars().nth(n)
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn consume_while<P>(&mut self, keep: P) -> &'a str
    where
        P: Fn(char) -> bool,
    {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !keep(c) {
                break;
            }
            self.consume_char();
        }
        &self.text[start..self.pos]
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.text[self.pos..self.end].starts_with(prefix)
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }
}

fn lex_code(cursor: &mut Cursor, tokens: &mut Vec<Token>) -> LexResult<()> {
    loop {
        cursor.consume_while(|c| c == ' ' || c == '\t');
        let Some(ch) = cursor.peek_char() else {
            return Ok(());
        };

        match ch {
            '#' => return Ok(()),
            'f' if matches!(cursor.peek_ahead(1), Some('"') | Some('\'')) => {
                read_fstring(cursor, tokens)?;
            }
            c if c.is_alphabetic() || c == '_' => read_identifier(cursor, tokens),
            c if c.is_ascii_digit() => read_number(cursor, tokens)?,
            '"' | '\'' => read_string(cursor, tokens)?,
            _ => read_operator(cursor, tokens)?,
        }
    }
}

fn read_identifier(cursor: &mut Cursor, tokens: &mut Vec<Token>) {
    let start = cursor.pos;
    let ident = cursor.consume_while(|c| c.is_alphanumeric() || c == '_');
    let kind = keyword_kind(ident).unwrap_or_else(|| TokenKind::Identifier(ident.to_string()));
    tokens.push(Token::new(
        kind,
        Span::new(cursor.line, start + 1, cursor.pos - start),
    ));
}

fn read_number(cursor: &mut Cursor, tokens: &mut Vec<Token>) -> LexResult<()> {
    let start = cursor.pos;
    let line = cursor.line;

    let int_part = cursor.consume_while(|c| c.is_ascii_digit() || c == '_');
    check_underscores(int_part, line, start + 1)?;

    let mut is_float = false;

    if cursor.peek_char() == Some('.') {
        if !matches!(cursor.peek_ahead(1), Some(c) if c.is_ascii_digit()) {
            return Err(LexError::MalformedFloat {
                line,
                column: cursor.column(),
            });
        }
        cursor.consume_char();
        let frac_start = cursor.pos;
        let frac = cursor.consume_while(|c| c.is_ascii_digit() || c == '_');
        check_underscores(frac, line, frac_start + 1)?;
        is_float = true;
    }

    if matches!(cursor.peek_char(), Some('e') | Some('E')) {
        let signed = matches!(cursor.peek_ahead(1), Some('+') | Some('-'));
        let first_digit = if signed { 2 } else { 1 };
        if matches!(cursor.peek_ahead(first_digit), Some(c) if c.is_ascii_digit()) {
            cursor.consume_char();
            if signed {
                cursor.consume_char();
            }
            let exp_start = cursor.pos;
            let exp = cursor.consume_while(|c| c.is_ascii_digit() || c == '_');
            check_underscores(exp, line, exp_start + 1)?;
            is_float = true;
        }
    }

    let lexeme = &cursor.text[start..cursor.pos];
    let cleaned = lexeme.replace('_', "");
    let span = Span::new(line, start + 1, lexeme.len());

    let kind = if is_float {
        let value = cleaned
            .parse::<f64>()
            .map_err(|_| LexError::MalformedFloat {
                line,
                column: start + 1,
            })?;
        TokenKind::Float(value)
    } else {
        let value = cleaned
            .parse::<i64>()
            .map_err(|_| LexError::InvalidIntegerLiteral {
                literal: lexeme.to_string(),
                line,
                column: start + 1,
            })?;
        TokenKind::Int(value)
    };
    tokens.push(Token::new(kind, span));
    Ok(())
}

/// Underscores may only separate digits: no trailing underscore and no
/// adjacent pair. A leading underscore never reaches here (it lexes as an
/// identifier head).
fn check_underscores(digits: &str, line: usize, column: usize) -> LexResult<()> {
    if digits.ends_with('_') || digits.contains("__") {
        return Err(LexError::BadNumericUnderscore {
            literal: digits.to_string(),
            line,
            column,
        });
    }
    Ok(())
}

fn decode_escape(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '\\' => Some('\\'),
        '\'' => Some('\''),
        '"' => Some('"'),
        '0' => Some('\0'),
        _ => None,
    }
}

fn read_string(cursor: &mut Cursor, tokens: &mut Vec<Token>) -> LexResult<()> {
    let start = cursor.pos;
    let line = cursor.line;
    let quote = cursor.consume_char().expect("caller saw the opening quote");

    let mut value = String::new();
    loop {
        match cursor.peek_char() {
            None => {
                return Err(LexError::UnterminatedString {
                    line,
                    column: start + 1,
                });
            }
            Some(c) if c == quote => {
                cursor.consume_char();
                tokens.push(Token::new(
                    TokenKind::Str(value),
                    Span::new(line, start + 1, cursor.pos - start),
                ));
                return Ok(());
            }
            Some('\\') => {
                let escape_col = cursor.column();
                cursor.consume_char();
                let escaped = cursor.consume_char().ok_or(LexError::UnterminatedString {
                    line,
                    column: start + 1,
                })?;
                let decoded = decode_escape(escaped).ok_or_else(|| LexError::UnknownEscape {
                    lexeme: format!("\\{escaped}"),
                    line,
                    column: escape_col,
                })?;
                value.push(decoded);
            }
            Some(c) => {
                cursor.consume_char();
                value.push(c);
            }
        }
    }
}

fn read_fstring(cursor: &mut Cursor, tokens: &mut Vec<Token>) -> LexResult<()> {
    let start = cursor.pos;
    let line = cursor.line;
    cursor.consume_char(); // 'f'
    let quote = cursor.consume_char().expect("caller saw the opening quote");
    tokens.push(Token::new(TokenKind::FStringStart, Span::new(line, start + 1, 2)));

    let mut text = String::new();
    let mut text_start = cursor.pos;
    loop {
        match cursor.peek_char() {
            None => {
                return Err(LexError::UnterminatedString {
                    line,
                    column: start + 1,
                });
            }
            Some(c) if c == quote => {
                if !text.is_empty() {
                    tokens.push(Token::new(
                        TokenKind::FStringMiddle(std::mem::take(&mut text)),
                        Span::new(line, text_start + 1, cursor.pos - text_start),
                    ));
                }
                let quote_col = cursor.column();
                cursor.consume_char();
                tokens.push(Token::new(TokenKind::FStringEnd, Span::new(line, quote_col, 1)));
                return Ok(());
            }
            Some('{') => {
                if !text.is_empty() {
                    tokens.push(Token::new(
                        TokenKind::FStringMiddle(std::mem::take(&mut text)),
                        Span::new(line, text_start + 1, cursor.pos - text_start),
                    ));
                }
                read_fstring_expr(cursor, tokens)?;
                text_start = cursor.pos;
            }
            Some('\\') => {
                let escape_col = cursor.column();
                cursor.consume_char();
                let escaped = cursor.consume_char().ok_or(LexError::UnterminatedString {
                    line,
                    column: start + 1,
                })?;
                let decoded = decode_escape(escaped).ok_or_else(|| LexError::UnknownEscape {
                    lexeme: format!("\\{escaped}"),
                    line,
                    column: escape_col,
                })?;
                text.push(decoded);
            }
            Some(c) => {
                cursor.consume_char();
                text.push(c);
            }
        }
    }
}

/// Lex one `{…}` placeholder. The expression text between the braces is
/// delimited with a bracket-depth counter, then run through the regular
/// expression lexer so the parser sees `{` tokens `}` inline.
fn read_fstring_expr(cursor: &mut Cursor, tokens: &mut Vec<Token>) -> LexResult<()> {
    let line = cursor.line;
    let brace_col = cursor.column();
    cursor.consume_char(); // '{'

    let expr_start = cursor.pos;
    let mut depth = 0usize;
    let expr_end = loop {
        match cursor.peek_char() {
            None => {
                return Err(LexError::UnterminatedFStringExpr {
                    line,
                    column: brace_col,
                });
            }
            Some('}') if depth == 0 => break cursor.pos,
            Some('{') | Some('[') | Some('(') => {
                depth += 1;
                cursor.consume_char();
            }
            Some('}') | Some(']') | Some(')') => {
                depth = depth.saturating_sub(1);
                cursor.consume_char();
            }
            Some(_) => {
                cursor.consume_char();
            }
        }
    };

    if cursor.text[expr_start..expr_end].trim().is_empty() {
        return Err(LexError::EmptyFStringExpr {
            line,
            column: brace_col,
        });
    }

    tokens.push(Token::new(TokenKind::LBrace, Span::new(line, brace_col, 1)));
    let mut inner = Cursor::new(cursor.text, expr_start, expr_end, line);
    lex_code(&mut inner, tokens)?;
    tokens.push(Token::new(
        TokenKind::RBrace,
        Span::new(line, cursor.column(), 1),
    ));
    cursor.consume_char(); // '}'
    Ok(())
}

fn read_operator(cursor: &mut Cursor, tokens: &mut Vec<Token>) -> LexResult<()> {
    let start = cursor.pos;
    let line = cursor.line;

    const MULTI: [(&str, TokenKind); 11] = [
        ("//=", TokenKind::FloorDivEq),
        ("==", TokenKind::Eq),
        ("!=", TokenKind::NotEq),
        ("<=", TokenKind::Lte),
        (">=", TokenKind::Gte),
        ("->", TokenKind::Arrow),
        ("+=", TokenKind::PlusEq),
        ("-=", TokenKind::MinusEq),
        ("*=", TokenKind::StarEq),
        ("/=", TokenKind::SlashEq),
        ("%=", TokenKind::PercentEq),
    ];
    for (lexeme, kind) in MULTI {
        if cursor.starts_with(lexeme) {
            cursor.advance(lexeme.len());
            tokens.push(Token::new(kind, Span::new(line, start + 1, lexeme.len())));
            return Ok(());
        }
    }
    if cursor.starts_with("//") {
        cursor.advance(2);
        tokens.push(Token::new(TokenKind::FloorDiv, Span::new(line, start + 1, 2)));
        return Ok(());
    }

    let ch = cursor.peek_char().expect("caller saw a character");
    if ch == '.' && matches!(cursor.peek_ahead(1), Some(c) if c.is_ascii_digit()) {
        // `.5` style floats are rejected outright.
        return Err(LexError::MalformedFloat {
            line,
            column: cursor.column(),
        });
    }

    let kind = match ch {
        '=' => TokenKind::Assign,
        '+' => TokenKind::Plus,
        '-' => TokenKind::Minus,
        '*' => TokenKind::Star,
        '/' => TokenKind::Slash,
        '%' => TokenKind::Percent,
        '<' => TokenKind::Lt,
        '>' => TokenKind::Gt,
        ':' => TokenKind::Colon,
        ';' => TokenKind::Semicolon,
        ',' => TokenKind::Comma,
        '.' => TokenKind::Dot,
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        '[' => TokenKind::LBracket,
        ']' => TokenKind::RBracket,
        '{' => TokenKind::LBrace,
        '}' => TokenKind::RBrace,
        other => {
            return Err(LexError::UnexpectedCharacter {
                character: other,
                line,
                column: cursor.column(),
            });
        }
    };
    cursor.consume_char();
    tokens.push(Token::new(kind, Span::new(line, start + 1, 1)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_function_with_block() {
        let input = indoc! {"
            def double(n: int) -> int:
                return n + n
        "};
        let expected = vec![
            TokenKind::Def,
            TokenKind::Identifier("double".to_string()),
            TokenKind::LParen,
            TokenKind::Identifier("n".to_string()),
            TokenKind::Colon,
            TokenKind::Identifier("int".to_string()),
            TokenKind::RParen,
            TokenKind::Arrow,
            TokenKind::Identifier("int".to_string()),
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Return,
            TokenKind::Identifier("n".to_string()),
            TokenKind::Plus,
            TokenKind::Identifier("n".to_string()),
            TokenKind::Newline,
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::EOF,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn blank_and_comment_lines_keep_indentation() {
        let input = indoc! {"
            if True:
                x: int = 1
                # note

                x = 2
        "};
        let tokens = kinds(input);
        let dedents = tokens
            .iter()
            .filter(|kind| matches!(kind, TokenKind::Dedent))
            .count();
        assert_eq!(dedents, 1);
        let indents = tokens
            .iter()
            .filter(|kind| matches!(kind, TokenKind::Indent))
            .count();
        assert_eq!(indents, 1);
    }

    #[test]
    fn emits_dedents_before_eof() {
        let input = "while True:\n    if True:\n        pass";
        let tokens = kinds(input);
        let tail = &tokens[tokens.len() - 3..];
        assert_eq!(tail, &[TokenKind::Dedent, TokenKind::Dedent, TokenKind::EOF]);
    }

    #[test]
    fn errors_on_tab_in_indentation() {
        let err = tokenize("\tx: int = 1\n").expect_err("expected indentation failure");
        assert_eq!(
            err,
            LexError::MixedIndentation { line: 1, column: 1 }
        );
    }

    #[test]
    fn errors_on_inconsistent_dedent() {
        let input = indoc! {"
            if True:
                x: int = 1
              y: int = 2
        "};
        let err = tokenize(input).expect_err("expected dedent failure");
        assert_eq!(
            err,
            LexError::InconsistentDedent {
                indent: 2,
                line: 3,
                column: 1
            }
        );
    }

    #[test]
    fn decodes_numeric_underscores() {
        assert_eq!(
            kinds("1_000_000\n")[0],
            TokenKind::Int(1_000_000),
        );
        assert_eq!(kinds("1_2.5_0\n")[0], TokenKind::Float(12.50));
        assert_eq!(kinds("6_0e1\n")[0], TokenKind::Float(600.0));
    }

    #[test]
    fn rejects_bad_numeric_literals() {
        for source in ["5.\n", ".5\n", "1__2\n", "1_.5\n", "1._5\n", "1_\n"] {
            let err = tokenize(source).expect_err("expected numeric failure");
            assert!(
                matches!(
                    err,
                    LexError::MalformedFloat { .. } | LexError::BadNumericUnderscore { .. }
                ),
                "unexpected error {err:?} for {source:?}"
            );
        }
    }

    #[test]
    fn errors_on_integer_overflow() {
        let err = tokenize("99999999999999999999999999\n").expect_err("expected overflow");
        assert!(err.to_string().contains("invalid integer literal"));
    }

    #[test]
    fn decodes_string_escapes() {
        assert_eq!(
            kinds("'a\\tb\\n'\n")[0],
            TokenKind::Str("a\tb\n".to_string())
        );
        assert_eq!(kinds("\"he said \\\"hi\\\"\"\n")[0],
            TokenKind::Str("he said \"hi\"".to_string()));
    }

    #[test]
    fn errors_on_unknown_escape() {
        let err = tokenize("x: str = \"a\\qb\"\n").expect_err("expected escape failure");
        assert_eq!(
            err,
            LexError::UnknownEscape {
                lexeme: "\\q".to_string(),
                line: 1,
                column: 12,
            }
        );
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("x: str = \"abc\n").expect_err("expected unterminated failure");
        assert_eq!(err, LexError::UnterminatedString { line: 1, column: 10 });
    }

    #[test]
    fn splits_fstring_into_parts() {
        let tokens = kinds("f\"hp: {hp} left\"\n");
        let expected = vec![
            TokenKind::FStringStart,
            TokenKind::FStringMiddle("hp: ".to_string()),
            TokenKind::LBrace,
            TokenKind::Identifier("hp".to_string()),
            TokenKind::RBrace,
            TokenKind::FStringMiddle(" left".to_string()),
            TokenKind::FStringEnd,
            TokenKind::Newline,
            TokenKind::EOF,
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn fstring_placeholder_tracks_bracket_depth() {
        let tokens = kinds("f\"first: {names[0]}\"\n");
        assert!(tokens.contains(&TokenKind::LBracket));
        assert!(tokens.contains(&TokenKind::Int(0)));
        assert_eq!(
            tokens[tokens.len() - 3..],
            [TokenKind::FStringEnd, TokenKind::Newline, TokenKind::EOF]
        );
    }

    #[test]
    fn errors_on_empty_fstring_placeholder() {
        let err = tokenize("f\"oops {}\"\n").expect_err("expected placeholder failure");
        assert_eq!(err, LexError::EmptyFStringExpr { line: 1, column: 8 });
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(kinds("True\n")[0], TokenKind::True);
        assert_eq!(
            kinds("true\n")[0],
            TokenKind::Identifier("true".to_string())
        );
        assert_eq!(kinds("None\n")[0], TokenKind::None);
    }

    #[test]
    fn accepts_crlf_line_endings() {
        let tokens = kinds("x: int = 1\r\ny: int = 2\r\n");
        assert!(tokens.contains(&TokenKind::Identifier("y".to_string())));
        assert_eq!(tokens.last(), Some(&TokenKind::EOF));
    }

    #[test]
    fn errors_on_unexpected_character() {
        let err = tokenize("x = 1 @ 2\n").expect_err("expected lexing failure");
        assert!(err.to_string().contains("unexpected character '@'"));
    }
}
