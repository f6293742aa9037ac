use crate::error::{SourceLocation, TemplateError, TemplateResult};

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const TRIM_RIGHT_DELIM: &str = "-}}";
const COMMENT_OPEN: &str = "/*";
const COMMENT_CLOSE: &str = "*/";

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    Text(String),
    LeftDelim,
    RightDelim,
    If,
    Else,
    End,
    Range,
    True,
    False,
    Identifier(String),
    Variable { name: String, path: Vec<String> }, // $name.Field.Chain, name is "" for `$`
    Field(Vec<String>),                          // .Field.Chain
    Dot,
    String(String),
    Integer(i64),
    ColonEqual,
    Comma,
    Pipe,
    LeftParen,
    RightParen,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

/// Splits template text into literal runs and the tokens inside `{{ }}` actions.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    in_action: bool,
    action_start: SourceLocation,
    trim_next_text: bool,
}

fn is_space(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n')
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            in_action: false,
            action_start: SourceLocation::new(1, 1),
            trim_next_text: false,
        }
    }

    pub fn tokenize(&mut self) -> TemplateResult<Vec<Token>> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            if self.in_action {
                self.lex_action_token(&mut tokens)?;
            } else {
                self.lex_text(&mut tokens)?;
            }
        }

        if self.in_action {
            return Err(TemplateError::malformed(
                "unclosed action",
                self.action_start,
            ));
        }

        tokens.push(Token {
            token_type: TokenType::Eof,
            line: self.line,
            column: self.column,
        });

        Ok(tokens)
    }

    fn lex_text(&mut self, tokens: &mut Vec<Token>) -> TemplateResult<()> {
        let line = self.line;
        let column = self.column;
        let mut value = String::new();

        while !self.is_at_end() && !self.starts_with(LEFT_DELIM) {
            value.push(self.current_char());
            self.advance();
        }

        if self.trim_next_text {
            value = value.trim_start_matches(is_space).to_string();
            self.trim_next_text = false;
        }

        if self.is_at_end() {
            push_text(tokens, value, line, column);
            return Ok(());
        }

        let open = self.location();
        self.advance_by(LEFT_DELIM.len());

        // `{{- ` eats the whitespace before the action
        if self.current_char() == '-' && is_space(self.peek_char(1)) {
            self.advance();
            value = value.trim_end_matches(is_space).to_string();
        }
        push_text(tokens, value, line, column);

        self.skip_whitespace();
        if self.starts_with(COMMENT_OPEN) {
            return self.skip_comment(open);
        }

        tokens.push(Token {
            token_type: TokenType::LeftDelim,
            line: open.line,
            column: open.column,
        });
        self.in_action = true;
        self.action_start = open;
        Ok(())
    }

    fn skip_comment(&mut self, open: SourceLocation) -> TemplateResult<()> {
        self.advance_by(COMMENT_OPEN.len());
        while !self.is_at_end() && !self.starts_with(COMMENT_CLOSE) {
            self.advance();
        }
        if self.is_at_end() {
            return Err(TemplateError::malformed("unclosed comment", open));
        }
        self.advance_by(COMMENT_CLOSE.len());

        if self.starts_with(RIGHT_DELIM) {
            self.advance_by(RIGHT_DELIM.len());
        } else if self.current_char() == ' ' && self.starts_with_at(1, TRIM_RIGHT_DELIM) {
            self.advance_by(1 + TRIM_RIGHT_DELIM.len());
            self.trim_next_text = true;
        } else {
            return Err(TemplateError::malformed(
                "comment ends before closing delimiter",
                open,
            ));
        }
        Ok(())
    }

    fn lex_action_token(&mut self, tokens: &mut Vec<Token>) -> TemplateResult<()> {
        let skipped = self.skip_whitespace();
        if self.is_at_end() {
            return Ok(());
        }

        let line = self.line;
        let column = self.column;

        if skipped && self.starts_with(TRIM_RIGHT_DELIM) {
            self.advance_by(TRIM_RIGHT_DELIM.len());
            self.close_action(tokens, line, column);
            self.trim_next_text = true;
            return Ok(());
        }
        if self.starts_with(RIGHT_DELIM) {
            self.advance_by(RIGHT_DELIM.len());
            self.close_action(tokens, line, column);
            return Ok(());
        }

        let ch = self.current_char();
        let token_type = match ch {
            '"' => self.read_string()?,
            '`' => self.read_raw_string()?,
            '$' => self.read_variable(),
            '.' => {
                if is_ident_char(self.peek_char(1)) && !self.peek_char(1).is_numeric() {
                    TokenType::Field(self.read_field_chain())
                } else {
                    self.advance();
                    TokenType::Dot
                }
            }
            ':' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::ColonEqual
                } else {
                    return Err(TemplateError::malformed(
                        "expected := after ':'",
                        SourceLocation::new(line, column),
                    ));
                }
            }
            ',' => {
                self.advance();
                TokenType::Comma
            }
            '|' => {
                self.advance();
                TokenType::Pipe
            }
            '(' => {
                self.advance();
                TokenType::LeftParen
            }
            ')' => {
                self.advance();
                TokenType::RightParen
            }
            '-' if self.peek_char(1).is_ascii_digit() => self.read_number()?,
            _ if ch.is_ascii_digit() => self.read_number()?,
            _ if ch.is_alphabetic() || ch == '_' => self.read_identifier(),
            _ => {
                return Err(TemplateError::malformed(
                    format!("unexpected character '{}' in action", ch),
                    SourceLocation::new(line, column),
                ))
            }
        };

        tokens.push(Token {
            token_type,
            line,
            column,
        });
        Ok(())
    }

    fn close_action(&mut self, tokens: &mut Vec<Token>, line: usize, column: usize) {
        tokens.push(Token {
            token_type: TokenType::RightDelim,
            line,
            column,
        });
        self.in_action = false;
    }

    fn read_string(&mut self) -> TemplateResult<TokenType> {
        let start = self.location();
        self.advance(); // opening quote
        let mut value = String::new();

        while !self.is_at_end() && self.current_char() != '"' {
            match self.current_char() {
                '\n' => break,
                '\\' => {
                    self.advance();
                    match self.current_char() {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '\\' => value.push('\\'),
                        '"' => value.push('"'),
                        other => {
                            return Err(TemplateError::malformed(
                                format!("unknown escape sequence '\\{}'", other),
                                self.location(),
                            ))
                        }
                    }
                    self.advance();
                }
                ch => {
                    value.push(ch);
                    self.advance();
                }
            }
        }

        if self.current_char() != '"' {
            return Err(TemplateError::malformed("unterminated quoted string", start));
        }
        self.advance(); // closing quote

        Ok(TokenType::String(value))
    }

    fn read_raw_string(&mut self) -> TemplateResult<TokenType> {
        let start = self.location();
        self.advance();
        let mut value = String::new();

        while !self.is_at_end() && self.current_char() != '`' {
            value.push(self.current_char());
            self.advance();
        }
        if self.is_at_end() {
            return Err(TemplateError::malformed("unterminated raw quoted string", start));
        }
        self.advance();

        Ok(TokenType::String(value))
    }

    fn read_variable(&mut self) -> TokenType {
        self.advance(); // '$'
        let name = self.read_word();
        let path = if self.current_char() == '.' && is_ident_char(self.peek_char(1)) {
            self.read_field_chain()
        } else {
            Vec::new()
        };
        TokenType::Variable { name, path }
    }

    fn read_field_chain(&mut self) -> Vec<String> {
        let mut path = Vec::new();
        while self.current_char() == '.' && is_ident_char(self.peek_char(1)) {
            self.advance();
            path.push(self.read_word());
        }
        path
    }

    fn read_identifier(&mut self) -> TokenType {
        let value = self.read_word();
        match value.as_str() {
            "if" => TokenType::If,
            "else" => TokenType::Else,
            "end" => TokenType::End,
            "range" => TokenType::Range,
            "true" => TokenType::True,
            "false" => TokenType::False,
            _ => TokenType::Identifier(value),
        }
    }

    fn read_number(&mut self) -> TemplateResult<TokenType> {
        let start = self.location();
        let mut value = String::new();
        if self.current_char() == '-' {
            value.push('-');
            self.advance();
        }
        while !self.is_at_end() && self.current_char().is_ascii_digit() {
            value.push(self.current_char());
            self.advance();
        }

        value
            .parse()
            .map(TokenType::Integer)
            .map_err(|_| TemplateError::malformed(format!("invalid number '{}'", value), start))
    }

    fn read_word(&mut self) -> String {
        let mut value = String::new();
        while !self.is_at_end() && is_ident_char(self.current_char()) {
            value.push(self.current_char());
            self.advance();
        }
        value
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while !self.is_at_end() && is_space(self.current_char()) {
            self.advance();
            skipped = true;
        }
        skipped
    }

    fn starts_with(&self, pattern: &str) -> bool {
        self.starts_with_at(0, pattern)
    }

    fn starts_with_at(&self, offset: usize, pattern: &str) -> bool {
        pattern
            .chars()
            .enumerate()
            .all(|(i, ch)| self.peek_char(offset + i) == ch)
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn current_char(&self) -> char {
        self.peek_char(0)
    }

    fn peek_char(&self, offset: usize) -> char {
        self.input
            .get(self.position + offset)
            .copied()
            .unwrap_or('\0')
    }

    fn advance_by(&mut self, count: usize) {
        for _ in 0..count {
            self.advance();
        }
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            if self.current_char() == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }
}

fn push_text(tokens: &mut Vec<Token>, value: String, line: usize, column: usize) {
    if !value.is_empty() {
        tokens.push(Token {
            token_type: TokenType::Text(value),
            line,
            column,
        });
    }
}
