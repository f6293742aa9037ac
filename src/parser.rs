use crate::ast::{Branch, Command, Expression, Node, Pipeline, Template};
use crate::error::{SourceLocation, TemplateError, TemplateResult};
use crate::lexer::{Lexer, Token, TokenType};

/// What closed a run of nodes.
enum BlockEnd {
    End(SourceLocation),
    Else(SourceLocation),
    ElseIf(Pipeline),
    Eof,
}

enum Action {
    Node(Node),
    Terminator(BlockEnd),
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

/// Lex and parse template text in one step.
pub fn parse_template(source: &str) -> TemplateResult<Template> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse(&mut self) -> TemplateResult<Template> {
        let (nodes, end) = self.parse_nodes()?;
        match end {
            BlockEnd::Eof => Ok(Template { nodes }),
            BlockEnd::End(location) => Err(TemplateError::malformed("unexpected {{end}}", location)),
            BlockEnd::Else(location) => {
                Err(TemplateError::malformed("unexpected {{else}}", location))
            }
            BlockEnd::ElseIf(pipeline) => Err(TemplateError::malformed(
                "unexpected {{else if}}",
                pipeline.location,
            )),
        }
    }

    fn parse_nodes(&mut self) -> TemplateResult<(Vec<Node>, BlockEnd)> {
        let mut nodes = Vec::new();

        loop {
            let token = self.advance().clone();
            let location = token.location();
            match token.token_type {
                TokenType::Eof => return Ok((nodes, BlockEnd::Eof)),
                TokenType::Text(text) => nodes.push(Node::Text(text)),
                TokenType::LeftDelim => match self.parse_action(location)? {
                    Action::Node(node) => nodes.push(node),
                    Action::Terminator(end) => return Ok((nodes, end)),
                },
                other => {
                    return Err(TemplateError::malformed(
                        format!("unexpected {:?} outside action", other),
                        location,
                    ))
                }
            }
        }
    }

    fn parse_action(&mut self, open: SourceLocation) -> TemplateResult<Action> {
        match self.peek().token_type {
            TokenType::If => {
                self.advance();
                Ok(Action::Node(self.parse_if(open)?))
            }
            TokenType::Range => {
                self.advance();
                Ok(Action::Node(self.parse_range(open)?))
            }
            TokenType::End => {
                self.advance();
                self.expect_right_delim()?;
                Ok(Action::Terminator(BlockEnd::End(open)))
            }
            TokenType::Else => {
                self.advance();
                if self.peek().token_type == TokenType::If {
                    self.advance();
                    let condition = self.parse_pipeline()?;
                    self.expect_right_delim()?;
                    Ok(Action::Terminator(BlockEnd::ElseIf(condition)))
                } else {
                    self.expect_right_delim()?;
                    Ok(Action::Terminator(BlockEnd::Else(open)))
                }
            }
            _ => {
                let pipeline = self.parse_pipeline()?;
                self.expect_right_delim()?;
                Ok(Action::Node(Node::Action(pipeline)))
            }
        }
    }

    fn parse_if(&mut self, open: SourceLocation) -> TemplateResult<Node> {
        let mut branches = Vec::new();
        let mut condition = self.parse_pipeline()?;
        self.expect_right_delim()?;

        loop {
            let (body, end) = self.parse_nodes()?;
            branches.push(Branch { condition, body });

            match end {
                BlockEnd::End(_) => {
                    return Ok(Node::If {
                        branches,
                        else_body: None,
                    })
                }
                BlockEnd::ElseIf(next) => condition = next,
                BlockEnd::Else(_) => {
                    let else_body = self.parse_final_else("if", open)?;
                    return Ok(Node::If {
                        branches,
                        else_body: Some(else_body),
                    });
                }
                BlockEnd::Eof => return Err(TemplateError::malformed("unclosed {{if}}", open)),
            }
        }
    }

    fn parse_range(&mut self, open: SourceLocation) -> TemplateResult<Node> {
        let (key, value) = self.parse_range_declaration()?;
        let pipeline = self.parse_pipeline()?;
        self.expect_right_delim()?;

        let (body, end) = self.parse_nodes()?;
        let else_body = match end {
            BlockEnd::End(_) => None,
            BlockEnd::Else(_) => Some(self.parse_final_else("range", open)?),
            BlockEnd::ElseIf(pipeline) => {
                return Err(TemplateError::malformed(
                    "{{else if}} is not allowed in {{range}}",
                    pipeline.location,
                ))
            }
            BlockEnd::Eof => return Err(TemplateError::malformed("unclosed {{range}}", open)),
        };

        Ok(Node::Range {
            key,
            value,
            pipeline,
            body,
            else_body,
        })
    }

    /// Body after a plain `{{else}}`; only `{{end}}` may close it.
    fn parse_final_else(&mut self, block: &str, open: SourceLocation) -> TemplateResult<Vec<Node>> {
        let (body, end) = self.parse_nodes()?;
        match end {
            BlockEnd::End(_) => Ok(body),
            BlockEnd::Else(location) => Err(TemplateError::malformed(
                format!("expected {{{{end}}}} after {{{{else}}}} in {{{{{}}}}}", block),
                location,
            )),
            BlockEnd::ElseIf(pipeline) => Err(TemplateError::malformed(
                format!("expected {{{{end}}}} after {{{{else}}}} in {{{{{}}}}}", block),
                pipeline.location,
            )),
            BlockEnd::Eof => Err(TemplateError::malformed(
                format!("unclosed {{{{{}}}}}", block),
                open,
            )),
        }
    }

    fn parse_range_declaration(&mut self) -> TemplateResult<(Option<String>, Option<String>)> {
        let first = match self.declared_variable(self.current) {
            Some(name) => name,
            None => return Ok((None, None)),
        };

        match self.token_at(self.current + 1).token_type {
            TokenType::ColonEqual => {
                self.advance();
                self.advance();
                Ok((None, Some(first)))
            }
            TokenType::Comma => {
                self.advance();
                self.advance();
                let location = self.peek().location();
                let second = self.declared_variable(self.current).ok_or_else(|| {
                    TemplateError::malformed("expected variable after ',' in range", location)
                })?;
                self.advance();
                if self.peek().token_type != TokenType::ColonEqual {
                    return Err(TemplateError::malformed(
                        "expected := in range declaration",
                        self.peek().location(),
                    ));
                }
                self.advance();
                Ok((Some(first), Some(second)))
            }
            _ => Ok((None, None)),
        }
    }

    fn declared_variable(&self, index: usize) -> Option<String> {
        match &self.token_at(index).token_type {
            TokenType::Variable { name, path } if path.is_empty() && !name.is_empty() => {
                Some(name.clone())
            }
            _ => None,
        }
    }

    fn parse_pipeline(&mut self) -> TemplateResult<Pipeline> {
        let location = self.peek().location();
        let mut commands = vec![self.parse_command()?];

        while self.peek().token_type == TokenType::Pipe {
            self.advance();
            commands.push(self.parse_command()?);
        }

        Ok(Pipeline { commands, location })
    }

    fn parse_command(&mut self) -> TemplateResult<Command> {
        let location = self.peek().location();
        let mut args = Vec::new();

        while !matches!(
            self.peek().token_type,
            TokenType::RightDelim | TokenType::RightParen | TokenType::Pipe | TokenType::Eof
        ) {
            args.push(self.parse_operand()?);
        }

        if args.is_empty() {
            return Err(TemplateError::malformed("missing value for command", location));
        }
        Ok(Command { args, location })
    }

    fn parse_operand(&mut self) -> TemplateResult<Expression> {
        let token = self.advance().clone();
        let location = token.location();
        let expression = match token.token_type {
            TokenType::String(value) => Expression::StringLiteral(value),
            TokenType::Integer(value) => Expression::IntegerLiteral(value),
            TokenType::True => Expression::BoolLiteral(true),
            TokenType::False => Expression::BoolLiteral(false),
            TokenType::Dot => Expression::Dot,
            TokenType::Field(path) => Expression::Field(path),
            TokenType::Variable { name, path } => Expression::Variable { name, path },
            TokenType::Identifier(name) => Expression::Function(name),
            TokenType::LeftParen => {
                let inner = self.parse_pipeline()?;
                if self.peek().token_type != TokenType::RightParen {
                    return Err(TemplateError::malformed("unclosed left paren", location));
                }
                self.advance();
                Expression::Pipeline(Box::new(inner))
            }
            other => {
                return Err(TemplateError::malformed(
                    format!("unexpected {:?} in operand", other),
                    location,
                ))
            }
        };
        Ok(expression)
    }

    fn expect_right_delim(&mut self) -> TemplateResult<()> {
        let token = self.peek();
        if token.token_type == TokenType::RightDelim {
            self.advance();
            Ok(())
        } else {
            Err(TemplateError::malformed(
                format!("expected }}}}, found {:?}", token.token_type),
                token.location(),
            ))
        }
    }

    fn token_at(&self, index: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[index.min(last)]
    }

    fn peek(&self) -> &Token {
        self.token_at(self.current)
    }

    fn advance(&mut self) -> &Token {
        let index = self.current;
        if !self.is_at_end() {
            self.current += 1;
        }
        self.token_at(index)
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }
}
