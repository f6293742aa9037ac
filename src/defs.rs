//! Definition files: named template blocks inside an otherwise ignored text file.
//!
//! ```text
//! # anything outside a block is a comment
//! #defkey SOME_KEY
//! template text, lines joined without separator \\n
//! #end
//! ```
//!
//! Inside a block a trailing run of `\\n` (backslash, backslash, `n`) becomes
//! newlines; the sequence anywhere else on the line is kept as written.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::ast::Template;
use crate::error::{SourceLocation, TemplateError, TemplateResult};
use crate::eval;
use crate::parser::parse_template;
use crate::value::Value;

const NEWLINE_ESCAPE: &str = "\\\\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    pub start: String,
    pub end: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            start: "#defkey".to_string(),
            end: "#end".to_string(),
        }
    }
}

impl Delimiters {
    /// The key when `line` opens a block.
    fn opening_key<'l>(&self, line: &'l str) -> Option<&'l str> {
        let rest = line.strip_prefix(self.start.as_str())?;
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            Some(rest.trim())
        } else {
            None
        }
    }

    fn is_closing(&self, line: &str) -> bool {
        line.split_whitespace().next() == Some(self.end.as_str())
    }
}

/// Appends one block line; only the `\\n` run at the end of the line
/// turns into newlines.
fn push_body_line(body: &mut String, line: &str) {
    let mut text = line;
    let mut newlines = 0;
    while let Some(rest) = text.strip_suffix(NEWLINE_ESCAPE) {
        text = rest;
        newlines += 1;
    }
    body.push_str(text);
    body.extend(std::iter::repeat('\n').take(newlines));
}

#[derive(Debug, Clone)]
pub struct TemplateDefinition {
    pub key: String,
    pub source: String,
    pub template: Template,
}

impl TemplateDefinition {
    pub fn new(key: impl Into<String>, source: impl Into<String>) -> TemplateResult<Self> {
        let source = source.into();
        let template = parse_template(&source)?;
        Ok(Self {
            key: key.into(),
            source,
            template,
        })
    }

    pub fn expand(&self, context: &Value) -> TemplateResult<String> {
        debug!(key = %self.key, "expanding template");
        eval::render(&self.template, context)
    }
}

/// Every definition of one file, in file order.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    definitions: Vec<TemplateDefinition>,
}

impl TemplateSet {
    pub fn parse(source: &str) -> TemplateResult<Self> {
        Self::parse_with(source, &Delimiters::default())
    }

    pub fn parse_with(source: &str, delimiters: &Delimiters) -> TemplateResult<Self> {
        let mut set = TemplateSet::default();
        let mut open: Option<(String, usize, String)> = None;

        for (index, line) in source.lines().enumerate() {
            let line_number = index + 1;

            match open.as_mut() {
                None => {
                    if let Some(rest) = delimiters.opening_key(line) {
                        let mut words = rest.split_whitespace();
                        let key = match (words.next(), words.next()) {
                            (Some(key), None) => key,
                            (None, _) => {
                                return Err(TemplateError::malformed(
                                    format!("{} without a key", delimiters.start),
                                    SourceLocation::new(line_number, 1),
                                ))
                            }
                            (Some(key), Some(extra)) => {
                                return Err(TemplateError::malformed(
                                    format!("unexpected '{}' after key '{}'", extra, key),
                                    SourceLocation::new(line_number, 1),
                                ))
                            }
                        };
                        open = Some((key.to_string(), line_number, String::new()));
                    }
                }
                Some((key, start, _)) if delimiters.opening_key(line).is_some() => {
                    return Err(TemplateError::malformed(
                        format!(
                            "{} inside block '{}' opened on line {}",
                            delimiters.start, key, start
                        ),
                        SourceLocation::new(line_number, 1),
                    ));
                }
                Some(_) if delimiters.is_closing(line) => {
                    if let Some((key, start, body)) = open.take() {
                        set.insert(key, body, start)?;
                    }
                }
                Some((_, _, body)) => push_body_line(body, line),
            }
        }

        if let Some((key, line, _)) = open {
            return Err(TemplateError::malformed(
                format!("block '{}' is never closed", key),
                SourceLocation::new(line, 1),
            ));
        }

        debug!(count = set.definitions.len(), "loaded template definitions");
        Ok(set)
    }

    pub fn load(path: &Path) -> TemplateResult<Self> {
        debug!(path = %path.display(), "reading template definitions");
        let source = fs::read_to_string(path)?;
        Self::parse(&source)
    }

    fn insert(&mut self, key: String, body: String, line: usize) -> TemplateResult<()> {
        if self.definitions.iter().any(|d| d.key == key) {
            return Err(TemplateError::malformed(
                format!("duplicate template key '{}'", key),
                SourceLocation::new(line, 1),
            ));
        }
        self.definitions.push(TemplateDefinition::new(key, body)?);
        Ok(())
    }

    pub fn get(&self, key: &str) -> TemplateResult<&TemplateDefinition> {
        self.definitions
            .iter()
            .find(|d| d.key == key)
            .ok_or_else(|| TemplateError::UnknownTemplateKey {
                key: key.to_string(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.definitions.iter().any(|d| d.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn expand(&self, key: &str, context: &Value) -> TemplateResult<String> {
        self.get(key)?.expand(context)
    }
}
