pub mod ast;
pub mod builtin;
pub mod channel;
pub mod defs;
pub mod error;
pub mod eval;
pub mod header;
pub mod lexer;
pub mod parser;
pub mod value;

pub use channel::{Channel, Fields};
pub use defs::{Delimiters, TemplateDefinition, TemplateSet};
pub use error::{SourceLocation, TemplateError, TemplateResult};
pub use header::HeaderGenerator;
pub use value::Value;
