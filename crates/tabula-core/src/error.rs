use crate::compile::CompileError;
use crate::consolidate::ConsolidateError;
use crate::context::ConfigError;
use crate::parser::SyntaxError;
use crate::registry::DuplicateTypeError;

/// Any failure raised by the core. Every variant aborts the enclosing build.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    DuplicateType(#[from] DuplicateTypeError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Consolidate(#[from] ConsolidateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("type {0} is not a table")]
    NotATable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
