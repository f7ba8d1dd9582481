//! # moxie-syntax
//!
//! Stages B (lexer/parser) and C (AST) of the pipeline in one crate, since
//! in this grammar the two stages are never usefully separated: there is no
//! intermediate concrete parse tree (see `parser` module docs) — the
//! recursive-descent functions build [`ast`] nodes directly, so "parsing"
//! and "AST construction" are the same pass.
//!
//! [`token`] defines the lexical vocabulary (§3), [`lexer`] turns source text
//! into a token stream, [`ast`] is the typed tree of §3's five node
//! categories, and [`parser`] drives both into a [`ast::File`] plus a
//! diagnostic list.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use parser::parse;
