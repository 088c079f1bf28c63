pub mod ast;
mod common;
mod java;
pub mod xml;

pub use common::{descendants, node_text, Parser};
pub use java::JavaParser;
