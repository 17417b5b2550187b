pub mod ast;
pub mod invalidation;
pub mod list;
pub mod parser;
