pub mod commands;
pub mod compose;
pub mod repl;
