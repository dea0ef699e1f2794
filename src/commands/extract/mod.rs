//! `extract`: reads the assembly results document page by page, walks its
//! lines through the group state machine and writes one statistics record
//! per group.

mod machine;
mod run;
mod scanner;
mod source;
#[cfg(test)]
mod tests;

pub use run::run;
