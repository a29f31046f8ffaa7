//! Tagged file-operation protocol for LLM agents.
//!
//! A model edits a sandboxed project directory by embedding tags such as
//! `<create_file path="main.py">...</create_file>` in its replies. The
//! [`protocol`] module parses those tags, the [`executor`] applies them to a
//! [`sandbox`] root it can never escape, and [`agent`] wires both to an LLM.

pub mod agent;
pub mod config;
pub mod executor;
pub mod llm;
pub mod protocol;
pub mod sandbox;

pub use executor::{ExecutionResult, OperationExecutor};
pub use protocol::{has_operations, parse, protocol_prompt, OperationKind, OperationRecord};
