//! The tagged file-operation protocol: tag parsing, typed operations,
//! the error taxonomy, and the prompt text that teaches it to a model.

pub mod error;
pub mod operation;
pub mod parser;
pub mod prompt;

pub use error::OperationError;
pub use operation::{Operation, DEFAULT_AGAIN_REASON};
pub use parser::{has_operations, parse, parse_attributes, OperationKind, OperationRecord};
pub use prompt::protocol_prompt;
