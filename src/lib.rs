//! quill - talk to LLM backends from the command line.
//!
//! One binary, four providers, two wire protocols. Prompts come from
//! arguments, piped stdin, and file or image attachments; responses go to
//! stdout, streamed or buffered. Sessions, a response cache, spend budgets,
//! and bounded retries sit between the two.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod cli;
pub mod core;
pub mod error;
pub mod storage;

pub use error::{ExitCode, QuillError, Result};
