//! Mission stack - command argument typing and stack verification
//!
//! Client-side engine for building, validating and running command stacks
//! against a mission database.
//!
//! ## Flow
//! Command definition -> ArgumentTree -> ArgumentForm (typed editing,
//! dimension tracking) -> CommandStep -> StackDocument -> StackRunner
//!
//! The backend is reached only through the collaborator traits in
//! [`client`]; live parameter values arrive through [`feed`].

// Core error handling
pub mod error;

// Configuration
pub mod config;

// Typed argument values
pub mod codec;
pub mod dimension;
pub mod argument_tree;

// Stack model and execution
pub mod stack;

// Backend collaborators
pub mod client;
pub mod feed;

pub use argument_tree::{build_argument_tree, ArgumentForm, ArgumentTree, TemplateProvider};
pub use client::{CommandClient, CommandHistoryFeed, ParameterFeed, Subscription};
pub use config::{ConfigLoader, StackConfig};
pub use error::{Result, StackError};
pub use feed::{LiveValueCache, ParameterSnapshot, Throttled};
pub use stack::{StackDocument, StackRunner, StackedEntry};
