//! Command stacks: entry model, verification, advancement, persistence
//! and the runner that executes them.

pub mod advancement;
pub mod document;
pub mod entry;
pub mod record;
pub mod runner;
pub mod verify;

pub use advancement::{
    acknowledgment_catalog, classify_acknowledgment, decide, effective_advancement, resolve_advancement,
    resolve_selection, AckDecision, AckOption, AckSelection, AckSource, AdvancementParams, AdvancementSource,
};
pub use document::{expand_complex_arguments, StackDocument, StackFormat, StepProblem};
pub use entry::{
    stack_parameters, CheckStep, CommandStep, ExecutionState, ParameterCheck, StackedEntry, Step, TextStep,
    VerifyStep,
};
pub use record::{Acknowledgment, CommandHistoryRecord};
pub use runner::{RunnerPolicy, StackRunner, StopHandle};
pub use verify::{Comparison, ComparisonStatus, NamedParameterValue, Operator, StatusCell};
