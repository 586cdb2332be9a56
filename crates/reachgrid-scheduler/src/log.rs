//! Process audit logs.
//!
//! Every execution-plan state transition is narrated by one log entry.
//! The scheduler picks the [`Transition`] variant matching the state it
//! observed and converts it into a [`ProcessLog`]; the message is rendered
//! right then, so the audit trail records the world as it was at the
//! transition rather than when someone reads it.
//!
//! Missing context renders as the literal `unknown`. Messages never carry
//! raw error text.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::packing::InstancePacking;

/// Placeholder for context that was not available at the transition.
pub const UNKNOWN: &str = "unknown";

/// Execution-plan life-cycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Process {
    Waiting,
    Dispatching,
    Reached,
    Unreachable,
    Executing,
    Cancelling,
    Cancelled,
    Succeed,
    Failed,
    Timeout,
}

impl Process {
    /// Stable name used as the correlation tag in the audit trail.
    pub fn name(self) -> &'static str {
        match self {
            Process::Waiting => "WAITING",
            Process::Dispatching => "DISPATCHING",
            Process::Reached => "REACHED",
            Process::Unreachable => "UNREACHABLE",
            Process::Executing => "EXECUTING",
            Process::Cancelling => "CANCELLING",
            Process::Cancelled => "CANCELLED",
            Process::Succeed => "SUCCEED",
            Process::Failed => "FAILED",
            Process::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Anything that can narrate one process state.
pub trait LogParser {
    /// The state this entry narrates.
    fn process(&self) -> Process;

    /// The rendered audit message.
    fn message(&self) -> &str;
}

/// An observed transition, carrying the context its message needs.
///
/// `instance` is the description of the instance involved, `None` when
/// the scheduler could not resolve it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Waiting,
    Dispatching { instance: Option<String> },
    Reached { instance: Option<String> },
    Unreachable { instance: Option<String> },
    Executing { instance: Option<String> },
    Cancelling { instance: Option<String> },
    Cancelled { instance: Option<String> },
    Succeed { instance: Option<String> },
    Failed { instance: Option<String> },
    Timeout { instance: Option<String> },
}

impl Transition {
    /// The plan is being cancelled and the instance acknowledged it.
    pub fn cancelling(packing: Option<&InstancePacking>) -> Self {
        Transition::Cancelling {
            instance: packing.map(InstancePacking::describe),
        }
    }

    pub fn dispatching(packing: Option<&InstancePacking>) -> Self {
        Transition::Dispatching {
            instance: packing.map(InstancePacking::describe),
        }
    }

    pub fn reached(packing: Option<&InstancePacking>) -> Self {
        Transition::Reached {
            instance: packing.map(InstancePacking::describe),
        }
    }

    pub fn unreachable(packing: Option<&InstancePacking>) -> Self {
        Transition::Unreachable {
            instance: packing.map(InstancePacking::describe),
        }
    }

    pub fn process(&self) -> Process {
        match self {
            Transition::Waiting => Process::Waiting,
            Transition::Dispatching { .. } => Process::Dispatching,
            Transition::Reached { .. } => Process::Reached,
            Transition::Unreachable { .. } => Process::Unreachable,
            Transition::Executing { .. } => Process::Executing,
            Transition::Cancelling { .. } => Process::Cancelling,
            Transition::Cancelled { .. } => Process::Cancelled,
            Transition::Succeed { .. } => Process::Succeed,
            Transition::Failed { .. } => Process::Failed,
            Transition::Timeout { .. } => Process::Timeout,
        }
    }

    /// Render the audit message for this transition.
    pub fn render(&self) -> String {
        match self {
            Transition::Waiting => "The execution plan is waiting to be dispatched.".to_string(),
            Transition::Dispatching { instance } => format!(
                "The execution plan is being dispatched to the instance {}.",
                or_unknown(instance)
            ),
            Transition::Reached { instance } => format!(
                "The execution plan has been accepted by the instance {}.",
                or_unknown(instance)
            ),
            Transition::Unreachable { instance } => format!(
                "The execution plan could not reach the instance {}.",
                or_unknown(instance)
            ),
            Transition::Executing { instance } => format!(
                "The execution plan is being executed by the instance {}.",
                or_unknown(instance)
            ),
            Transition::Cancelling { instance } => format!(
                "The execution plan is being cancelled, and it has been accepted by the instance {}.",
                or_unknown(instance)
            ),
            Transition::Cancelled { instance } => format!(
                "The execution plan has been cancelled on the instance {}.",
                or_unknown(instance)
            ),
            Transition::Succeed { instance } => format!(
                "The execution plan has been completed by the instance {}.",
                or_unknown(instance)
            ),
            Transition::Failed { instance } => format!(
                "The execution plan failed on the instance {}.",
                or_unknown(instance)
            ),
            Transition::Timeout { instance } => format!(
                "The execution plan timed out on the instance {}.",
                or_unknown(instance)
            ),
        }
    }
}

fn or_unknown(instance: &Option<String>) -> &str {
    instance.as_deref().unwrap_or(UNKNOWN)
}

/// One immutable audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessLog {
    process: Process,
    message: String,
}

impl ProcessLog {
    pub fn new(transition: &Transition) -> Self {
        Self {
            process: transition.process(),
            message: transition.render(),
        }
    }

    /// Entry for a cancellation acknowledged by `packing`.
    pub fn cancelling(packing: Option<&InstancePacking>) -> Self {
        Self::new(&Transition::cancelling(packing))
    }
}

impl From<Transition> for ProcessLog {
    fn from(transition: Transition) -> Self {
        Self::new(&transition)
    }
}

impl LogParser for ProcessLog {
    fn process(&self) -> Process {
        self.process
    }

    fn message(&self) -> &str {
        &self.message
    }
}
