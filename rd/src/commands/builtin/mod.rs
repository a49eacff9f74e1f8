//! Built-in command set

mod artifacts;
mod criteria;
mod knowledge;
mod lifecycle;
mod misc;
mod subproblems;

pub use artifacts::{
    AddArtifactCommand, AppendToArtifactCommand, CloseArtifactCommand, DeleteArtifactCommand, OpenArtifactCommand,
    OverwriteArtifactCommand,
};
pub use criteria::{AddCriteriaCommand, AddCriteriaToSubproblemCommand, MarkCriteriaAsDoneCommand};
pub use knowledge::{AddKnowledgeCommand, AppendKnowledgeCommand, DeleteKnowledgeCommand, RewriteKnowledgeCommand};
pub use lifecycle::{FailProblemCommand, FinishProblemCommand};
pub use misc::{AddLogEntryCommand, AppendToProblemDefinitionCommand, SendMessageToCommand, ThinkCommand};
pub use subproblems::{
    ActivateSubproblemsCommand, AddSubproblemCommand, CancelSubproblemCommand, WaitForSubproblemsCommand,
};

use super::command::Command;

/// Every built-in, in registration order.
pub fn all_commands() -> Vec<Box<dyn Command>> {
    vec![
        Box::new(AddCriteriaCommand),
        Box::new(MarkCriteriaAsDoneCommand),
        Box::new(AddCriteriaToSubproblemCommand),
        Box::new(AddSubproblemCommand),
        Box::new(ActivateSubproblemsCommand),
        Box::new(WaitForSubproblemsCommand),
        Box::new(CancelSubproblemCommand),
        Box::new(AddArtifactCommand),
        Box::new(AppendToArtifactCommand),
        Box::new(OverwriteArtifactCommand),
        Box::new(DeleteArtifactCommand),
        Box::new(OpenArtifactCommand),
        Box::new(CloseArtifactCommand),
        Box::new(AddKnowledgeCommand),
        Box::new(AppendKnowledgeCommand),
        Box::new(RewriteKnowledgeCommand),
        Box::new(DeleteKnowledgeCommand),
        Box::new(FinishProblemCommand),
        Box::new(FailProblemCommand),
        Box::new(AppendToProblemDefinitionCommand),
        Box::new(AddLogEntryCommand),
        Box::new(SendMessageToCommand),
        Box::new(ThinkCommand),
    ]
}
