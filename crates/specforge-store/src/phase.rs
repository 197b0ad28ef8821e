//! Workflow phase transition table (spec §4.E).

use crate::model::Phase;
use specforge_util::{Result, SpecforgeError};

fn phase_name(phase: Phase) -> &'static str {
    match phase {
        Phase::Requirements => "requirements",
        Phase::Design => "design",
        Phase::ImplementationPlanning => "implementation_planning",
        Phase::Execution => "execution",
        Phase::Review => "review",
        Phase::Completed => "completed",
    }
}

/// Only these directed edges are legal: requirements→design,
/// design→implementation_planning, implementation_planning→execution,
/// execution→{review, completed}, review→{requirements, completed}.
#[must_use]
pub fn is_legal_transition(from: Phase, to: Phase) -> bool {
    use Phase::{Completed, Design, Execution, ImplementationPlanning, Requirements, Review};
    matches!(
        (from, to),
        (Requirements, Design)
            | (Design, ImplementationPlanning)
            | (ImplementationPlanning, Execution)
            | (Execution, Review)
            | (Execution, Completed)
            | (Review, Requirements)
            | (Review, Completed)
    )
}

/// Attempt the transition, returning the §7 Validation error on an illegal edge.
pub fn transition(from: Phase, to: Phase) -> Result<Phase> {
    if is_legal_transition(from, to) {
        Ok(to)
    } else {
        Err(SpecforgeError::IllegalPhaseTransition {
            from: phase_name(from).to_string(),
            to: phase_name(to).to_string(),
        })
    }
}
