//! Registration-time validation of workflow definitions.
//!
//! The step dependency graph is checked for unknown ids, duplicates, and
//! cycles with the same depth-first walk the task graph uses, so broken
//! definitions are caught at registration rather than at run time.

use cadre_core::{CadreResult, ValidationError, WorkflowDefinition};
use std::collections::{HashMap, HashSet};

/// Validate a definition's structure: non-empty, unique step ids, known
/// dependency targets, and an acyclic step graph.
pub fn validate_definition(definition: &WorkflowDefinition) -> CadreResult<()> {
    if definition.name.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        }
        .into());
    }
    if definition.steps.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "steps".to_string(),
        }
        .into());
    }

    let mut ids = HashSet::new();
    for step in &definition.steps {
        if step.step_id.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "step_id".to_string(),
            }
            .into());
        }
        if !ids.insert(step.step_id.as_str()) {
            return Err(ValidationError::DuplicateStepId {
                step_id: step.step_id.clone(),
            }
            .into());
        }
    }

    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &definition.steps {
        for dep in &step.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(ValidationError::UnknownStepDependency {
                    step_id: step.step_id.clone(),
                    depends_on: dep.clone(),
                }
                .into());
            }
            if dep == &step.step_id {
                return Err(ValidationError::CircularStepDependency {
                    step_ids: vec![step.step_id.clone()],
                }
                .into());
            }
            edges.entry(step.step_id.as_str()).or_default().push(dep);
        }
    }

    // Depth-first walk from every step; revisiting a node on the current
    // path means the dependency relation loops.
    for step in &definition.steps {
        let mut path = Vec::new();
        if let Some(cycle) = find_cycle(step.step_id.as_str(), &edges, &mut path) {
            return Err(ValidationError::CircularStepDependency { step_ids: cycle }.into());
        }
    }
    Ok(())
}

fn find_cycle<'a>(
    node: &'a str,
    edges: &HashMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    if let Some(pos) = path.iter().position(|n| *n == node) {
        let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    path.push(node);
    if let Some(deps) = edges.get(node) {
        for dep in deps {
            if let Some(cycle) = find_cycle(dep, edges, path) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_core::{CadreError, WorkflowStep};

    fn step(id: &str, deps: &[&str]) -> WorkflowStep {
        WorkflowStep::new(id, id, "noop")
            .with_dependencies(deps.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_valid_chain_accepted() {
        let def = WorkflowDefinition::new(
            "release",
            "",
            vec![
                step("build", &[]),
                step("test", &["build"]),
                step("publish", &["build", "test"]),
            ],
        );
        validate_definition(&def).unwrap();
    }

    #[test]
    fn test_empty_steps_rejected() {
        let def = WorkflowDefinition::new("empty", "", vec![]);
        assert!(matches!(
            validate_definition(&def).unwrap_err(),
            CadreError::Validation(ValidationError::RequiredFieldMissing { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let def = WorkflowDefinition::new("broken", "", vec![step("deploy", &["missing"])]);
        assert!(matches!(
            validate_definition(&def).unwrap_err(),
            CadreError::Validation(ValidationError::UnknownStepDependency { .. })
        ));
    }

    #[test]
    fn test_duplicate_step_id_rejected() {
        let def = WorkflowDefinition::new("dup", "", vec![step("a", &[]), step("a", &[])]);
        assert!(matches!(
            validate_definition(&def).unwrap_err(),
            CadreError::Validation(ValidationError::DuplicateStepId { .. })
        ));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let def = WorkflowDefinition::new("selfie", "", vec![step("a", &["a"])]);
        assert!(matches!(
            validate_definition(&def).unwrap_err(),
            CadreError::Validation(ValidationError::CircularStepDependency { .. })
        ));
    }

    #[test]
    fn test_cycle_rejected_at_registration() {
        let def = WorkflowDefinition::new(
            "loop",
            "",
            vec![step("a", &["c"]), step("b", &["a"]), step("c", &["b"])],
        );
        match validate_definition(&def).unwrap_err() {
            CadreError::Validation(ValidationError::CircularStepDependency { step_ids }) => {
                assert!(step_ids.len() >= 3);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }
}
