//! Dependency graph construction and wave grouping.
//!
//! Stages are grouped with Kahn's algorithm into waves: every stage in a
//! wave has all of its dependencies in earlier waves, so a wave's members
//! can run concurrently. All validation happens here, before anything runs.

use crate::context::ContextField;
use crate::errors::{ContractErrorInfo, CycleDetectedError, PipelineError, PipelineValidationError};
use crate::stages::Stage;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A validated, wave-ordered execution plan.
pub struct ExecutionPlan {
    waves: Vec<Vec<Arc<dyn Stage>>>,
}

impl ExecutionPlan {
    /// Builds the plan for a stage set.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Validation`] for duplicate stage names, unknown
    ///   dependencies, or same-wave stages that declare the same output.
    /// - [`PipelineError::CycleDetected`] if the dependencies form a cycle.
    pub fn build(stages: &[Arc<dyn Stage>]) -> Result<Self, PipelineError> {
        let index = index_stages(stages)?;

        let deps: Vec<HashSet<usize>> = stages
            .iter()
            .map(|stage| resolve_dependencies(stage.as_ref(), &index))
            .collect::<Result<_, _>>()?;

        let mut in_degree: Vec<usize> = deps.iter().map(HashSet::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); stages.len()];
        for (child, parents) in deps.iter().enumerate() {
            for &parent in parents {
                dependents[parent].push(child);
            }
        }

        let mut queue: Vec<usize> = (0..stages.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut wave_indices: Vec<Vec<usize>> = Vec::new();

        while !queue.is_empty() {
            let mut next = Vec::new();
            for &node in &queue {
                for &child in &dependents[node] {
                    in_degree[child] -= 1;
                    if in_degree[child] == 0 {
                        next.push(child);
                    }
                }
            }
            next.sort_unstable();
            wave_indices.push(std::mem::replace(&mut queue, next));
        }

        if in_degree.iter().any(|&d| d > 0) {
            let remaining: HashSet<usize> = (0..stages.len()).filter(|&i| in_degree[i] > 0).collect();
            let cycle = find_cycle(&deps, &remaining)
                .into_iter()
                .map(|i| stages[i].name().to_string())
                .collect();
            return Err(CycleDetectedError::new(cycle).into());
        }

        for wave in &wave_indices {
            check_write_conflicts(stages, wave)?;
        }

        Ok(Self {
            waves: wave_indices
                .into_iter()
                .map(|wave| wave.into_iter().map(|i| stages[i].clone()).collect())
                .collect(),
        })
    }

    /// Returns the waves in execution order.
    #[must_use]
    pub fn waves(&self) -> &[Vec<Arc<dyn Stage>>] {
        &self.waves
    }

    /// Returns the stage names of each wave.
    #[must_use]
    pub fn wave_names(&self) -> Vec<Vec<String>> {
        self.waves
            .iter()
            .map(|wave| wave.iter().map(|s| s.name().to_string()).collect())
            .collect()
    }

    /// Returns the number of stages in the plan.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }
}

impl fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("waves", &self.wave_names())
            .finish()
    }
}

fn index_stages(stages: &[Arc<dyn Stage>]) -> Result<HashMap<&str, usize>, PipelineValidationError> {
    let mut index = HashMap::with_capacity(stages.len());
    for (i, stage) in stages.iter().enumerate() {
        if index.insert(stage.name(), i).is_some() {
            return Err(PipelineValidationError::new(format!(
                "Stage name '{}' is used more than once",
                stage.name()
            ))
            .with_stages(vec![stage.name().to_string()])
            .with_error_info(
                ContractErrorInfo::new("GRAPH-DUPLICATE", "Stage names must be unique")
                    .with_fix_hint("Rename one of the stages."),
            ));
        }
    }
    Ok(index)
}

fn resolve_dependencies(
    stage: &dyn Stage,
    index: &HashMap<&str, usize>,
) -> Result<HashSet<usize>, PipelineValidationError> {
    stage
        .dependencies()
        .iter()
        .map(|dep| {
            index.get(dep.as_str()).copied().ok_or_else(|| {
                PipelineValidationError::new(format!(
                    "Stage '{}' depends on unknown stage '{}'",
                    stage.name(),
                    dep
                ))
                .with_stages(vec![stage.name().to_string(), dep.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "GRAPH-MISSING-DEP",
                        format!("Dependency '{dep}' not found"),
                    )
                    .with_fix_hint("Add the dependency to the stage set or remove the reference."),
                )
            })
        })
        .collect()
}

/// Finds one cycle among the nodes left with unresolved dependencies.
fn find_cycle(deps: &[HashSet<usize>], remaining: &HashSet<usize>) -> Vec<usize> {
    fn visit(
        node: usize,
        deps: &[HashSet<usize>],
        remaining: &HashSet<usize>,
        visited: &mut HashSet<usize>,
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        if let Some(start) = path.iter().position(|&n| n == node) {
            let mut cycle = path[start..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }
        if !visited.insert(node) {
            return None;
        }

        path.push(node);
        let mut parents: Vec<usize> = deps[node]
            .iter()
            .copied()
            .filter(|p| remaining.contains(p))
            .collect();
        parents.sort_unstable();
        for parent in parents {
            if let Some(cycle) = visit(parent, deps, remaining, visited, path) {
                return Some(cycle);
            }
        }
        path.pop();
        None
    }

    let mut starts: Vec<usize> = remaining.iter().copied().collect();
    starts.sort_unstable();

    let mut visited = HashSet::new();
    for start in starts {
        let mut path = Vec::new();
        if let Some(cycle) = visit(start, deps, remaining, &mut visited, &mut path) {
            return cycle;
        }
    }
    // Every remaining node waits on another remaining node, so a cycle exists.
    Vec::new()
}

fn check_write_conflicts(
    stages: &[Arc<dyn Stage>],
    wave: &[usize],
) -> Result<(), PipelineValidationError> {
    let mut writers: HashMap<ContextField, &str> = HashMap::new();
    for &i in wave {
        let stage = &stages[i];
        for field in stage.produces() {
            if let Some(other) = writers.insert(*field, stage.name()) {
                return Err(PipelineValidationError::new(format!(
                    "Stages '{}' and '{}' run concurrently and both write '{}'",
                    other,
                    stage.name(),
                    field
                ))
                .with_stages(vec![other.to_string(), stage.name().to_string()])
                .with_error_info(
                    ContractErrorInfo::new("GRAPH-WRITE-CONFLICT", "Concurrent stages write the same field")
                        .with_context_entry("field", field.as_str())
                        .with_fix_hint("Add a dependency between the stages so they run in order."),
                ));
            }
        }
    }
    Ok(())
}
