// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Objective Decomposition
//!
//! Expands an objective that arrives without a task list into a linear chain
//! of tasks chosen by [`SwarmStrategy`].
//!
//! | Strategy | Chain |
//! |----------|-------|
//! | research | research → analysis → documentation |
//! | development | coordination → coding → testing → review → documentation |
//! | analysis | research → analysis → documentation |
//! | testing | coordination → testing → review |
//! | optimization | analysis → coding → testing |
//! | maintenance | analysis → coding → testing → documentation |
//!
//! `auto` is resolved from keywords in the objective description before the
//! table is consulted.

use hivemind_core::domain::objective::{ObjectiveSpec, SwarmStrategy};
use hivemind_core::domain::task::{PlannedTask, TaskSpec, TaskType};

const KEYWORDS: &[(SwarmStrategy, &[&str])] = &[
    (
        SwarmStrategy::Optimization,
        &["optimize", "optimise", "performance", "speed up", "faster", "latency"],
    ),
    (
        SwarmStrategy::Maintenance,
        &["maintain", "maintenance", "upgrade", "refactor", "cleanup", "clean up", "migrate"],
    ),
    (
        SwarmStrategy::Testing,
        &["test", "verify", "validate", "coverage", "qa"],
    ),
    (
        SwarmStrategy::Research,
        &["research", "investigate", "explore", "survey", "find out"],
    ),
    (
        SwarmStrategy::Analysis,
        &["analyze", "analyse", "analysis", "assess", "evaluate", "audit"],
    ),
    (
        SwarmStrategy::Development,
        &["build", "implement", "develop", "create", "write", "add"],
    ),
];

/// Infer a concrete strategy from free text. Falls back to development.
pub fn infer_strategy(description: &str) -> SwarmStrategy {
    let text = description.to_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords.iter().any(|keyword| {
                if keyword.contains(' ') {
                    text.contains(keyword)
                } else {
                    words.iter().any(|word| word.starts_with(keyword))
                }
            })
        })
        .map(|(strategy, _)| *strategy)
        .unwrap_or(SwarmStrategy::Development)
}

/// Resolve `auto` against the description; concrete strategies pass through.
pub fn resolve_strategy(strategy: SwarmStrategy, description: &str) -> SwarmStrategy {
    match strategy {
        SwarmStrategy::Auto => infer_strategy(description),
        concrete => concrete,
    }
}

pub fn task_chain(strategy: SwarmStrategy) -> Vec<TaskType> {
    use TaskType::*;
    match strategy {
        SwarmStrategy::Research | SwarmStrategy::Analysis => {
            vec![Research, Analysis, Documentation]
        }
        SwarmStrategy::Development | SwarmStrategy::Auto => {
            vec![Coordination, Coding, Testing, Review, Documentation]
        }
        SwarmStrategy::Testing => vec![Coordination, Testing, Review],
        SwarmStrategy::Optimization => vec![Analysis, Coding, Testing],
        SwarmStrategy::Maintenance => vec![Analysis, Coding, Testing, Documentation],
    }
}

/// Capability tag a decomposed task of this type asks for.
pub fn capabilities_for(task_type: &TaskType) -> Vec<String> {
    let tag = match task_type {
        TaskType::Research => "research",
        TaskType::Analysis => "analysis",
        TaskType::Coding => "code-generation",
        TaskType::Testing => "testing",
        TaskType::Review => "code-review",
        TaskType::Documentation => "documentation",
        TaskType::Coordination | TaskType::Custom(_) => return Vec::new(),
    };
    vec![tag.to_string()]
}

/// Build the planned tasks for `spec` under an already-resolved strategy.
pub fn decompose(spec: &ObjectiveSpec, strategy: SwarmStrategy) -> Vec<PlannedTask> {
    let mut planned: Vec<PlannedTask> = Vec::new();
    for task_type in task_chain(strategy) {
        let key = task_type.as_str().to_string();
        let mut task_spec = TaskSpec::new(task_type.clone(), format!("{} ({})", spec.name, key))
            .with_description(spec.description.clone())
            .with_instructions(format!("{key} step of objective '{}'", spec.name));
        for capability in capabilities_for(&task_type) {
            task_spec = task_spec.with_capability(capability);
        }

        let mut step = PlannedTask::new(key, task_spec);
        if let Some(previous) = planned.last() {
            step = step.after(previous.key.clone());
        }
        planned.push(step);
    }
    planned
}
