//! Prompt templates for each pipeline stage and for single-task intents.
//!
//! Every builder takes an optional caller-supplied instruction which is
//! appended verbatim under an "Additional instructions" heading.

use crate::chunk::Chunk;

use super::intent::Intent;

pub const ROLE_PROMPT: &str = "\
You are a senior software architect helping to migrate a legacy codebase to a \
microservice architecture. Over the next messages you will receive the \
repository in numbered chunks. Analyze each chunk for domain concepts, \
dependencies between components, data ownership and coupling hot spots. \
After the last chunk you will be asked to consolidate your findings into a \
migration plan, then to propose concrete refactorings, then to review them. \
Acknowledge this role briefly.";

const ANALYSIS_INSTRUCTIONS: &str = "\
Analyze this part of the repository. List the components it contains, their \
responsibilities, the dependencies they have on other code, and anything that \
would complicate extracting them into separate services.";

const PLANNING_INSTRUCTIONS: &str = "\
Consolidate the chunk analyses below into a single migration plan: the target \
services and their boundaries, the data each service owns, the APIs between \
them, and an ordered sequence of migration steps.";

const REFACTOR_INSTRUCTIONS: &str = "\
Using the migration plan below, propose the concrete refactorings for the \
first migration steps: which classes move where, which interfaces are \
introduced, and example code for the new service boundaries.";

const REVIEW_INSTRUCTIONS: &str = "\
Review the proposed refactorings below. Point out risks, missing steps, \
behavioral changes and testing needs, and finish with a short summary of the \
final migration plan.";

fn with_custom(prompt: String, custom: Option<&str>) -> String {
    match custom.map(str::trim).filter(|c| !c.is_empty()) {
        Some(custom) => format!("{}\n\nAdditional instructions:\n{}", prompt, custom),
        None => prompt,
    }
}

pub fn role_prompt(custom: Option<&str>) -> String {
    with_custom(ROLE_PROMPT.to_string(), custom)
}

pub fn analysis_prompt(chunk: &Chunk, custom: Option<&str>) -> String {
    let prompt = format!(
        "Repository chunk {} of {} (files: {}).\n\n{}\n\n---\n{}",
        chunk.index + 1,
        chunk.total,
        chunk.documents.join(", "),
        ANALYSIS_INSTRUCTIONS,
        chunk.content
    );
    with_custom(prompt, custom)
}

pub fn planning_prompt(analyses: &str, custom: Option<&str>) -> String {
    with_custom(
        format!("{}\n\n---\n{}", PLANNING_INSTRUCTIONS, analyses),
        custom,
    )
}

pub fn refactor_prompt(plan: &str, custom: Option<&str>) -> String {
    with_custom(format!("{}\n\n---\n{}", REFACTOR_INSTRUCTIONS, plan), custom)
}

pub fn review_prompt(refactorings: &str, custom: Option<&str>) -> String {
    with_custom(
        format!("{}\n\n---\n{}", REVIEW_INSTRUCTIONS, refactorings),
        custom,
    )
}

/// Single-task prompt for a classified intent.
pub fn task_prompt(intent: Intent, task: &str) -> String {
    match intent {
        Intent::Microservice => format!(
            "You are a software architect. Propose a microservice-oriented design for the \
             following request: service boundaries, APIs, data ownership and a migration \
             path.\n\nRequest: {}",
            task
        ),
        Intent::Generate => format!(
            "You are an expert programmer. Write complete, idiomatic code for the following \
             request and briefly explain the key decisions.\n\nRequest: {}",
            task
        ),
        Intent::General => task.to_string(),
    }
}
