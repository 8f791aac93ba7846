use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("ID {id} redefined! IDs must be unique across the whole configuration")]
    DuplicateId { id: String },

    #[error("a registry entry named '{key}' already exists in the {registry} registry")]
    DuplicateRegistryKey { registry: String, key: String },

    #[error("{}", unfinished_message(.components, .coroutines))]
    GenerationUnfinished {
        components: Vec<String>,
        coroutines: Vec<String>,
    },

    #[error(
        "circular dependency: task(s) [{}] are waiting on ID(s) [{}] that nothing registers",
        .tasks.join(", "),
        .unresolved.join(", ")
    )]
    CircularDependency {
        tasks: Vec<String>,
        unresolved: Vec<String>,
    },

    #[error("code generation did not settle after {steps} scheduler steps")]
    SchedulerStuck { steps: usize },

    #[error("ID {id} cannot be used as a value, did you forget to register the variable?")]
    IdAsValue { id: String },

    #[error(
        "library {name} is requested with conflicting versions '{existing}' and '{requested}'"
    )]
    LibraryVersionConflict {
        name: String,
        existing: String,
        requested: String,
    },
}

/// Names whichever leftover sets are non-empty, components first.
fn unfinished_message(components: &[String], coroutines: &[String]) -> String {
    let mut parts = Vec::new();
    if !components.is_empty() {
        parts.push(format!(
            "component(s) {} were declared but never registered",
            components.join(", ")
        ));
    }
    if !coroutines.is_empty() {
        parts.push(format!(
            "coroutine(s) [{}] were created but never run to completion, did you forget to await?",
            coroutines.join(", ")
        ));
    }
    parts.join("; ")
}

pub type CodegenResult<T> = anyhow::Result<T>;
