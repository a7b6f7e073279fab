use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ModelError;

/// A workflow as drawn in the editor: a named, ordered list of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Deployment id, derived from the name when the workflow is deployed
    #[serde(default)]
    pub id: Option<String>,

    /// Human-readable name of the workflow
    pub name: String,

    /// Description of the workflow
    #[serde(default)]
    pub description: Option<String>,

    /// The tasks in this workflow, in execution order
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// A single task in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// A task performed by a person through a form
    User(UserTask),

    /// A task executed by the engine as a script
    Script(ScriptTask),
}

/// Discriminant of a [`Task`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    User,
    Script,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::User => write!(f, "user"),
            TaskKind::Script => write!(f, "script"),
        }
    }
}

/// Task assigned to a person, optionally with a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTask {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Account the task is assigned to
    #[serde(default)]
    pub assignee: Option<String>,

    /// Form shown when the task is worked on
    #[serde(default)]
    pub form: Option<FormDefinition>,
}

/// Task run by the engine itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptTask {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Script language, e.g. "javascript"
    #[serde(default = "default_script_format")]
    pub script_format: String,

    pub script: String,
}

fn default_script_format() -> String {
    "javascript".to_string()
}

/// Form attached to a user task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    /// Key binding the task to its generated form, assigned at deploy time
    #[serde(default)]
    pub form_key: Option<String>,

    /// Form fields, in on-screen order
    #[serde(default)]
    pub properties: Vec<FormProperty>,
}

/// A single field on a task form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormProperty {
    /// Label of the field as typed by the author
    pub name: String,

    /// Field type as authored ("text", "date" or "number")
    #[serde(rename = "type")]
    pub property_type: String,

    #[serde(default)]
    pub required: bool,
}

impl FormProperty {
    /// Create a new form property
    pub fn new(name: impl Into<String>, property_type: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            property_type: property_type.into(),
            required,
        }
    }
}

impl Task {
    /// Name of the task
    pub fn name(&self) -> &str {
        match self {
            Task::User(task) => &task.name,
            Task::Script(task) => &task.name,
        }
    }

    /// Description of the task, if any
    pub fn description(&self) -> Option<&str> {
        match self {
            Task::User(task) => task.description.as_deref(),
            Task::Script(task) => task.description.as_deref(),
        }
    }

    /// Kind of the task
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::User(_) => TaskKind::User,
            Task::Script(_) => TaskKind::Script,
        }
    }
}

impl UserTask {
    /// Create a user task without a form
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            assignee: None,
            form: None,
        }
    }

    /// Attach a form built from the given properties
    pub fn with_form(mut self, properties: Vec<FormProperty>) -> Self {
        self.form = Some(FormDefinition {
            form_key: None,
            properties,
        });
        self
    }
}

impl WorkflowDefinition {
    /// Create an empty workflow with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            tasks: Vec::new(),
        }
    }

    /// Append a task
    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Parse a workflow from its editor JSON source
    pub fn from_json(source: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Iterate over the user tasks
    pub fn user_tasks(&self) -> impl Iterator<Item = &UserTask> {
        self.tasks.iter().filter_map(|task| match task {
            Task::User(user_task) => Some(user_task),
            _ => None,
        })
    }

    /// Iterate mutably over the user tasks
    pub fn user_tasks_mut(&mut self) -> impl Iterator<Item = &mut UserTask> {
        self.tasks.iter_mut().filter_map(|task| match task {
            Task::User(user_task) => Some(user_task),
            _ => None,
        })
    }

    /// Validate the workflow definition
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::ValidationError(
                "Workflow must have a name".to_string(),
            ));
        }

        for (index, task) in self.tasks.iter().enumerate() {
            if task.name().trim().is_empty() {
                return Err(ModelError::ValidationError(format!(
                    "Task at position {} has no name",
                    index
                )));
            }
        }

        Ok(())
    }
}
