//! Kickstart Deploy
//!
//! Deploys kickstart workflows into a content repository watched by a
//! workflow engine, and manages their lifecycle afterwards.
//!
//! A deployment generates a content model and a form configuration from the
//! forms of the workflow's user tasks, then uploads the model, the form
//! configuration, the diagram, the JSON source and finally the process
//! definition. Deletion drains running instances before removing anything.

pub mod config;
pub mod diagram;
pub mod error;
pub mod forms;
pub mod marshal;
pub mod naming;
pub mod orchestrator;
pub mod report;
pub mod template;

// Re-export key types
pub use config::DeployConfig;
pub use diagram::{DiagramRenderer, PrerenderedDiagram};
pub use error::{KickstartError, KickstartResult};
pub use forms::{FormArtifactGenerator, FormArtifacts};
pub use marshal::{Bpmn20Marshaller, ProcessMarshaller};
pub use orchestrator::{KickstartService, MetadataKey, METADATA_JSON_SOURCE};
pub use report::{DeleteReport, DeployReport, DeployWarning, RedeployReport, RemovalFailure};
pub use template::{TemplateError, TemplateRegistry};
