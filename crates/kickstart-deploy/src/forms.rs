//! Form artifact generation
//!
//! Turns the forms of user tasks into content-model type definitions and
//! form-config evaluator sections, assigning each form a fresh key.

use kickstart_model::{FormProperty, UserTask, WorkflowDefinition};
use std::sync::Arc;
use tracing::debug;

use crate::error::{KickstartError, KickstartResult};
use crate::naming::{friendly_name, new_form_key};
use crate::template::{TemplateFields, TemplateName, TemplateRegistry};

/// Content-model type of an authored property type
pub fn model_type(property_type: &str) -> Option<&'static str> {
    match property_type {
        "text" => Some("d:text"),
        "date" => Some("d:date"),
        "number" => Some("d:long"),
        _ => None,
    }
}

/// Generated fragments for one task, or combined for a whole workflow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormArtifacts {
    /// Content-model type definitions
    pub type_definition: String,
    /// Form-config evaluator sections
    pub form_config: String,
}

impl FormArtifacts {
    fn append(&mut self, other: FormArtifacts) {
        self.type_definition.push_str(&other.type_definition);
        self.form_config.push_str(&other.form_config);
    }
}

/// Builds form artifacts from user tasks
#[derive(Debug, Clone)]
pub struct FormArtifactGenerator {
    templates: Arc<TemplateRegistry>,
}

impl FormArtifactGenerator {
    /// Create a generator rendering with the given templates
    pub fn new(templates: Arc<TemplateRegistry>) -> Self {
        Self { templates }
    }

    /// Check that every property of the task's form has a mapped type
    pub fn validate(task: &UserTask) -> KickstartResult<()> {
        let Some(form) = &task.form else {
            return Ok(());
        };
        for property in &form.properties {
            if model_type(&property.property_type).is_none() {
                return Err(KickstartError::Validation(format!(
                    "Unsupported type '{}' for property '{}' of task '{}'",
                    property.property_type, property.name, task.name
                )));
            }
        }
        Ok(())
    }

    /// Generate the artifacts of one task and assign its form key
    ///
    /// A task without a form yields empty fragments and is left untouched.
    pub fn generate(&self, task: &mut UserTask) -> KickstartResult<FormArtifacts> {
        Self::validate(task)?;
        let Some(form) = task.form.as_mut() else {
            return Ok(FormArtifacts::default());
        };

        let form_key = new_form_key();
        debug!(task = %task.name, %form_key, properties = form.properties.len(), "Generating form artifacts");

        let mut properties = String::new();
        let mut visibility = String::new();
        let mut appearance = String::new();

        for property in &form.properties {
            properties.push_str(&self.render_property(property)?);
            let name = friendly_name(&property.name);
            visibility.push_str(&self.templates.render(
                TemplateName::FormConfigFieldVisibility,
                &TemplateFields::new().text("name", &name),
            )?);
            appearance.push_str(&self.templates.render(
                TemplateName::FormConfigField,
                &TemplateFields::new()
                    .text("name", &name)
                    .text("label", &property.name),
            )?);
        }

        if !properties.is_empty() {
            properties = format!("<properties>{}</properties>", properties);
        }

        let type_definition = self.templates.render(
            TemplateName::TaskModelType,
            &TemplateFields::new()
                .text("form_key", &form_key)
                .fragment("properties", properties),
        )?;
        let form_config = self.templates.render(
            TemplateName::FormConfigEvaluatorConfig,
            &TemplateFields::new()
                .text("form_key", &form_key)
                .fragment("visibility", visibility)
                .fragment("appearance", appearance),
        )?;

        form.form_key = Some(form_key);
        Ok(FormArtifacts {
            type_definition,
            form_config,
        })
    }

    /// Generate and concatenate the artifacts of every user task
    ///
    /// All forms are validated before any key is assigned.
    pub fn generate_all(&self, workflow: &mut WorkflowDefinition) -> KickstartResult<FormArtifacts> {
        for task in workflow.user_tasks() {
            Self::validate(task)?;
        }

        let mut combined = FormArtifacts::default();
        for task in workflow.user_tasks_mut() {
            combined.append(self.generate(task)?);
        }
        Ok(combined)
    }

    fn render_property(&self, property: &FormProperty) -> KickstartResult<String> {
        let mapped = model_type(&property.property_type).ok_or_else(|| {
            KickstartError::Validation(format!(
                "Unsupported type '{}' for property '{}'",
                property.property_type, property.name
            ))
        })?;
        Ok(self.templates.render(
            TemplateName::TaskModelProperty,
            &TemplateFields::new()
                .text("name", friendly_name(&property.name))
                .text("type", mapped)
                .text("mandatory", property.required),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kickstart_model::Task;

    fn generator() -> FormArtifactGenerator {
        FormArtifactGenerator::new(Arc::new(TemplateRegistry::builtin().unwrap()))
    }

    #[test]
    fn test_model_type_table() {
        assert_eq!(model_type("text"), Some("d:text"));
        assert_eq!(model_type("date"), Some("d:date"));
        assert_eq!(model_type("number"), Some("d:long"));
        assert_eq!(model_type("boolean"), None);
        assert_eq!(model_type("Text"), None);
    }

    #[test]
    fn test_task_without_form_is_noop() {
        let mut task = UserTask::new("Review");
        let artifacts = generator().generate(&mut task).unwrap();
        assert_eq!(artifacts, FormArtifacts::default());
        assert!(task.form.is_none());
    }

    #[test]
    fn test_properties_rendered_in_order() {
        let mut task = UserTask::new("Approve").with_form(vec![
            FormProperty::new("Customer Name", "text", true),
            FormProperty::new("Due Date", "date", false),
            FormProperty::new("Amount", "number", true),
        ]);

        let artifacts = generator().generate(&mut task).unwrap();
        let form_key = task.form.as_ref().unwrap().form_key.clone().unwrap();
        assert!(form_key.starts_with("ks:"));

        let types = &artifacts.type_definition;
        assert_eq!(types.matches("<type name=").count(), 1);
        assert!(types.contains(&format!("<type name=\"{}\">", form_key)));
        assert_eq!(types.matches("<properties>").count(), 1);
        assert_eq!(types.matches("<property ").count(), 3);

        let name = types.find("ks:customer_name").unwrap();
        let date = types.find("ks:due_date").unwrap();
        let amount = types.find("ks:amount").unwrap();
        assert!(name < date && date < amount);
        assert!(types.contains(
            "<property name=\"ks:customer_name\"><type>d:text</type><mandatory>true</mandatory></property>"
        ));
        assert!(types.contains(
            "<property name=\"ks:due_date\"><type>d:date</type><mandatory>false</mandatory></property>"
        ));
        assert!(types.contains("<type>d:long</type>"));

        let config = &artifacts.form_config;
        assert!(config.contains(&format!("condition=\"{}\"", form_key)));
        let show_name = config.find("<show id=\"ks:customer_name\" />").unwrap();
        let show_date = config.find("<show id=\"ks:due_date\" />").unwrap();
        let show_amount = config.find("<show id=\"ks:amount\" />").unwrap();
        assert!(show_name < show_date && show_date < show_amount);

        let field_name = config.find("<field id=\"ks:customer_name\" label=\"Customer Name\" />").unwrap();
        let field_date = config.find("<field id=\"ks:due_date\" label=\"Due Date\" />").unwrap();
        let field_amount = config.find("<field id=\"ks:amount\" label=\"Amount\" />").unwrap();
        assert!(field_name < field_date && field_date < field_amount);
    }

    #[test]
    fn test_empty_form_gets_key_but_no_properties() {
        let mut task = UserTask::new("Acknowledge").with_form(vec![]);
        let artifacts = generator().generate(&mut task).unwrap();

        assert!(task.form.unwrap().form_key.is_some());
        assert!(!artifacts.type_definition.contains("<properties>"));
        assert!(artifacts.type_definition.contains("<type name=\"ks:"));
        assert!(!artifacts.form_config.contains("ks:customer"));
    }

    #[test]
    fn test_unmapped_type_is_rejected_without_mutation() {
        let mut workflow = WorkflowDefinition::new("Odd")
            .with_task(Task::User(
                UserTask::new("First").with_form(vec![FormProperty::new("Name", "text", false)]),
            ))
            .with_task(Task::User(
                UserTask::new("Second").with_form(vec![FormProperty::new("Flag", "boolean", false)]),
            ));

        let err = generator().generate_all(&mut workflow).unwrap_err();
        match err {
            KickstartError::Validation(msg) => {
                assert!(msg.contains("boolean"));
                assert!(msg.contains("Flag"));
                assert!(msg.contains("Second"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(workflow
            .user_tasks()
            .all(|task| task.form.as_ref().unwrap().form_key.is_none()));
    }

    #[test]
    fn test_generate_all_concatenates_and_rekeys() {
        let mut workflow = WorkflowDefinition::new("Two Steps")
            .with_task(Task::User(
                UserTask::new("One").with_form(vec![FormProperty::new("A", "text", false)]),
            ))
            .with_task(Task::User(UserTask::new("Plain")))
            .with_task(Task::User(
                UserTask::new("Two").with_form(vec![FormProperty::new("B", "number", false)]),
            ));

        let generator = generator();
        let first = generator.generate_all(&mut workflow).unwrap();
        assert_eq!(first.type_definition.matches("<type name=").count(), 2);
        assert_eq!(first.form_config.matches("evaluator=\"task-type\"").count(), 2);
        let first_keys: Vec<_> = workflow
            .user_tasks()
            .filter_map(|task| task.form.as_ref())
            .map(|form| form.form_key.clone().unwrap())
            .collect();

        generator.generate_all(&mut workflow).unwrap();
        let second_keys: Vec<_> = workflow
            .user_tasks()
            .filter_map(|task| task.form.as_ref())
            .map(|form| form.form_key.clone().unwrap())
            .collect();

        assert_eq!(first_keys.len(), 2);
        assert_ne!(first_keys, second_keys);
    }
}
