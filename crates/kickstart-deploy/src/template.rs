//! Named-field template rendering
//!
//! Templates are plain text with `{{field}}` placeholders. Every placeholder
//! must be supplied and every supplied field must be used, so a template and
//! its caller cannot silently drift apart.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while loading or rendering templates
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template {template} has an unterminated placeholder at byte {offset}")]
    Unterminated { template: String, offset: usize },

    #[error("Template {template} has an invalid placeholder name '{name}'")]
    InvalidPlaceholder { template: String, name: String },

    #[error("Template {template} needs field '{field}' which was not supplied")]
    MissingField { template: String, field: String },

    #[error("Field '{field}' is not used by template {template}")]
    UnusedField { template: String, field: String },

    #[error("Template file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read template file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// A value substituted into a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    /// Plain text, XML-escaped on substitution
    Text(String),
    /// Already rendered XML, inserted verbatim
    Fragment(String),
}

impl TemplateValue {
    fn render_into(&self, out: &mut String) {
        match self {
            TemplateValue::Text(text) => out.push_str(&xml_escape(text)),
            TemplateValue::Fragment(fragment) => out.push_str(fragment),
        }
    }
}

/// Field values for one render call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFields {
    values: BTreeMap<String, TemplateValue>,
}

impl TemplateFields {
    /// Create an empty field set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field
    pub fn text(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.values
            .insert(name.into(), TemplateValue::Text(value.to_string()));
        self
    }

    /// Add a pre-rendered fragment field
    pub fn fragment(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values
            .insert(name.into(), TemplateValue::Fragment(value.into()));
        self
    }

    fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.values.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
    fields: BTreeSet<String>,
}

impl Template {
    /// Parse template source text
    pub fn parse(name: impl Into<String>, source: &str) -> TemplateResult<Self> {
        let name = name.into();
        let mut segments = Vec::new();
        let mut fields = BTreeSet::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open.find("}}").ok_or_else(|| TemplateError::Unterminated {
                template: name.clone(),
                offset: offset + start,
            })?;

            let field = after_open[..end].trim();
            if field.is_empty()
                || !field
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(TemplateError::InvalidPlaceholder {
                    template: name,
                    name: field.to_string(),
                });
            }

            fields.insert(field.to_string());
            segments.push(Segment::Field(field.to_string()));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            name,
            segments,
            fields,
        })
    }

    /// Template name, used in error messages
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the placeholders this template uses
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Substitute every placeholder
    pub fn render(&self, values: &TemplateFields) -> TemplateResult<String> {
        if let Some(field) = self.fields.iter().find(|f| values.get(f).is_none()) {
            return Err(TemplateError::MissingField {
                template: self.name.clone(),
                field: field.clone(),
            });
        }
        if let Some(field) = values.values.keys().find(|f| !self.fields.contains(*f)) {
            return Err(TemplateError::UnusedField {
                template: self.name.clone(),
                field: field.clone(),
            });
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => {
                    if let Some(value) = values.get(field) {
                        value.render_into(&mut out);
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Escape text for use in XML content and attribute values
pub fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// The templates a deployment needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateName {
    TaskModel,
    TaskModelType,
    TaskModelProperty,
    FormConfig,
    FormConfigEvaluatorConfig,
    FormConfigField,
    FormConfigFieldVisibility,
}

impl TemplateName {
    /// All template names
    pub const ALL: [TemplateName; 7] = [
        TemplateName::TaskModel,
        TemplateName::TaskModelType,
        TemplateName::TaskModelProperty,
        TemplateName::FormConfig,
        TemplateName::FormConfigEvaluatorConfig,
        TemplateName::FormConfigField,
        TemplateName::FormConfigFieldVisibility,
    ];

    /// File name inside a template directory
    pub fn file_name(self) -> &'static str {
        match self {
            TemplateName::TaskModel => "task-model.xml",
            TemplateName::TaskModelType => "task-model-type.xml",
            TemplateName::TaskModelProperty => "task-model-property.xml",
            TemplateName::FormConfig => "form-config.xml",
            TemplateName::FormConfigEvaluatorConfig => "form-config-evaluator-config.xml",
            TemplateName::FormConfigField => "form-config-field.xml",
            TemplateName::FormConfigFieldVisibility => "form-config-field-visibility.xml",
        }
    }

    fn builtin_source(self) -> &'static str {
        match self {
            TemplateName::TaskModel => include_str!("../templates/task-model.xml"),
            TemplateName::TaskModelType => include_str!("../templates/task-model-type.xml"),
            TemplateName::TaskModelProperty => include_str!("../templates/task-model-property.xml"),
            TemplateName::FormConfig => include_str!("../templates/form-config.xml"),
            TemplateName::FormConfigEvaluatorConfig => {
                include_str!("../templates/form-config-evaluator-config.xml")
            }
            TemplateName::FormConfigField => include_str!("../templates/form-config-field.xml"),
            TemplateName::FormConfigFieldVisibility => {
                include_str!("../templates/form-config-field-visibility.xml")
            }
        }
    }
}

/// The full set of parsed templates, loaded once at startup
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<TemplateName, Template>,
}

impl TemplateRegistry {
    /// Load the templates compiled into the binary
    pub fn builtin() -> TemplateResult<Self> {
        let mut templates = HashMap::new();
        for name in TemplateName::ALL {
            templates.insert(name, Template::parse(name.file_name(), name.builtin_source())?);
        }
        Ok(Self { templates })
    }

    /// Load every template from a directory
    ///
    /// A missing file is an error; there is no fallback to the built-in set.
    pub fn from_dir(dir: &Path) -> TemplateResult<Self> {
        info!(dir = %dir.display(), "Loading templates from directory");
        let mut templates = HashMap::new();
        for name in TemplateName::ALL {
            let path = dir.join(name.file_name());
            let source = std::fs::read_to_string(&path).map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    TemplateError::NotFound(path.clone())
                } else {
                    TemplateError::Io {
                        path: path.clone(),
                        source,
                    }
                }
            })?;
            debug!(path = %path.display(), "Loaded template");
            templates.insert(name, Template::parse(name.file_name(), &source)?);
        }
        Ok(Self { templates })
    }

    /// Load from `dir` when given, the built-in set otherwise
    pub fn load(dir: Option<&Path>) -> TemplateResult<Self> {
        match dir {
            Some(dir) => Self::from_dir(dir),
            None => Self::builtin(),
        }
    }

    /// Get a template
    pub fn get(&self, name: TemplateName) -> &Template {
        // Both constructors insert every name
        &self.templates[&name]
    }

    /// Render a template
    pub fn render(&self, name: TemplateName, fields: &TemplateFields) -> TemplateResult<String> {
        self.get(name).render(fields)
    }
}
