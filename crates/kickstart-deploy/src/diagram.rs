//! Process diagram rendering

use kickstart_model::WorkflowDefinition;

use crate::error::{KickstartError, KickstartResult};

/// Leading bytes of every PNG file
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Whether the bytes start with the PNG signature
pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
}

/// Produces the PNG diagram of a workflow
///
/// Called after form keys are assigned, so implementations may annotate tasks
/// with their forms.
pub trait DiagramRenderer: Send + Sync {
    fn render(&self, workflow: &WorkflowDefinition) -> KickstartResult<Vec<u8>>;
}

/// A diagram drawn by the editor and sent along with the workflow
#[derive(Debug, Clone)]
pub struct PrerenderedDiagram {
    png: Vec<u8>,
}

impl PrerenderedDiagram {
    pub fn new(png: Vec<u8>) -> Self {
        Self { png }
    }
}

impl DiagramRenderer for PrerenderedDiagram {
    fn render(&self, workflow: &WorkflowDefinition) -> KickstartResult<Vec<u8>> {
        if !is_png(&self.png) {
            return Err(KickstartError::Validation(format!(
                "Diagram of workflow '{}' is not a PNG image",
                workflow.name
            )));
        }
        Ok(self.png.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prerendered_png() {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend_from_slice(b"IHDR");
        let diagram = PrerenderedDiagram::new(png.clone());
        assert_eq!(diagram.render(&WorkflowDefinition::new("x")).unwrap(), png);
    }

    #[test]
    fn test_rejects_non_png() {
        let diagram = PrerenderedDiagram::new(b"GIF89a".to_vec());
        assert!(matches!(
            diagram.render(&WorkflowDefinition::new("x")),
            Err(KickstartError::Validation(_))
        ));
        assert!(PrerenderedDiagram::new(Vec::new())
            .render(&WorkflowDefinition::new("x"))
            .is_err());
    }
}
