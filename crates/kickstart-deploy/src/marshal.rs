//! Process definition marshalling
//!
//! [`Bpmn20Marshaller`] writes a linear BPMN 2.0 process: a start event, the
//! tasks in declaration order, and an end event, with a simple left-to-right
//! diagram interchange section.

use kickstart_model::{Task, WorkflowDefinition};
use std::fmt::{Debug, Write};

use crate::error::{KickstartError, KickstartResult};
use crate::template::xml_escape;

/// Turns a workflow into process definition XML
pub trait ProcessMarshaller: Send + Sync + Debug {
    /// Marshal a workflow whose id and form keys are already assigned
    fn marshal(&self, workflow: &WorkflowDefinition) -> KickstartResult<String>;
}

const TASK_WIDTH: u32 = 105;
const TASK_HEIGHT: u32 = 55;
const EVENT_SIZE: u32 = 35;
const GAP: u32 = 50;
const LANE_Y: u32 = 100;

/// BPMN 2.0 marshaller with Activiti extension attributes
#[derive(Debug, Clone, Default)]
pub struct Bpmn20Marshaller;

impl Bpmn20Marshaller {
    pub fn new() -> Self {
        Self
    }
}

fn task_element_id(index: usize) -> String {
    format!("task{}", index + 1)
}

fn flow_id(index: usize) -> String {
    format!("flow{}", index + 1)
}

impl ProcessMarshaller for Bpmn20Marshaller {
    fn marshal(&self, workflow: &WorkflowDefinition) -> KickstartResult<String> {
        let process_id = workflow.id.as_deref().ok_or_else(|| {
            KickstartError::Render(format!("Workflow '{}' has no id", workflow.name))
        })?;

        // Element ids along the single path: start, tasks..., end
        let mut nodes = vec!["start".to_string()];
        nodes.extend((0..workflow.tasks.len()).map(task_element_id));
        nodes.push("end".to_string());

        let mut xml = String::new();

        writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
        writeln!(
            xml,
            r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL""#
        )?;
        writeln!(
            xml,
            r#"             xmlns:activiti="http://activiti.org/bpmn""#
        )?;
        writeln!(
            xml,
            r#"             xmlns:bpmndi="http://www.omg.org/spec/BPMN/20100524/DI""#
        )?;
        writeln!(
            xml,
            r#"             xmlns:omgdc="http://www.omg.org/spec/DD/20100524/DC""#
        )?;
        writeln!(
            xml,
            r#"             xmlns:omgdi="http://www.omg.org/spec/DD/20100524/DI""#
        )?;
        writeln!(
            xml,
            r#"             targetNamespace="http://activiti.org/bpmn20">"#
        )?;

        writeln!(
            xml,
            r#"  <process id="{}" name="{}">"#,
            xml_escape(process_id),
            xml_escape(&workflow.name)
        )?;
        if let Some(description) = &workflow.description {
            writeln!(xml, "    <documentation>{}</documentation>", xml_escape(description))?;
        }

        writeln!(xml, r#"    <startEvent id="start" activiti:formKey="ks:startTask" />"#)?;

        for (index, task) in workflow.tasks.iter().enumerate() {
            let id = task_element_id(index);
            let documentation = task
                .description()
                .map(|description| format!("      <documentation>{}</documentation>", xml_escape(description)));
            match task {
                Task::User(user_task) => {
                    write!(
                        xml,
                        r#"    <userTask id="{}" name="{}""#,
                        id,
                        xml_escape(&user_task.name)
                    )?;
                    if let Some(assignee) = &user_task.assignee {
                        write!(xml, r#" activiti:assignee="{}""#, xml_escape(assignee))?;
                    }
                    if let Some(form_key) = user_task.form.as_ref().and_then(|f| f.form_key.as_ref()) {
                        write!(xml, r#" activiti:formKey="{}""#, xml_escape(form_key))?;
                    }
                    match documentation {
                        Some(documentation) => {
                            writeln!(xml, ">")?;
                            writeln!(xml, "{}", documentation)?;
                            writeln!(xml, "    </userTask>")?;
                        }
                        None => writeln!(xml, " />")?,
                    }
                }
                Task::Script(script_task) => {
                    writeln!(
                        xml,
                        r#"    <scriptTask id="{}" name="{}" scriptFormat="{}">"#,
                        id,
                        xml_escape(&script_task.name),
                        xml_escape(&script_task.script_format)
                    )?;
                    if let Some(documentation) = documentation {
                        writeln!(xml, "{}", documentation)?;
                    }
                    writeln!(xml, "      <script>{}</script>", xml_escape(&script_task.script))?;
                    writeln!(xml, "    </scriptTask>")?;
                }
            }
        }

        writeln!(xml, r#"    <endEvent id="end" />"#)?;

        for (index, pair) in nodes.windows(2).enumerate() {
            writeln!(
                xml,
                r#"    <sequenceFlow id="{}" sourceRef="{}" targetRef="{}" />"#,
                flow_id(index),
                pair[0],
                pair[1]
            )?;
        }
        writeln!(xml, "  </process>")?;

        // ── Diagram interchange ──
        writeln!(
            xml,
            r#"  <bpmndi:BPMNDiagram id="BPMNDiagram_{}">"#,
            xml_escape(process_id)
        )?;
        writeln!(
            xml,
            r#"    <bpmndi:BPMNPlane bpmnElement="{}" id="BPMNPlane_{}">"#,
            xml_escape(process_id),
            xml_escape(process_id)
        )?;

        let mut bounds = Vec::with_capacity(nodes.len());
        let mut x = GAP;
        for (index, node) in nodes.iter().enumerate() {
            let is_event = index == 0 || index == nodes.len() - 1;
            let (width, height) = if is_event {
                (EVENT_SIZE, EVENT_SIZE)
            } else {
                (TASK_WIDTH, TASK_HEIGHT)
            };
            let y = LANE_Y + (TASK_HEIGHT - height) / 2;
            writeln!(
                xml,
                r#"      <bpmndi:BPMNShape bpmnElement="{0}" id="BPMNShape_{0}">"#,
                node
            )?;
            writeln!(
                xml,
                r#"        <omgdc:Bounds height="{}" width="{}" x="{}" y="{}" />"#,
                height, width, x, y
            )?;
            writeln!(xml, "      </bpmndi:BPMNShape>")?;
            bounds.push((x, width));
            x += width + GAP;
        }

        let mid_y = LANE_Y + TASK_HEIGHT / 2;
        for (index, pair) in bounds.windows(2).enumerate() {
            let (source_x, source_width) = pair[0];
            let (target_x, _) = pair[1];
            let id = flow_id(index);
            writeln!(
                xml,
                r#"      <bpmndi:BPMNEdge bpmnElement="{0}" id="BPMNEdge_{0}">"#,
                id
            )?;
            writeln!(
                xml,
                r#"        <omgdi:waypoint x="{}" y="{}" />"#,
                source_x + source_width,
                mid_y
            )?;
            writeln!(xml, r#"        <omgdi:waypoint x="{}" y="{}" />"#, target_x, mid_y)?;
            writeln!(xml, "      </bpmndi:BPMNEdge>")?;
        }

        writeln!(xml, "    </bpmndi:BPMNPlane>")?;
        writeln!(xml, "  </bpmndi:BPMNDiagram>")?;
        writeln!(xml, "</definitions>")?;

        Ok(xml)
    }
}
