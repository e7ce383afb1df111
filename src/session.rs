//! Per-session conversation state, owned exclusively by the turn loop.

use std::collections::BTreeMap;

use crate::command::AgentCommand;
use crate::fields::{FieldValue, InputField};
use crate::template::Template;

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Command that owns the conversation across turns.
    pub command_in_progress: AgentCommand,
    pub fulfillment: Option<FulfillmentState>,
}

impl SessionState {
    /// Back to "no command in progress", dropping any dialogue.
    pub fn reset(&mut self) {
        self.command_in_progress = AgentCommand::FindCommand;
        self.fulfillment = None;
    }
}

/// Input collection for one template.
///
/// `cursor` stays in `-1..=input_fields.len()`; `-1` means nothing has been
/// asked yet and `input_fields.len()` means every field has been handled.
#[derive(Debug, Clone)]
pub struct FulfillmentState {
    pub template: Template,
    pub input_fields: Vec<InputField>,
    pub cursor: isize,
    pub collected_values: BTreeMap<String, FieldValue>,
    pub confirmation_pending: bool,
}

impl FulfillmentState {
    pub fn new(template: Template, input_fields: Vec<InputField>) -> Self {
        Self {
            template,
            input_fields,
            cursor: -1,
            collected_values: BTreeMap::new(),
            confirmation_pending: false,
        }
    }

    fn field_count(&self) -> isize {
        self.input_fields.len() as isize
    }

    /// Field under the cursor, if the cursor is on one.
    pub fn current_field(&self) -> Option<&InputField> {
        usize::try_from(self.cursor)
            .ok()
            .and_then(|i| self.input_fields.get(i))
    }

    pub fn is_first_field(&self) -> bool {
        self.cursor < 1
    }

    pub fn is_last_field(&self) -> bool {
        self.cursor == self.field_count() - 1
    }

    /// Move to the next field. Returns `true` once every field has been handled.
    pub fn advance(&mut self) -> bool {
        self.cursor = (self.cursor + 1).min(self.field_count());
        self.cursor == self.field_count()
    }

    pub fn step_back(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
        }
    }

    /// Collected values in field declaration order, with display titles.
    pub fn summary_lines(&self) -> Vec<(&str, &FieldValue)> {
        self.input_fields
            .iter()
            .filter_map(|f| {
                self.collected_values
                    .get(&f.name)
                    .map(|v| (f.display_title(), v))
            })
            .collect()
    }

    /// Collected values as the JSON document sent to the platform.
    pub fn input_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.collected_values)
    }
}
