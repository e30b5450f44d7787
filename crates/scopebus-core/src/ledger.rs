//! Prompt ledger: inject each distinct text once

use crate::types::{Interpolation, PipelineOutput, Prompt, Transition};
use tracing::debug;

/// Tracks the last injected text so repeated values produce no output.
///
/// One ledger belongs to one pipeline instance for its whole lifetime.
#[derive(Debug, Clone, Default)]
pub struct PromptLedger {
    last_injected: String,
}

impl PromptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_injected(&self) -> &str {
        &self.last_injected
    }

    /// Inject `text` into `output` unless it is empty or was the last text
    /// injected. Returns whether `output` was changed.
    ///
    /// With `transition_steps > 0` the prompt becomes the sole target of a
    /// transition, replacing any transition already on `output`. Otherwise it
    /// is appended after the prompts already present.
    pub fn inject_if_new(
        &mut self,
        output: &mut PipelineOutput,
        text: &str,
        weight: f64,
        transition_steps: u32,
        interpolation: Interpolation,
    ) -> bool {
        if text.is_empty() || text == self.last_injected {
            return false;
        }

        self.last_injected = text.to_string();
        let prompt = Prompt::new(text, weight);

        if transition_steps > 0 {
            debug!(steps = transition_steps, %interpolation, "injecting prompt transition");
            output.transition = Some(Transition {
                target_prompts: vec![prompt],
                step_count: transition_steps,
                interpolation,
            });
        } else {
            debug!(weight, "appending prompt");
            output.prompts.push(prompt);
        }
        true
    }
}
