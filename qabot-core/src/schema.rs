//! # Agent prompts
//!
//! The system and user prompts that brief a model on the tool set when it
//! drives the run, rendered from the declared tool contracts.

use crate::Tool;

/// Everything a model needs to drive a run: the tools and the rules
#[derive(Debug, Clone)]
pub struct AgentSchema {
    pub tools: Vec<Tool>,
    pub max_steps: usize,
}

impl AgentSchema {
    pub fn new(max_steps: usize) -> Self {
        Self {
            tools: Tool::ALL.to_vec(),
            max_steps,
        }
    }

    pub fn system_prompt(&self) -> String {
        let mut out = String::new();

        out.push_str("You are a QA automation engineer. Turn the user's software requirement into a QA test report using your tools.\n\n");
        out.push_str("## Tools (call each exactly once, in this order)\n\n");
        for (i, tool) in self.tools.iter().enumerate() {
            let def = tool.definition();
            out.push_str(&format!("{}. **{}**: {}\n", i + 1, def.name, def.description));
        }

        out.push_str("\n## Rules\n\n");
        out.push_str(&format!(
            "- Call {} with the requirement text first.\n",
            Tool::ParseRequirement
        ));
        out.push_str(&format!(
            "- Then call {} with a short action phrase (e.g. 'reset password') and the expected outcome (e.g. 'email link sent').\n",
            Tool::GenerateTestCases
        ));
        out.push_str(&format!(
            "- Finally call {}. Its output is the final answer; do not rewrite it.\n",
            Tool::FormatReport
        ));
        out.push_str("- Tools that are repeated or called out of order are rejected.\n");
        out.push_str(&format!(
            "- You have at most {} turns.\n",
            self.max_steps
        ));

        out
    }

    pub fn user_prompt(&self, requirement: &str) -> String {
        format!("Requirement:\n{}", requirement)
    }
}
