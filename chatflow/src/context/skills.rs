//! Skills: pre-defined helper functions generated code may call.

use crate::errors::{ChatflowError, Result};
use serde::{Deserialize, Serialize};

/// A named helper function exposed to generated code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    /// Function name.
    pub name: String,
    /// What the function does.
    pub description: String,
    /// Source of the function.
    pub code: String,
}

impl Skill {
    /// Creates a skill.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            code: code.into(),
        }
    }
}

/// Registry of skills for one agent.
#[derive(Debug, Clone, Default)]
pub struct SkillsManager {
    skills: Vec<Skill>,
}

impl SkillsManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers skills.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a name is already registered.
    pub fn add_skills(&mut self, skills: impl IntoIterator<Item = Skill>) -> Result<()> {
        for skill in skills {
            if self.skill_exists(&skill.name) {
                return Err(ChatflowError::InvalidConfig(format!(
                    "Skill with name '{}' already exists.",
                    skill.name
                )));
            }
            self.skills.push(skill);
        }
        Ok(())
    }

    /// Whether a skill with this name is registered.
    #[must_use]
    pub fn skill_exists(&self, name: &str) -> bool {
        self.skills.iter().any(|s| s.name == name)
    }

    /// Looks up a skill.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.name == name)
    }

    /// Whether any skill is registered.
    #[must_use]
    pub fn has_skills(&self) -> bool {
        !self.skills.is_empty()
    }

    /// Registered names, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.skills.iter().map(|s| s.name.clone()).collect()
    }

    /// The section listing skills inside generation prompts.
    #[must_use]
    pub fn prompt_section(&self) -> String {
        if self.skills.is_empty() {
            return String::new();
        }
        let mut section =
            String::from("You can call the following functions that have been pre-defined for you:\n");
        for skill in &self.skills {
            section.push_str(&format!("\n# {}\n{}\n", skill.description, skill.code));
        }
        section
    }

    /// Converts to tracker records.
    #[must_use]
    pub fn to_object(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.skills
                .iter()
                .map(|s| serde_json::json!({"name": s.name, "description": s.description}))
                .collect(),
        )
    }
}
