use serde::{Deserialize, Serialize};

/// Agent behavior requested from the backend, sent as `agentMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    #[default]
    General,
    DataAnalysis,
    Visualization,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::General => "general",
            AgentMode::DataAnalysis => "data_analysis",
            AgentMode::Visualization => "visualization",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "general" => Some(AgentMode::General),
            "data_analysis" | "analysis" => Some(AgentMode::DataAnalysis),
            "visualization" | "chart" => Some(AgentMode::Visualization),
            _ => None,
        }
    }

    pub fn all() -> Vec<AgentMode> {
        vec![AgentMode::General, AgentMode::DataAnalysis, AgentMode::Visualization]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentMode::General => "General",
            AgentMode::DataAnalysis => "Data analysis",
            AgentMode::Visualization => "Visualization",
        }
    }

    /// Next mode in sidebar order, wrapping around.
    pub fn next(&self) -> Self {
        let all = Self::all();
        let idx = all.iter().position(|m| m == self).unwrap_or(0);
        all[(idx + 1) % all.len()]
    }
}
