//! Execution request types and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for an import or copy execution.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Generate a new random execution ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidExecutionId(format!("{s}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// First eight hex characters, used to derive names for copied tables.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ExecutionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExecutionId({})", self.0)
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution status as exposed to polling clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Accepted, no step has started yet.
    Created,
    /// At least one pipeline step has started.
    Running,
    /// Every step finished successfully.
    Success,
    /// A step failed; the log carries the error.
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Check if the execution reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Status moves forward only. Terminal states absorb every transition,
    /// and `Running -> Running` is allowed so each step can refresh the record.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        match (self, next) {
            (Self::Success | Self::Failed, _) => false,
            (Self::Created, _) => true,
            (Self::Running, Self::Created) => false,
            (Self::Running, _) => true,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }
}

/// What an execution does with its input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionAction {
    /// Import uploaded files into the datastore.
    Import,
    /// Duplicate an existing resource through the handler that created it.
    Copy,
}

impl ExecutionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Copy => "copy",
        }
    }
}

impl fmt::Display for ExecutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionAction {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "import" => Ok(Self::Import),
            "copy" => Ok(Self::Copy),
            other => Err(crate::Error::InvalidStep(format!("unknown action {other}"))),
        }
    }
}

/// Observable stage of the import state machine.
///
/// `Created -> SchemaSetup -> Importing -> Published -> Registered`, with `Failed`
/// reachable from any non-terminal stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Created,
    SchemaSetup,
    Importing,
    Published,
    Registered,
    Failed,
}

impl ImportStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::SchemaSetup => "schema_setup",
            Self::Importing => "importing",
            Self::Published => "published",
            Self::Registered => "registered",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work in a handler's task list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    StartImport,
    ImportResource,
    PublishResource,
    CreateResource,
    StartCopy,
    CopySchema,
    CopyData,
    CopyResource,
}

/// Task list for a fresh import.
pub const IMPORT_TASKS: [PipelineStep; 4] = [
    PipelineStep::StartImport,
    PipelineStep::ImportResource,
    PipelineStep::PublishResource,
    PipelineStep::CreateResource,
];

/// Task list for copying a resource created by a handler.
pub const COPY_TASKS: [PipelineStep; 5] = [
    PipelineStep::StartCopy,
    PipelineStep::CopySchema,
    PipelineStep::CopyData,
    PipelineStep::PublishResource,
    PipelineStep::CopyResource,
];

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartImport => "start_import",
            Self::ImportResource => "import_resource",
            Self::PublishResource => "publish_resource",
            Self::CreateResource => "create_resource",
            Self::StartCopy => "start_copy",
            Self::CopySchema => "copy_schema",
            Self::CopyData => "copy_data",
            Self::CopyResource => "copy_resource",
        }
    }

    /// Stage the state machine is in while this step runs.
    pub fn stage(&self) -> ImportStage {
        match self {
            Self::StartImport | Self::StartCopy => ImportStage::Created,
            Self::ImportResource | Self::CopySchema => ImportStage::SchemaSetup,
            Self::CopyData => ImportStage::Importing,
            Self::PublishResource => ImportStage::Published,
            Self::CreateResource | Self::CopyResource => ImportStage::Registered,
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStep {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "start_import" => Ok(Self::StartImport),
            "import_resource" => Ok(Self::ImportResource),
            "publish_resource" => Ok(Self::PublishResource),
            "create_resource" => Ok(Self::CreateResource),
            "start_copy" => Ok(Self::StartCopy),
            "copy_schema" => Ok(Self::CopySchema),
            "copy_data" => Ok(Self::CopyData),
            "copy_resource" => Ok(Self::CopyResource),
            other => Err(crate::Error::InvalidStep(other.to_string())),
        }
    }
}

/// Response body for execution status queries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionStatusResponse {
    pub execution_id: String,
    pub action: String,
    pub status: ExecutionStatus,
    pub step: String,
    pub handler: Option<String>,
    pub created_at: String,
    pub last_updated: String,
    pub log: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_id_roundtrip() {
        let id = ExecutionId::new();
        let parsed = ExecutionId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert_eq!(id.short().len(), 8);
        assert!(ExecutionId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        use ExecutionStatus::*;
        assert!(Created.can_transition_to(Running));
        assert!(Created.can_transition_to(Failed));
        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Success));
        assert!(!Running.can_transition_to(Created));
        for terminal in [Success, Failed] {
            assert!(terminal.is_terminal());
            for next in [Created, Running, Success, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_step_names_parse_back() {
        for step in IMPORT_TASKS.iter().chain(COPY_TASKS.iter()) {
            assert_eq!(step.as_str().parse::<PipelineStep>().unwrap(), *step);
        }
        assert!("importer.import_resource".parse::<PipelineStep>().is_err());
    }

    #[test]
    fn test_import_tasks_walk_the_stage_machine_forward() {
        let stages: Vec<_> = IMPORT_TASKS.iter().map(|s| s.stage()).collect();
        assert_eq!(
            stages,
            vec![
                ImportStage::Created,
                ImportStage::SchemaSetup,
                ImportStage::Published,
                ImportStage::Registered
            ]
        );
    }
}
