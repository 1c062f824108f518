//! Finite state machine tracking a single webhook request

use serde::{Deserialize, Serialize};

use crate::errors::DeployerError;

/// Request stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    /// Body read, nothing checked yet
    Received,

    /// Signature matched the shared secret
    SignatureChecked,

    /// Payload parsed and validated
    PayloadValidated,

    /// Repository directory exists
    DirectoryEnsured,

    /// Descriptor written
    DescriptorReady,

    /// Images pulled
    PullDone,

    /// Containers started
    StartDone,

    /// Response produced
    Responded,

    /// Request failed; a response is still owed
    Failed,
}

/// Request event
#[derive(Debug, Clone)]
pub enum RequestEvent {
    SignatureVerified,
    PayloadAccepted,
    DirectoryCreated,
    DescriptorWritten,
    PullSucceeded,
    StartSucceeded,

    /// Response sent
    Respond,

    /// Something went wrong
    Fail(String),
}

/// Request FSM
#[derive(Debug, Clone)]
pub struct RequestFsm {
    stage: RequestStage,
    failed_at: Option<RequestStage>,
    error: Option<String>,
}

impl RequestFsm {
    /// Create a new FSM in the received stage
    pub fn new() -> Self {
        Self {
            stage: RequestStage::Received,
            failed_at: None,
            error: None,
        }
    }

    /// Get current stage
    pub fn stage(&self) -> RequestStage {
        self.stage
    }

    /// Stage at which the request failed, if it did
    pub fn failed_at(&self) -> Option<RequestStage> {
        self.failed_at
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage == RequestStage::Responded
    }

    /// Process an event and transition stage
    pub fn process(&mut self, event: RequestEvent) -> Result<(), String> {
        use RequestEvent as E;
        use RequestStage as S;

        let next = match (self.stage, &event) {
            (S::Received, E::SignatureVerified) => S::SignatureChecked,
            (S::SignatureChecked, E::PayloadAccepted) => S::PayloadValidated,
            (S::PayloadValidated, E::DirectoryCreated) => S::DirectoryEnsured,
            (S::DirectoryEnsured, E::DescriptorWritten) => S::DescriptorReady,
            (S::DescriptorReady, E::PullSucceeded) => S::PullDone,
            (S::PullDone, E::StartSucceeded) => S::StartDone,
            (S::StartDone, E::Respond) => S::Responded,

            // Failures keep the stage they happened at
            (S::Failed, E::Respond) => S::Responded,
            (stage, E::Fail(err)) if stage != S::Responded && stage != S::Failed => {
                self.failed_at = Some(stage);
                self.error = Some(err.clone());
                S::Failed
            }

            (stage, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", stage, event));
            }
        };

        self.stage = next;
        Ok(())
    }

    /// [`process`](Self::process) with the error lifted into the crate error
    pub fn advance(&mut self, event: RequestEvent) -> Result<(), DeployerError> {
        self.process(event).map_err(DeployerError::Internal)
    }
}

impl Default for RequestFsm {
    fn default() -> Self {
        Self::new()
    }
}
