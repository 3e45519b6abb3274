//! Bounded repair of structured candidates
//!
//! `Parsing -> Valid`, or `Parsing -> Repairing -> Valid | Failed`. There is
//! exactly one corrective call; a second invalid candidate ends the request
//! with [`NtError::MalformedOutput`].

use nt_core::{NtError, Result};
use nt_extractor::CandidateValidator;
use serde::Serialize;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use crate::extract::CandidateSource;

/// States of the repair loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RepairState {
    Parsing,
    Repairing,
    Valid,
    Failed,
}

/// A validated value and the path that produced it
#[derive(Debug, Clone)]
pub struct RepairOutcome<T> {
    pub value: T,
    /// The candidate text that passed validation
    pub raw: String,
    pub transitions: Vec<RepairState>,
}

impl<T> RepairOutcome<T> {
    /// Whether the corrective call was needed
    pub fn repaired(&self) -> bool {
        self.transitions.contains(&RepairState::Repairing)
    }
}

/// Validate, and on failure repair once
pub struct RepairLoop<V> {
    validator: V,
}

impl<V> RepairLoop<V>
where
    V: CandidateValidator,
    V::Output: Send,
{
    pub fn new(validator: V) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    /// Run the loop over `raw`, asking `source` for the single repair
    pub async fn run(
        &self,
        raw: String,
        source: &dyn CandidateSource,
    ) -> Result<RepairOutcome<V::Output>> {
        let mut transitions = vec![RepairState::Parsing];

        let first_error = match self.validator.validate(&raw) {
            Ok(value) => {
                transitions.push(RepairState::Valid);
                debug!(?transitions, "candidate valid");
                return Ok(RepairOutcome {
                    value,
                    raw,
                    transitions,
                });
            }
            Err(e) => e,
        };

        warn!(source = source.name(), error = %first_error, "candidate invalid, repairing once");
        transitions.push(RepairState::Repairing);

        let repaired = source
            .repair(&raw, &first_error, &self.validator.describe())
            .await?;

        match self.validator.validate(&repaired) {
            Ok(value) => {
                transitions.push(RepairState::Valid);
                debug!(?transitions, "repaired candidate valid");
                Ok(RepairOutcome {
                    value,
                    raw: repaired,
                    transitions,
                })
            }
            Err(e) => {
                transitions.push(RepairState::Failed);
                error!(?transitions, error = %e, "repair did not produce a valid candidate");
                Err(NtError::MalformedOutput {
                    raw: repaired,
                    reason: e.to_string(),
                })
            }
        }
    }
}
