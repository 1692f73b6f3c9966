//! Ordered policy composition.
//!
//! Policies are grouped into a fixed sequence of phases. The realized
//! execution order is recomputed for every `send_request`, so policies added
//! or removed between calls take effect immediately; mutating a pipeline
//! while requests are in flight is the caller's responsibility.

use crate::error::Error;
use crate::policy::{Next, Policy};
use crate::request::{PipelineRequest, PipelineResponse};
use crate::transport::HttpClient;
use std::sync::{Arc, PoisonError, RwLock};

/// Named phases constraining relative policy order.
///
/// The realized phase order is `Serialize`, then policies without a phase,
/// then `Deserialize`, then `Retry` pinned last. Each phase is followed by
/// its `after_phase` group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelinePhase {
    Serialize,
    Deserialize,
    Retry,
}

/// Where a policy runs relative to the retry loop.
///
/// `PerCall` policies run exactly once per logical operation; `PerRetry`
/// policies sit inside the retry loop, closest to the transport, and run on
/// every attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyPosition {
    PerCall,
    PerRetry,
}

/// Placement options for [`Pipeline::add_policy`].
#[derive(Clone, Debug, Default)]
pub struct PolicyOptions {
    phase: Option<PipelinePhase>,
    after_phase: Option<PipelinePhase>,
    before_policies: Vec<String>,
    position: Option<PolicyPosition>,
}

impl PolicyOptions {
    /// Place the policy in a named phase. Takes precedence over
    /// `after_phase` and `position`.
    pub fn with_phase(mut self, phase: PipelinePhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Run only after every policy in the named phase has run.
    pub fn with_after_phase(mut self, phase: PipelinePhase) -> Self {
        self.after_phase = Some(phase);
        self
    }

    /// Run once per call (`PerCall`) or once per retry attempt (`PerRetry`).
    pub fn with_position(mut self, position: PolicyPosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Run strictly before the named policies. Names that do not resolve to
    /// a policy currently in the pipeline are ignored.
    pub fn run_before<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.before_policies = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Pipeline configuration errors, raised when the policy set is mutated and
/// never deferred to request time.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("a policy named {name:?} already exists in the pipeline")]
    DuplicatePolicy { name: String },

    #[error("ordering constraints for policy {name:?} contradict the phase order")]
    OrderingConflict { name: String },

    #[error("before-policy constraints form a cycle involving {name:?}")]
    OrderingCycle { name: String },
}

/// Realized placement buckets, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Group {
    Serialize,
    AfterSerialize,
    Main,
    Deserialize,
    AfterDeserialize,
    Retry,
    AfterRetry,
}

const GROUP_ORDER: [Group; 7] = [
    Group::Serialize,
    Group::AfterSerialize,
    Group::Main,
    Group::Deserialize,
    Group::AfterDeserialize,
    Group::Retry,
    Group::AfterRetry,
];

fn resolve_group(options: &PolicyOptions) -> Group {
    if let Some(phase) = options.phase {
        return match phase {
            PipelinePhase::Serialize => Group::Serialize,
            PipelinePhase::Deserialize => Group::Deserialize,
            PipelinePhase::Retry => Group::Retry,
        };
    }
    if let Some(phase) = options.after_phase {
        return match phase {
            PipelinePhase::Serialize => Group::AfterSerialize,
            PipelinePhase::Deserialize => Group::AfterDeserialize,
            PipelinePhase::Retry => Group::AfterRetry,
        };
    }
    match options.position {
        Some(PolicyPosition::PerRetry) => Group::AfterRetry,
        _ => Group::Main,
    }
}

struct Entry {
    policy: Arc<dyn Policy>,
    group: Group,
    before: Vec<String>,
}

/// An ordered collection of policies terminated by a transport.
#[derive(Default)]
pub struct Pipeline {
    entries: RwLock<Vec<Entry>>,
}

impl Pipeline {
    /// Creates a pipeline with no policies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a policy. Fails if a policy with the same name is already
    /// present, or if the ordering constraints cannot be satisfied; a failed
    /// insertion leaves the pipeline unchanged.
    pub fn add_policy(
        &self,
        policy: Arc<dyn Policy>,
        options: PolicyOptions,
    ) -> Result<(), PipelineError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries
            .iter()
            .any(|entry| entry.policy.name() == policy.name())
        {
            return Err(PipelineError::DuplicatePolicy {
                name: policy.name().to_string(),
            });
        }
        entries.push(Entry {
            policy,
            group: resolve_group(&options),
            before: options.before_policies,
        });
        if let Err(e) = compute_order(&entries) {
            entries.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Removes a policy by name. Returns whether a policy was removed.
    pub fn remove_policy(&self, name: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|entry| entry.policy.name() != name);
        entries.len() != before
    }

    /// The policies in the order they would execute. Introspection only; no
    /// side effects.
    pub fn get_ordered_policies(&self) -> Vec<Arc<dyn Policy>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        // Every mutation validated the constraints, so ordering cannot fail
        // here; insertion order is the tie-break of last resort.
        compute_order(&entries)
            .unwrap_or_else(|_| entries.iter().map(|entry| entry.policy.clone()).collect())
    }

    /// Sends a request through the policies and the given transport.
    ///
    /// The linear order is snapshotted per call; the policy list lock is not
    /// held across any await point.
    pub async fn send_request(
        &self,
        transport: &dyn HttpClient,
        request: &mut PipelineRequest,
    ) -> Result<PipelineResponse, Error> {
        let ordered = self.get_ordered_policies();
        Next::new(&ordered, transport).run(request).await
    }
}

/// Produces the linear execution order: groups in their fixed order, and
/// within each group a stable topological sort honoring `before` edges.
fn compute_order(entries: &[Entry]) -> Result<Vec<Arc<dyn Policy>>, PipelineError> {
    // A before-constraint pointing at an earlier group can never hold.
    for entry in entries {
        for target in &entry.before {
            if let Some(found) = entries.iter().find(|e| e.policy.name() == target) {
                if found.group < entry.group {
                    return Err(PipelineError::OrderingConflict {
                        name: entry.policy.name().to_string(),
                    });
                }
            }
        }
    }

    let mut ordered = Vec::with_capacity(entries.len());
    for group in GROUP_ORDER {
        let members: Vec<&Entry> = entries.iter().filter(|e| e.group == group).collect();
        ordered.extend(sort_group(&members)?);
    }
    Ok(ordered)
}

fn sort_group(members: &[&Entry]) -> Result<Vec<Arc<dyn Policy>>, PipelineError> {
    // indegree[i] counts members that must run before member i.
    let mut indegree = vec![0usize; members.len()];
    for (i, entry) in members.iter().enumerate() {
        for target in &entry.before {
            if let Some(j) = members.iter().position(|e| e.policy.name() == target) {
                if i != j {
                    indegree[j] += 1;
                }
            }
        }
    }

    let mut emitted = vec![false; members.len()];
    let mut ordered = Vec::with_capacity(members.len());
    while ordered.len() < members.len() {
        let next = (0..members.len()).find(|&i| !emitted[i] && indegree[i] == 0);
        let Some(i) = next else {
            let stuck = (0..members.len()).find(|&i| !emitted[i]).unwrap_or(0);
            return Err(PipelineError::OrderingCycle {
                name: members[stuck].policy.name().to_string(),
            });
        };
        emitted[i] = true;
        ordered.push(members[i].policy.clone());
        for target in &members[i].before {
            if let Some(j) = members.iter().position(|e| e.policy.name() == target) {
                if i != j {
                    indegree[j] -= 1;
                }
            }
        }
    }
    Ok(ordered)
}
