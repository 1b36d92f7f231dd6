//! Service layer API for moderation workflow operations
use super::config::Config;
use super::error::ModerationError;
use super::moderation::{
    ApprovalChain, ApprovalRequest, ApprovalStep, ApproverAssignment, DecisionOutcome,
    RecordLink, StepDecision, StepSpec, aggregate_status, creation_guard,
};
use super::store::{
    ModerationStore, Resource, TxResult, abort, id_key, link_key, tx_read, tx_write,
};
use super::types::{ApprovalStatus, TimeStamp, UserId};
use super::utils::new_uuid_to_bech32;
use sled::Transactional;
use tracing::{debug, info, warn};

/// The workflow engine. Every mutating call runs as one sled transaction, so
/// its precondition reads and its writes commit together or not at all.
pub struct ModerationService {
    store: ModerationStore,
    config: Config,
}

impl ModerationService {
    pub fn new(store: ModerationStore, config: Config) -> Self {
        Self { store, config }
    }

    pub fn open(config: Config) -> Result<Self, ModerationError> {
        let store = ModerationStore::open(&config)?;
        Ok(Self::new(store, config))
    }

    pub fn store(&self) -> &ModerationStore {
        &self.store
    }

    /// Create a moderation chain for a record, one step per entry in `steps`.
    pub fn create_request(
        &self,
        resource: &Resource,
        record_id: u64,
        requested_by: UserId,
        ordered: bool,
        steps: Vec<StepSpec>,
    ) -> Result<ApprovalChain, ModerationError> {
        if steps.is_empty() {
            warn!(table = resource.table(), record_id, "rejected empty step sequence");
            return Err(ModerationError::EmptySequence);
        }

        // an absent tree holds no records, and opening it would create it
        let Some(records) = self.store.existing_record_tree(resource)? else {
            let err = ModerationError::RecordNotFound {
                table: resource.table().to_string(),
                record_id,
            };
            warn!(table = resource.table(), record_id, error = %err, "approval request refused");
            return Err(err);
        };

        // allocated up front: sled may run the closure more than once
        let request_id = self.store.generate_id()?;
        let request_ref = external_ref("mod_")?;
        let step_rows = steps
            .iter()
            .map(|spec| -> Result<_, ModerationError> {
                Ok((self.store.generate_id()?, external_ref("step_")?, spec))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let created_at = TimeStamp::new();

        let result = (
            &self.store.requests,
            &self.store.steps,
            &self.store.step_users,
            &self.store.record_links,
            &records,
        )
            .transaction(
                |(requests, step_tree, step_users, links, records)| -> TxResult<ApprovalChain> {
                    if records.get(id_key(record_id))?.is_none() {
                        return abort(ModerationError::RecordNotFound {
                            table: resource.table().to_string(),
                            record_id,
                        });
                    }

                    let link_row = link_key(resource.table(), record_id);
                    let link: Option<RecordLink> = tx_read(links, &link_row, "record link")?;
                    let prior = match link {
                        Some(link) => {
                            let prior: Option<ApprovalRequest> = tx_read(
                                requests,
                                &id_key(link.approval_request_id),
                                "approval request",
                            )?;
                            match prior {
                                Some(prior) => Some(prior),
                                None => {
                                    return abort(ModerationError::RequestNotFound(
                                        link.approval_request_id,
                                    ));
                                }
                            }
                        }
                        None => None,
                    };

                    let supersedes =
                        match creation_guard(prior.as_ref(), self.config.resubmit_after_rejection) {
                            Ok(supersedes) => supersedes,
                            Err(err) => return abort(err),
                        };

                    let mut created = Vec::with_capacity(step_rows.len());
                    for (index, (step_id, step_ref, spec)) in step_rows.iter().enumerate() {
                        let step =
                            ApprovalStep::new(*step_id, request_id, step_ref.clone(), index, ordered);
                        let assignment =
                            ApproverAssignment::new(*step_id, spec.approvers.iter().cloned());

                        tx_write(step_tree, &id_key(*step_id), &step, "approval step")?;
                        tx_write(
                            step_users,
                            &id_key(*step_id),
                            &assignment,
                            "approver assignment",
                        )?;
                        created.push(step);
                    }

                    let request = ApprovalRequest {
                        id: request_id,
                        external_ref: request_ref.clone(),
                        record_table: resource.table().to_string(),
                        record_id,
                        requested_by: requested_by.clone(),
                        ordered,
                        step_total: created.len() as u32,
                        step_current: 0,
                        status: ApprovalStatus::Pending,
                        last_decided_step_id: None,
                        supersedes,
                        step_ids: created.iter().map(|step| step.id).collect(),
                        created_at: created_at.clone(),
                    };
                    tx_write(requests, &id_key(request_id), &request, "approval request")?;

                    let link = RecordLink {
                        record_table: resource.table().to_string(),
                        record_id,
                        approval_request_id: request_id,
                    };
                    tx_write(links, &link_row, &link, "record link")?;

                    Ok(ApprovalChain {
                        request,
                        steps: created,
                    })
                },
            )
            .map_err(ModerationError::from);

        match result {
            Ok(chain) => {
                info!(
                    request_id = chain.request.id,
                    table = resource.table(),
                    record_id,
                    ordered,
                    step_total = chain.request.step_total,
                    supersedes = ?chain.request.supersedes,
                    "approval request created"
                );
                Ok(chain)
            }
            Err(err) => {
                warn!(table = resource.table(), record_id, error = %err, "approval request refused");
                Err(err)
            }
        }
    }

    /// Record a moderator's decision on a step and derive the request outcome.
    ///
    /// Preconditions are checked in this order, each failing distinctly: the
    /// step is pending, the moderator is assigned to it, the request is still
    /// pending, and for ordered requests the step is the next one due.
    pub fn decide_step(
        &self,
        step_id: u64,
        decision: StepDecision,
    ) -> Result<DecisionOutcome, ModerationError> {
        let result = (
            &self.store.requests,
            &self.store.steps,
            &self.store.step_users,
        )
            .transaction(|(requests, steps, step_users)| -> TxResult<DecisionOutcome> {
                let mut step: ApprovalStep =
                    match tx_read(steps, &id_key(step_id), "approval step")? {
                        Some(step) => step,
                        None => return abort(ModerationError::StepNotFound(step_id)),
                    };
                if !step.is_pending() {
                    return abort(ModerationError::StepNotPending { step_id });
                }

                let assignment: Option<ApproverAssignment> =
                    tx_read(step_users, &id_key(step_id), "approver assignment")?;
                if !assignment.is_some_and(|a| a.permits(&decision.moderator)) {
                    return abort(ModerationError::Unauthorized {
                        step_id,
                        moderator: decision.moderator.to_string(),
                    });
                }

                let request_id = step.approval_request_id;
                let mut request: ApprovalRequest =
                    match tx_read(requests, &id_key(request_id), "approval request")? {
                        Some(request) => request,
                        None => return abort(ModerationError::RequestNotFound(request_id)),
                    };
                if request.is_finished() {
                    return abort(ModerationError::RequestFinished { request_id });
                }
                // compared against the counter before this decision advances it
                if request.ordered && step.ordinal != Some(request.next_counter()) {
                    return abort(ModerationError::OutOfOrder {
                        step_id,
                        expected: request.next_counter(),
                        ordinal: step.ordinal,
                    });
                }

                step.record_decision(&decision);
                request.step_current += 1;
                request.last_decided_step_id = Some(step_id);

                let mut remaining_pending = 0;
                let mut next_step = None;
                for other_id in request.step_ids.iter().filter(|id| **id != step_id) {
                    let other: ApprovalStep =
                        match tx_read(steps, &id_key(*other_id), "approval step")? {
                            Some(other) => other,
                            None => return abort(ModerationError::StepNotFound(*other_id)),
                        };
                    if other.is_pending() {
                        remaining_pending += 1;
                    }
                    if request.ordered && other.ordinal == Some(request.next_counter()) {
                        next_step = Some(other);
                    }
                }

                if request.ordered {
                    if let Some(mut next) = next_step.filter(|_| remaining_pending > 0) {
                        next.is_current = true;
                        tx_write(steps, &id_key(next.id), &next, "approval step")?;
                    }
                } else {
                    // decision order only, never checked
                    step.ordinal = Some(request.step_current);
                }

                request.status = aggregate_status(decision.decision, remaining_pending);

                tx_write(steps, &id_key(step_id), &step, "approval step")?;
                tx_write(requests, &id_key(request_id), &request, "approval request")?;

                Ok(DecisionOutcome { request, step })
            })
            .map_err(ModerationError::from);

        match result {
            Ok(outcome) => {
                info!(
                    request_id = outcome.request.id,
                    step_id,
                    moderator = %decision.moderator,
                    outcome = %outcome.step.outcome,
                    status = %outcome.request.status,
                    step_current = outcome.request.step_current,
                    "step decided"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(step_id, moderator = %decision.moderator, error = %err, "step decision refused");
                Err(err)
            }
        }
    }

    /// Replace the approver group of a step wholesale.
    ///
    /// Refused once the owning request is finished. A step that is already
    /// decided can still be reassigned while its request is pending; its
    /// outcome is kept and nobody can decide it again. An empty group is
    /// accepted and leaves the step undecidable.
    pub fn reassign_approvers(
        &self,
        step_id: u64,
        approvers: Vec<UserId>,
    ) -> Result<ApproverAssignment, ModerationError> {
        let assignment = ApproverAssignment::new(step_id, approvers);

        let result = (
            &self.store.requests,
            &self.store.steps,
            &self.store.step_users,
        )
            .transaction(|(requests, steps, step_users)| -> TxResult<()> {
                let step: ApprovalStep = match tx_read(steps, &id_key(step_id), "approval step")? {
                    Some(step) => step,
                    None => return abort(ModerationError::StepNotFound(step_id)),
                };
                let request_id = step.approval_request_id;
                let request: ApprovalRequest =
                    match tx_read(requests, &id_key(request_id), "approval request")? {
                        Some(request) => request,
                        None => return abort(ModerationError::RequestNotFound(request_id)),
                    };
                if request.is_finished() {
                    return abort(ModerationError::RequestFinished { request_id });
                }

                step_users.remove(&id_key(step_id)[..])?;
                tx_write(
                    step_users,
                    &id_key(step_id),
                    &assignment,
                    "approver assignment",
                )?;
                Ok(())
            })
            .map_err(ModerationError::from);

        match result {
            Ok(()) => {
                info!(
                    step_id,
                    approvers = assignment.approvers.len(),
                    "approvers reassigned"
                );
                Ok(assignment)
            }
            Err(err) => {
                warn!(step_id, error = %err, "approver reassignment refused");
                Err(err)
            }
        }
    }

    pub fn get_request(&self, request_id: u64) -> Result<ApprovalRequest, ModerationError> {
        debug!(request_id, "loading approval request");
        self.store
            .get_request(request_id)?
            .ok_or(ModerationError::RequestNotFound(request_id))
    }

    pub fn get_step(&self, step_id: u64) -> Result<ApprovalStep, ModerationError> {
        debug!(step_id, "loading approval step");
        self.store
            .get_step(step_id)?
            .ok_or(ModerationError::StepNotFound(step_id))
    }

    /// Steps of a request in submission order.
    pub fn steps_for_request(&self, request_id: u64) -> Result<Vec<ApprovalStep>, ModerationError> {
        let request = self.get_request(request_id)?;
        request
            .step_ids
            .iter()
            .map(|step_id| self.get_step(*step_id))
            .collect()
    }

    pub fn approvers(&self, step_id: u64) -> Result<Vec<UserId>, ModerationError> {
        self.get_step(step_id)?;
        Ok(self
            .store
            .get_assignment(step_id)?
            .map(|assignment| assignment.approvers)
            .unwrap_or_default())
    }

    /// The request a record's link currently points at, if any.
    pub fn request_for_record(
        &self,
        resource: &Resource,
        record_id: u64,
    ) -> Result<Option<ApprovalRequest>, ModerationError> {
        debug!(table = resource.table(), record_id, "resolving record link");
        match self.store.get_link(resource, record_id)? {
            Some(link) => self.get_request(link.approval_request_id).map(Some),
            None => Ok(None),
        }
    }

    /// The head request for a record followed by every request it supersedes.
    pub fn request_history(
        &self,
        resource: &Resource,
        record_id: u64,
    ) -> Result<Vec<ApprovalRequest>, ModerationError> {
        let mut history = Vec::new();
        let mut cursor = self.request_for_record(resource, record_id)?;

        while let Some(request) = cursor {
            cursor = match request.supersedes {
                Some(prior_id) => Some(self.get_request(prior_id)?),
                None => None,
            };
            history.push(request);
        }

        Ok(history)
    }
}

fn external_ref(hrp: &str) -> Result<String, ModerationError> {
    new_uuid_to_bech32(hrp).map_err(|_| ModerationError::Encode("external reference"))
}
