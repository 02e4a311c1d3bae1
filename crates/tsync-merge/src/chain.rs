use async_trait::async_trait;
use std::fmt;
use tracing::{info, warn};
use tsync_schemas::{ContactMergeRequest, ContactRecord};

use crate::scenario::{classify, plan, MergeContractViolation, MergeEffect, MergeFacts};
use crate::MergeScenario;

/// Local state the reconciler reads and the effects it writes.
#[async_trait]
pub trait MergeDirectory: Send + Sync {
    async fn find_contact(&self, guid: &str) -> anyhow::Result<Option<ContactRecord>>;

    /// True when the user holds at least one course enrolment.
    async fn has_enrolments(&self, user_id: i64) -> anyhow::Result<bool>;

    async fn apply(&self, effect: &MergeEffect) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub enum MergeError {
    Contract(MergeContractViolation),
    Directory(anyhow::Error),
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeError::Contract(v) => write!(f, "merge contract violation: {v}"),
            MergeError::Directory(e) => write!(f, "merge directory error: {e:#}"),
        }
    }
}

impl std::error::Error for MergeError {}

impl From<MergeContractViolation> for MergeError {
    fn from(v: MergeContractViolation) -> Self {
        MergeError::Contract(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// False when a request hit scenario 5; the chain stopped there.
    pub success: bool,
    /// The destination contact as it stands after every applied request.
    pub contact: ContactRecord,
    /// `(request id, scenario)` in the order applied.
    pub applied: Vec<(i64, MergeScenario)>,
    /// The request left for operator review, with `merge_failed` set.
    pub failed_request: Option<ContactMergeRequest>,
}

/// Fold `requests` (all targeting `contact`) in ascending creation order.
///
/// Stops at the first scenario-5 request. Contract violations and directory
/// failures abort the fold; effects already applied for earlier requests
/// stand.
pub async fn reconcile_chain<D>(
    directory: &D,
    contact: ContactRecord,
    mut requests: Vec<ContactMergeRequest>,
) -> Result<MergeOutcome, MergeError>
where
    D: MergeDirectory + ?Sized,
{
    requests.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then(a.source_id.cmp(&b.source_id))
    });

    let mut current = contact;
    let mut applied = Vec::new();

    for request in requests {
        check_request(&current, &request)?;

        let source = directory
            .find_contact(&request.source_contact_guid)
            .await
            .map_err(MergeError::Directory)?;
        let source_user = source.as_ref().and_then(|c| c.user_id);
        let destination_user = current.user_id;

        let facts = MergeFacts {
            source_contact: source.is_some(),
            source_user,
            destination_user,
            source_has_enrolments: enrolled(directory, source_user).await?,
            destination_has_enrolments: enrolled(directory, destination_user).await?,
        };
        let scenario = classify(request.source_id, &facts)?;

        for effect in plan(&request, &facts, scenario) {
            directory
                .apply(&effect)
                .await
                .map_err(MergeError::Directory)?;
            if let MergeEffect::BindUser { user_id, .. } = effect {
                current.user_id = Some(user_id);
            }
        }

        if scenario.is_terminal_failure() {
            warn!(
                request_id = request.source_id,
                contact = %current.contact.source_guid,
                "merge request needs manual resolution: both users have enrolments"
            );
            let failed = ContactMergeRequest {
                source_user_id: source_user,
                destination_user_id: destination_user,
                merge_failed: true,
                ..request
            };
            return Ok(MergeOutcome {
                success: false,
                contact: current,
                applied,
                failed_request: Some(failed),
            });
        }

        info!(
            request_id = request.source_id,
            scenario = scenario.number(),
            contact = %current.contact.source_guid,
            "merge request applied"
        );
        applied.push((request.source_id, scenario));
    }

    Ok(MergeOutcome {
        success: true,
        contact: current,
        applied,
        failed_request: None,
    })
}

fn check_request(
    current: &ContactRecord,
    request: &ContactMergeRequest,
) -> Result<(), MergeContractViolation> {
    if !request.is_pending() {
        return Err(MergeContractViolation::NotPending {
            request_id: request.source_id,
        });
    }
    if request.source_contact_guid == request.destination_contact_guid {
        return Err(MergeContractViolation::SelfMerge {
            request_id: request.source_id,
            contact_guid: request.source_contact_guid.clone(),
        });
    }
    if request.destination_contact_guid != current.contact.source_guid {
        return Err(MergeContractViolation::DestinationMismatch {
            request_id: request.source_id,
            expected: current.contact.source_guid.clone(),
            got: request.destination_contact_guid.clone(),
        });
    }
    Ok(())
}

async fn enrolled<D>(directory: &D, user: Option<i64>) -> Result<bool, MergeError>
where
    D: MergeDirectory + ?Sized,
{
    match user {
        Some(u) => directory
            .has_enrolments(u)
            .await
            .map_err(MergeError::Directory),
        None => Ok(false),
    }
}
