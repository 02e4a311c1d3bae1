use std::fmt;
use tsync_schemas::ContactMergeRequest;

// ---------------------------------------------------------------------------
// Facts and scenarios
// ---------------------------------------------------------------------------

/// Local state observed for one merge request, gathered before classifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeFacts {
    /// A local row exists for the source contact.
    pub source_contact: bool,
    pub source_user: Option<i64>,
    pub destination_user: Option<i64>,
    pub source_has_enrolments: bool,
    pub destination_has_enrolments: bool,
}

/// The five ways a request can apply. Variants carry the users they act
/// on, so a plan never has to guess at a missing binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeScenario {
    /// 1: no source contact, or it has no bound user.
    NoSourceUser,
    /// 2: only the source has a bound user.
    AdoptSourceUser { source_user: i64 },
    /// 3: both bound, source user has no enrolments.
    KeepDestination {
        source_user: i64,
        destination_user: i64,
    },
    /// 4: both bound, only the source user has enrolments.
    PreferSourceHistory {
        source_user: i64,
        destination_user: i64,
    },
    /// 5: both bound, both users have enrolments.
    BothHaveHistory {
        source_user: i64,
        destination_user: i64,
    },
}

impl MergeScenario {
    pub fn number(&self) -> u8 {
        match self {
            MergeScenario::NoSourceUser => 1,
            MergeScenario::AdoptSourceUser { .. } => 2,
            MergeScenario::KeepDestination { .. } => 3,
            MergeScenario::PreferSourceHistory { .. } => 4,
            MergeScenario::BothHaveHistory { .. } => 5,
        }
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, MergeScenario::BothHaveHistory { .. })
    }
}

// ---------------------------------------------------------------------------
// Contract violations
// ---------------------------------------------------------------------------

/// Input no scenario can describe. Always a bug upstream of the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeContractViolation {
    DestinationMismatch {
        request_id: i64,
        expected: String,
        got: String,
    },
    SelfMerge {
        request_id: i64,
        contact_guid: String,
    },
    NotPending {
        request_id: i64,
    },
    SameUserBothSides {
        request_id: i64,
        user_id: i64,
    },
    /// Enrolments reported for a side with no bound user, or a source user
    /// without a source contact.
    InconsistentFacts {
        request_id: i64,
        facts: MergeFacts,
    },
}

impl fmt::Display for MergeContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeContractViolation::DestinationMismatch {
                request_id,
                expected,
                got,
            } => write!(
                f,
                "merge request {request_id}: destination {got} is not the contact being reconciled ({expected})"
            ),
            MergeContractViolation::SelfMerge {
                request_id,
                contact_guid,
            } => write!(
                f,
                "merge request {request_id}: source and destination are both {contact_guid}"
            ),
            MergeContractViolation::NotPending { request_id } => {
                write!(f, "merge request {request_id} is not pending")
            }
            MergeContractViolation::SameUserBothSides {
                request_id,
                user_id,
            } => write!(
                f,
                "merge request {request_id}: user {user_id} is bound to both contacts"
            ),
            MergeContractViolation::InconsistentFacts { request_id, facts } => {
                write!(f, "merge request {request_id}: inconsistent facts {facts:?}")
            }
        }
    }
}

impl std::error::Error for MergeContractViolation {}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Pick the one scenario for `facts`. Total over consistent facts.
pub fn classify(
    request_id: i64,
    facts: &MergeFacts,
) -> Result<MergeScenario, MergeContractViolation> {
    let inconsistent = (facts.source_user.is_some() && !facts.source_contact)
        || (facts.source_has_enrolments && facts.source_user.is_none())
        || (facts.destination_has_enrolments && facts.destination_user.is_none());
    if inconsistent {
        return Err(MergeContractViolation::InconsistentFacts {
            request_id,
            facts: *facts,
        });
    }

    match (facts.source_user, facts.destination_user) {
        (None, _) => Ok(MergeScenario::NoSourceUser),
        (Some(source_user), None) => Ok(MergeScenario::AdoptSourceUser { source_user }),
        (Some(s), Some(d)) if s == d => Err(MergeContractViolation::SameUserBothSides {
            request_id,
            user_id: s,
        }),
        (Some(source_user), Some(destination_user)) => {
            match (facts.source_has_enrolments, facts.destination_has_enrolments) {
                (false, _) => Ok(MergeScenario::KeepDestination {
                    source_user,
                    destination_user,
                }),
                (true, false) => Ok(MergeScenario::PreferSourceHistory {
                    source_user,
                    destination_user,
                }),
                (true, true) => Ok(MergeScenario::BothHaveHistory {
                    source_user,
                    destination_user,
                }),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Effect plan
// ---------------------------------------------------------------------------

/// Side effect the directory applies, in plan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeEffect {
    BindUser {
        contact_guid: String,
        user_id: i64,
    },
    SuspendUser {
        user_id: i64,
    },
    DeleteContact {
        contact_guid: String,
    },
    /// `active = false`; records the users observed when it was applied.
    ResolveRequest {
        request_id: i64,
        source_user_id: Option<i64>,
        destination_user_id: Option<i64>,
    },
    /// `merge_failed = true`; `active` is left as it was.
    FailRequest {
        request_id: i64,
        source_user_id: Option<i64>,
        destination_user_id: Option<i64>,
    },
}

/// Effects for `scenario`. The source row is deleted before its user is
/// bound elsewhere so a user is never bound to two contacts at once.
pub fn plan(
    request: &ContactMergeRequest,
    facts: &MergeFacts,
    scenario: MergeScenario,
) -> Vec<MergeEffect> {
    let request_id = request.source_id;
    let source_guid = request.source_contact_guid.clone();
    let dest_guid = request.destination_contact_guid.clone();
    let resolve = MergeEffect::ResolveRequest {
        request_id,
        source_user_id: facts.source_user,
        destination_user_id: facts.destination_user,
    };
    let delete_source = MergeEffect::DeleteContact {
        contact_guid: source_guid,
    };

    match scenario {
        MergeScenario::NoSourceUser => {
            let mut effects = Vec::new();
            if facts.source_contact {
                effects.push(delete_source);
            }
            effects.push(resolve);
            effects
        }
        MergeScenario::AdoptSourceUser { source_user } => vec![
            delete_source,
            MergeEffect::BindUser {
                contact_guid: dest_guid,
                user_id: source_user,
            },
            resolve,
        ],
        MergeScenario::KeepDestination { source_user, .. } => vec![
            MergeEffect::SuspendUser {
                user_id: source_user,
            },
            delete_source,
            resolve,
        ],
        MergeScenario::PreferSourceHistory {
            source_user,
            destination_user,
        } => vec![
            delete_source,
            MergeEffect::BindUser {
                contact_guid: dest_guid,
                user_id: source_user,
            },
            MergeEffect::SuspendUser {
                user_id: destination_user,
            },
            resolve,
        ],
        MergeScenario::BothHaveHistory {
            source_user,
            destination_user,
        } => vec![MergeEffect::FailRequest {
            request_id,
            source_user_id: Some(source_user),
            destination_user_id: Some(destination_user),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(
        source_user: Option<i64>,
        destination_user: Option<i64>,
        src_enr: bool,
        dst_enr: bool,
    ) -> MergeFacts {
        MergeFacts {
            source_contact: source_user.is_some(),
            source_user,
            destination_user,
            source_has_enrolments: src_enr,
            destination_has_enrolments: dst_enr,
        }
    }

    #[test]
    fn every_consistent_combination_has_exactly_one_scenario() {
        let users = [None, Some(1)];
        let dests = [None, Some(2)];
        let mut seen = std::collections::HashSet::new();
        for s in users {
            for d in dests {
                for se in [false, true] {
                    for de in [false, true] {
                        let f = facts(s, d, se, de);
                        let consistent = (se <= s.is_some()) && (de <= d.is_some());
                        let r = classify(1, &f);
                        assert_eq!(r.is_ok(), consistent, "{f:?}");
                        if let Ok(sc) = r {
                            seen.insert(sc);
                        }
                    }
                }
            }
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn table_matches_documented_scenarios() {
        use MergeScenario::*;
        let (source_user, destination_user) = (1, 2);
        assert_eq!(classify(1, &facts(None, Some(2), false, true)), Ok(NoSourceUser));
        assert_eq!(
            classify(1, &facts(Some(1), None, true, false)),
            Ok(AdoptSourceUser { source_user })
        );
        let keep = KeepDestination {
            source_user,
            destination_user,
        };
        assert_eq!(classify(1, &facts(Some(1), Some(2), false, true)), Ok(keep));
        assert_eq!(classify(1, &facts(Some(1), Some(2), false, false)), Ok(keep));
        assert_eq!(
            classify(1, &facts(Some(1), Some(2), true, false)),
            Ok(PreferSourceHistory {
                source_user,
                destination_user
            })
        );
        assert_eq!(
            classify(1, &facts(Some(1), Some(2), true, true)),
            Ok(BothHaveHistory {
                source_user,
                destination_user
            })
        );
    }

    #[test]
    fn both_histories_plan_only_the_failure() {
        let request = ContactMergeRequest {
            platform: "acme".to_string(),
            source_id: 9,
            source_contact_guid: "src".to_string(),
            destination_contact_guid: "dst".to_string(),
            source_user_id: None,
            destination_user_id: None,
            created_at: tsync_schemas::epoch(),
            source_modified: tsync_schemas::epoch(),
            active: true,
            merge_failed: false,
        };
        let f = facts(Some(1), Some(2), true, true);
        let scenario = classify(9, &f).unwrap();
        assert_eq!(
            plan(&request, &f, scenario),
            vec![MergeEffect::FailRequest {
                request_id: 9,
                source_user_id: Some(1),
                destination_user_id: Some(2),
            }]
        );
    }

    #[test]
    fn same_user_on_both_sides_fails_loudly() {
        let err = classify(7, &facts(Some(3), Some(3), false, false)).unwrap_err();
        assert_eq!(
            err,
            MergeContractViolation::SameUserBothSides {
                request_id: 7,
                user_id: 3
            }
        );
    }

    #[test]
    fn source_user_without_source_contact_is_inconsistent() {
        let mut f = facts(Some(1), None, false, false);
        f.source_contact = false;
        assert!(matches!(
            classify(2, &f),
            Err(MergeContractViolation::InconsistentFacts { .. })
        ));
    }
}
