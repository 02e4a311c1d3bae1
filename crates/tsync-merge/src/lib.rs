//! tsync-merge
//!
//! Contact merge reconciliation.
//!
//! Upstream reports that contact S was merged into contact D. Locally each
//! contact may be bound to a user account, and each user may hold course
//! enrolments. Exactly one of five scenarios applies per request:
//!
//! | # | source user | dest user | src enrolments | dest enrolments | result                                   |
//! |---|-------------|-----------|----------------|-----------------|------------------------------------------|
//! | 1 | none        | any       | -              | -               | D keeps its user                         |
//! | 2 | yes         | none      | any            | -               | D binds S's user                         |
//! | 3 | yes         | yes       | no             | any             | suspend S's user, D keeps its user       |
//! | 4 | yes         | yes       | yes            | no              | D binds S's user, suspend D's old user   |
//! | 5 | yes         | yes       | yes            | yes             | terminal failure, operator decides       |
//!
//! Every resolved scenario deletes the local S row. Classification and the
//! effect plan are pure ([`classify`], [`plan`]); [`reconcile_chain`] folds an
//! ordered chain of requests over a [`MergeDirectory`].

mod chain;
mod scenario;

pub use chain::{reconcile_chain, MergeDirectory, MergeError, MergeOutcome};
pub use scenario::{
    classify, plan, MergeContractViolation, MergeEffect, MergeFacts, MergeScenario,
};
