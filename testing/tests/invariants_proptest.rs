//! Property tests: arbitrary operation sequences never break the lifecycle
//! invariants, and the engine agrees with a simple reference model.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use proptest::prelude::*;
use repair_desk_core::error::LifecycleError;
use repair_desk_core::types::{Actor, Request, RequestId, RequestStatus, UserId, Version};
use repair_desk_testing::properties::{Step, arb_steps, arb_valid_new_request};
use repair_desk_testing::{TestDesk, valid_new_request};
use std::collections::HashMap;

/// Expected state of one request.
#[derive(Clone, Copy, Debug)]
struct Model {
    status: RequestStatus,
    assigned_to: Option<UserId>,
    version: i32,
}

impl Model {
    const fn new() -> Self {
        Self {
            status: RequestStatus::New,
            assigned_to: None,
            version: 1,
        }
    }

    fn check(&self, request: &Request) {
        assert_eq!(request.status, self.status);
        assert_eq!(request.assigned_to, self.assigned_to);
        assert_eq!(request.version, Version::new(self.version));
        assert!(request.assignment_is_consistent(), "{request:?}");
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

/// Wraps `index` into the created ids.
fn pick(ids: &[RequestId], index: usize) -> Option<RequestId> {
    ids.get(index % ids.len().max(1)).copied()
}

async fn run_steps(steps: Vec<Step>) {
    let desk = TestDesk::new().await;
    let masters: [Actor; 2] = [desk.master_actor(), desk.other_master_actor()];
    let mut ids: Vec<RequestId> = Vec::new();
    let mut model: HashMap<RequestId, Model> = HashMap::new();

    for step in steps {
        match step {
            Step::Create => {
                let created = desk.engine.create_request(valid_new_request()).await.unwrap();
                let expected = Model::new();
                expected.check(&created);
                ids.push(created.id);
                model.insert(created.id, expected);
            }
            Step::Assign { index, master } => {
                let Some(id) = pick(&ids, index) else { continue };
                let target = masters[master].id;
                let result = desk.engine.assign_request(&desk.dispatcher, id, target).await;
                let entry = model.get_mut(&id).unwrap();
                if entry.status == RequestStatus::New {
                    entry.status = RequestStatus::Assigned;
                    entry.assigned_to = Some(target);
                    entry.version += 1;
                    entry.check(&result.unwrap());
                } else {
                    assert!(matches!(result, Err(LifecycleError::InvalidTransition { .. })));
                }
            }
            Step::Cancel { index } => {
                let Some(id) = pick(&ids, index) else { continue };
                let result = desk.engine.cancel_request(&desk.dispatcher, id).await;
                let entry = model.get_mut(&id).unwrap();
                if matches!(entry.status, RequestStatus::New | RequestStatus::Assigned) {
                    entry.status = RequestStatus::Canceled;
                    entry.version += 1;
                    entry.check(&result.unwrap());
                } else {
                    assert!(matches!(result, Err(LifecycleError::InvalidTransition { .. })));
                }
            }
            Step::Take { index, master } => {
                let Some(id) = pick(&ids, index) else { continue };
                let actor = masters[master];
                let result = desk.engine.take_request(&actor, id).await;
                let entry = model.get_mut(&id).unwrap();
                if entry.status == RequestStatus::Assigned && entry.assigned_to == Some(actor.id) {
                    entry.status = RequestStatus::InProgress;
                    entry.version += 1;
                    entry.check(&result.unwrap());
                } else {
                    assert!(matches!(result, Err(LifecycleError::Conflict { .. })));
                }
            }
            Step::Complete { index, master } => {
                let Some(id) = pick(&ids, index) else { continue };
                let actor = masters[master];
                let result = desk.engine.complete_request(&actor, id).await;
                let entry = model.get_mut(&id).unwrap();
                if entry.status == RequestStatus::InProgress && entry.assigned_to == Some(actor.id)
                {
                    entry.status = RequestStatus::Done;
                    entry.version += 1;
                    entry.check(&result.unwrap());
                } else {
                    assert!(matches!(result, Err(LifecycleError::InvalidTransition { .. })));
                }
            }
        }
    }

    // Stored rows match the model after the whole run.
    for request in desk.engine.list_requests(&desk.dispatcher, None).await.unwrap() {
        model[&request.id].check(&request);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn arbitrary_sequences_keep_invariants(steps in arb_steps(40)) {
        runtime().block_on(run_steps(steps));
    }

    #[test]
    fn valid_intake_always_creates_new_request(input in arb_valid_new_request()) {
        let created = runtime().block_on(async {
            let desk = TestDesk::new().await;
            desk.engine.create_request(input.clone()).await
        });
        let created = created.unwrap();
        prop_assert_eq!(created.status, RequestStatus::New);
        prop_assert_eq!(created.version, Version::INITIAL);
        prop_assert_eq!(created.client_name, input.client_name);
    }
}
