//! Rebuilds a full-length result list from the store's partial results.

use std::collections::VecDeque;

use super::error::ReconcileError;
use super::gate::ValidationOutcome;
use super::result::{ResultSlot, WriteError, WriteResult};

/// Merges store results back into batch order.
///
/// `store_results` must hold exactly one entry per accepted outcome, in the
/// order the accepted documents were submitted. Rejected positions become
/// `forbidden` errors; accepted positions take the next store result.
pub fn reconcile(
    outcomes: &[ValidationOutcome],
    store_results: Vec<WriteResult>,
) -> Result<Vec<ResultSlot>, ReconcileError> {
    let submitted = outcomes.iter().filter(|o| o.is_accepted()).count();
    let returned = store_results.len();
    let mut pending: VecDeque<WriteResult> = store_results.into();
    let mut slots = Vec::with_capacity(outcomes.len());

    for outcome in outcomes {
        match outcome {
            ValidationOutcome::Rejected(reason) => {
                slots.push(ResultSlot::Rejected(WriteError::forbidden(reason.clone())));
            }
            ValidationOutcome::Accepted => match pending.pop_front() {
                Some(result) => slots.push(ResultSlot::Written(result)),
                None => {
                    return Err(ReconcileError::Underflow {
                        submitted,
                        returned,
                    })
                }
            },
        }
    }

    if !pending.is_empty() {
        return Err(ReconcileError::Overflow {
            submitted,
            returned,
        });
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::WriteSuccess;
    use crate::validation::ValidationError;

    fn rejected(msg: &str) -> ValidationOutcome {
        ValidationOutcome::Rejected(ValidationError::new(msg))
    }

    fn success(id: &str, rev: &str) -> WriteResult {
        WriteSuccess::new(id, rev).into()
    }

    #[test]
    fn test_rejected_positions_become_forbidden() {
        let outcomes = vec![ValidationOutcome::Accepted, rejected("bad"), ValidationOutcome::Accepted];
        let slots = reconcile(&outcomes, vec![success("a", "1-x"), success("c", "1-y")]).unwrap();

        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0], ResultSlot::Written(success("a", "1-x")));
        match &slots[1] {
            ResultSlot::Rejected(err) => {
                assert_eq!(err.status, 403);
                assert_eq!(err.name, "forbidden");
                assert_eq!(err.message, "bad");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(slots[2], ResultSlot::Written(success("c", "1-y")));
    }

    #[test]
    fn test_store_failures_pass_through() {
        let outcomes = vec![ValidationOutcome::Accepted];
        let conflict = WriteResult::Failure(WriteError::conflict("a"));
        let slots = reconcile(&outcomes, vec![conflict.clone()]).unwrap();
        assert_eq!(slots, vec![ResultSlot::Written(conflict)]);
    }

    #[test]
    fn test_all_rejected() {
        let outcomes = vec![rejected("one"), rejected("two")];
        let slots = reconcile(&outcomes, Vec::new()).unwrap();
        assert!(slots.iter().all(ResultSlot::is_rejected));
    }

    #[test]
    fn test_underflow_is_fatal() {
        let outcomes = vec![ValidationOutcome::Accepted, rejected("bad"), ValidationOutcome::Accepted];
        let err = reconcile(&outcomes, vec![success("a", "1-x")]).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::Underflow {
                submitted: 2,
                returned: 1
            }
        );
        assert!(err.to_string().contains("ran out of store results"));
    }

    #[test]
    fn test_overflow_is_fatal() {
        let outcomes = vec![ValidationOutcome::Accepted, rejected("bad")];
        let err = reconcile(&outcomes, vec![success("a", "1-x"), success("b", "1-y")]).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::Overflow {
                submitted: 1,
                returned: 2
            }
        );
        assert!(err.to_string().contains("too many store results"));
    }

    #[test]
    fn test_overflow_with_nothing_accepted() {
        let err = reconcile(&[rejected("bad")], vec![success("a", "1-x")]).unwrap_err();
        assert!(matches!(err, ReconcileError::Overflow { submitted: 0, .. }));
    }

    #[test]
    fn test_empty_batch() {
        assert!(reconcile(&[], Vec::new()).unwrap().is_empty());
    }
}
