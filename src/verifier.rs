//! Strict, ordered condition verification
//!
//! Conditions are evaluated in declaration order; the first one that throws
//! or judges the call wrong wins and the rest are never evaluated. This is
//! deliberately not reorderable or parallelizable: conditions may have side
//! effects, and later conditions may assume earlier ones ran to completion.

use tracing::{debug, trace};

use crate::condition::{Condition, ConditionScope};
use crate::errors::{
    ConditionDetail, ConditionMetaError, ConditionViolation, ContractError, ContractFunctionId,
    ContractResult, Thrown,
};
use crate::value::Value;

/// Which violation leaf a falsy condition produces, with its payload.
#[derive(Clone, Copy)]
pub(crate) enum Check<'a> {
    Precondition,
    Postcondition { result: &'a Value },
    Exception { exception: &'a Thrown },
}

/// Evaluate `conditions` left to right against `scope`.
///
/// A condition that throws produces a [`ConditionMetaError`]; one that
/// evaluates falsy produces the violation leaf selected by `check`. Either
/// way evaluation stops at the first failure. If all conditions pass, the
/// call returns with no observable effect.
pub(crate) fn verify_all(
    function: &ContractFunctionId,
    check: Check<'_>,
    conditions: &[Condition],
    scope: &ConditionScope<'_>,
) -> ContractResult<()> {
    for condition in conditions {
        trace!(condition = condition.label(), "evaluating condition");
        match condition.evaluate(scope) {
            Err(error) => {
                debug!(
                    condition = condition.label(),
                    "condition could not be evaluated"
                );
                let detail = detail(function, condition, scope);
                return Err(ConditionMetaError::new(detail, error).into());
            }
            Ok(judgement) if !judgement.is_truthy() => {
                debug!(condition = condition.label(), "condition violated");
                let detail = detail(function, condition, scope);
                let violation = match check {
                    Check::Precondition => ConditionViolation::Precondition { detail },
                    Check::Postcondition { result } => ConditionViolation::Postcondition {
                        detail,
                        result: result.clone(),
                    },
                    Check::Exception { exception } => ConditionViolation::Exception {
                        detail,
                        exception: exception.clone(),
                    },
                };
                return Err(ContractError::Violation(violation));
            }
            Ok(_) => {}
        }
    }
    Ok(())
}

fn detail(
    function: &ContractFunctionId,
    condition: &Condition,
    scope: &ConditionScope<'_>,
) -> ConditionDetail {
    ConditionDetail::new(
        function.clone(),
        condition.label(),
        scope.receiver().clone(),
        scope.args().to_vec(),
    )
}
