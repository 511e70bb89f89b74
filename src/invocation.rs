//! Synchronous call protocol
//!
//! The state machine executed each time a wrapped, synchronous-result
//! callable is invoked:
//!
//! ```text
//! Start -> PreconditionCheck -> Invoke -> {NominalOutcome | ExceptionalOutcome}
//!       -> {PostCheck | ExceptionCheck} -> {Return | Rethrow}
//! ```
//!
//! A precondition failure means the implementation is never invoked. An
//! exception that already belongs to the error taxonomy passes through
//! unchanged so the deepest diagnostic surfaces. The `verify` and
//! `verify_postconditions` toggles are read at call time, not at wrap time.

use tracing::{debug, trace};

use crate::condition::{ConditionScope, SelfRef};
use crate::errors::{CallOutcome, Thrown};
use crate::function::{Constructible, ContractFunction};
use crate::value::Value;
use crate::verifier::{self, Check};

/// Run the protocol, invoking the wrapped implementation.
pub(crate) fn run(function: &ContractFunction, receiver: &Value, args: &[Value]) -> CallOutcome {
    protocol(function, receiver, args, |receiver, args| {
        function.implementation().invoke(receiver, args)
    })
}

/// Run the protocol, invoking the constructible template instead.
pub(crate) fn run_construct(
    function: &ContractFunction,
    template: &dyn Constructible,
    args: &[Value],
) -> CallOutcome {
    protocol(function, &Value::Nil, args, |_receiver, args| {
        template.construct(args)
    })
}

fn protocol(
    function: &ContractFunction,
    receiver: &Value,
    args: &[Value],
    invoke: impl Fn(&Value, &[Value]) -> CallOutcome,
) -> CallOutcome {
    let contract = function.contract();

    if !contract.verify() {
        trace!("verification disabled, invoking implementation directly");
        return invoke(receiver, args);
    }

    let id = function.id();

    let scope = ConditionScope::pre(receiver, args);
    verifier::verify_all(&id, Check::Precondition, contract.preconditions(), &scope)
        .map_err(Thrown::from)?;

    let outcome = invoke(receiver, args);

    if !contract.verify_postconditions() {
        trace!("outcome verification disabled, returning raw outcome");
        return outcome;
    }

    match outcome {
        Ok(result) => {
            let scope = ConditionScope::nominal(receiver, args, &result, SelfRef::Sync(function));
            verifier::verify_all(
                &id,
                Check::Postcondition { result: &result },
                contract.postconditions(),
                &scope,
            )
            .map_err(Thrown::from)?;
            Ok(result)
        }
        Err(exception) => {
            if exception.is_contract() {
                debug!("passing through nested contract failure unchanged");
                return Err(exception);
            }
            let scope =
                ConditionScope::exceptional(receiver, args, &exception, SelfRef::Sync(function));
            verifier::verify_all(
                &id,
                Check::Exception {
                    exception: &exception,
                },
                contract.exception_conditions(),
                &scope,
            )
            .map_err(Thrown::from)?;
            Err(exception)
        }
    }
}
