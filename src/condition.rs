//! Condition callables and the scope they are evaluated in
//!
//! A [`Condition`] is a labelled predicate over a [`ConditionScope`]. The
//! scope names everything a condition may look at: the receiver, the ordered
//! argument list, the call's outcome (for postcondition and exception checks)
//! and a receiver-bound re-invoke capability referring to the contract
//! function under verification. The re-invoke capability is an explicit,
//! named part of the interface so that conditions can be defined recursively
//! in terms of the verified operation itself.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::deferred::{Deferred, DeferredContractFunction};
use crate::errors::{CallOutcome, Thrown};
use crate::function::ContractFunction;
use crate::value::Value;

type CheckFn = dyn Fn(&ConditionScope<'_>) -> Result<Value, Thrown> + Send + Sync;

/// A single contract condition.
///
/// The label is the short, stable rendering used in violation messages. The
/// check returns any [`Value`]; the verifier judges it by truthiness. A check
/// that returns `Err` is a defective condition and surfaces as a
/// [`ConditionMetaError`](crate::errors::ConditionMetaError).
#[derive(Clone)]
pub struct Condition {
    label: Cow<'static, str>,
    check: Arc<CheckFn>,
}

impl Condition {
    pub fn new<L, F>(label: L, check: F) -> Self
    where
        L: Into<Cow<'static, str>>,
        F: Fn(&ConditionScope<'_>) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            check: Arc::new(check),
        }
    }

    /// The canonical always-failing condition: any situation that reaches it
    /// is a violation.
    pub fn must_not_happen() -> Self {
        Condition::new("must not happen", |_| Ok(Value::Boolean(false)))
    }

    /// Short stable rendering of this condition.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn evaluate(&self, scope: &ConditionScope<'_>) -> Result<Value, Thrown> {
        (self.check)(scope)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition({})", self.label)
    }
}

/// The call's outcome, as seen by postcondition and exception-condition
/// checks.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// The implementation returned normally.
    Nominal(&'a Value),

    /// The implementation threw.
    Exceptional(&'a Thrown),
}

/// Receiver-bound reference to the contract function under verification.
#[derive(Clone, Copy)]
pub enum SelfRef<'a> {
    Sync(&'a ContractFunction),
    Deferred(&'a DeferredContractFunction),
}

/// Everything a condition may look at during one evaluation.
pub struct ConditionScope<'a> {
    receiver: &'a Value,
    args: &'a [Value],
    outcome: Option<Outcome<'a>>,
    self_ref: Option<SelfRef<'a>>,
}

impl<'a> ConditionScope<'a> {
    /// Scope for precondition checks: no outcome, no self-reference.
    pub(crate) fn pre(receiver: &'a Value, args: &'a [Value]) -> Self {
        Self {
            receiver,
            args,
            outcome: None,
            self_ref: None,
        }
    }

    /// Extended scope for postcondition checks.
    pub(crate) fn nominal(
        receiver: &'a Value,
        args: &'a [Value],
        result: &'a Value,
        self_ref: SelfRef<'a>,
    ) -> Self {
        Self {
            receiver,
            args,
            outcome: Some(Outcome::Nominal(result)),
            self_ref: Some(self_ref),
        }
    }

    /// Extended scope for exception-condition checks.
    pub(crate) fn exceptional(
        receiver: &'a Value,
        args: &'a [Value],
        exception: &'a Thrown,
        self_ref: SelfRef<'a>,
    ) -> Self {
        Self {
            receiver,
            args,
            outcome: Some(Outcome::Exceptional(exception)),
            self_ref: Some(self_ref),
        }
    }

    pub fn receiver(&self) -> &Value {
        self.receiver
    }

    /// The call's actual arguments, in declaration order.
    pub fn args(&self) -> &[Value] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn outcome(&self) -> Option<Outcome<'a>> {
        self.outcome
    }

    /// The nominal result, when checking postconditions.
    pub fn result(&self) -> Option<&'a Value> {
        match self.outcome {
            Some(Outcome::Nominal(result)) => Some(result),
            _ => None,
        }
    }

    /// The thrown exception, when checking exception conditions.
    pub fn exception(&self) -> Option<&'a Thrown> {
        match self.outcome {
            Some(Outcome::Exceptional(exception)) => Some(exception),
            _ => None,
        }
    }

    pub fn self_ref(&self) -> Option<SelfRef<'a>> {
        self.self_ref
    }

    /// Re-invoke the verified operation with the scope's receiver and the
    /// given arguments, running the full synchronous call protocol.
    ///
    /// Only available in extended scopes of a synchronous contract function;
    /// anywhere else the returned error makes the condition a meta-error.
    pub fn reinvoke(&self, args: &[Value]) -> CallOutcome {
        match self.self_ref {
            Some(SelfRef::Sync(function)) => function.reinvoke(self.receiver, args),
            Some(SelfRef::Deferred(_)) => Err(Thrown::Plain(Value::string(
                "deferred contract function cannot be re-entered synchronously",
            ))),
            None => Err(Thrown::Plain(Value::string(
                "no verified operation is in scope",
            ))),
        }
    }

    /// Start a new deferred call of the verified operation with the scope's
    /// receiver and the given arguments.
    ///
    /// Only available in extended scopes of a deferred contract function.
    pub fn restart(&self, args: &[Value]) -> Result<Deferred, Thrown> {
        match self.self_ref {
            Some(SelfRef::Deferred(function)) => function.reinvoke(self.receiver, args),
            Some(SelfRef::Sync(_)) => Err(Thrown::Plain(Value::string(
                "synchronous contract function does not produce a deferred result",
            ))),
            None => Err(Thrown::Plain(Value::string(
                "no verified operation is in scope",
            ))),
        }
    }
}
