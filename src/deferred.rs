//! Asynchronous call protocol for deferred results
//!
//! A deferred result is a handle that settles exactly once, later, as either
//! a resolved value or a failure reason; here it is a boxed future of a
//! [`CallOutcome`]. The protocol mirrors the synchronous one in spirit:
//!
//! - preconditions are checked before the implementation is invoked;
//! - an exception thrown synchronously, before a handle exists, is a **fast
//!   exception**, checked against the contract's fast-exception conditions
//!   (by default: must not happen);
//! - the settled outcome is verified strictly after settlement, exactly once
//!   per settlement, against postconditions or exception conditions;
//! - failures that already belong to the error taxonomy propagate unchanged.
//!
//! There is no cancellation or timeout primitive; once invoked, the protocol
//! assumes the deferred result eventually settles.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, trace};

use crate::condition::{ConditionScope, SelfRef};
use crate::contract::ContractSpec;
use crate::errors::{CallOutcome, ContractFunctionId, SpecificationError, Thrown};
use crate::function::BoundPrefix;
use crate::stack::Location;
use crate::value::Value;
use crate::verifier::{self, Check};

/// A deferred result: settles exactly once with a call outcome.
pub type Deferred = BoxFuture<'static, CallOutcome>;

/// An implementation callable that produces a deferred result.
///
/// Returning `Err` models an exception thrown synchronously, before any
/// deferred-result handle was produced.
pub trait DeferredImplementation: Send + Sync {
    fn invoke(&self, receiver: &Value, args: &[Value]) -> Result<Deferred, Thrown>;

    /// Whether this callable already carries contract linkage.
    fn is_contracted(&self) -> bool {
        false
    }
}

impl<F> DeferredImplementation for F
where
    F: Fn(&Value, &[Value]) -> Result<Deferred, Thrown> + Send + Sync,
{
    fn invoke(&self, receiver: &Value, args: &[Value]) -> Result<Deferred, Thrown> {
        self(receiver, args)
    }
}

/// A deferred-result callable carrying immutable contract linkage.
#[derive(Clone)]
pub struct DeferredContractFunction {
    contract: Arc<ContractSpec>,
    implementation: Arc<dyn DeferredImplementation>,
    location: Location,
    name: Option<Arc<str>>,
    bound: Option<Arc<BoundPrefix>>,
}

impl DeferredContractFunction {
    pub(crate) fn wrap_at(
        contract: Arc<ContractSpec>,
        implementation: Arc<dyn DeferredImplementation>,
        location: Location,
    ) -> Result<Self, SpecificationError> {
        if implementation.is_contracted() {
            return Err(SpecificationError::AlreadyContracted);
        }
        Ok(Self {
            contract,
            implementation,
            location,
            name: None,
            bound: None,
        })
    }

    /// Attach a human-readable name, used in violation messages.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(Arc::from(name));
        self
    }

    pub fn contract(&self) -> &Arc<ContractSpec> {
        &self.contract
    }

    pub fn implementation(&self) -> &Arc<dyn DeferredImplementation> {
        &self.implementation
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether this function is linked to exactly this contract.
    pub fn is_for(&self, contract: &Arc<ContractSpec>) -> bool {
        Arc::ptr_eq(&self.contract, contract)
    }

    /// Invoke the wrapped implementation through the deferred call protocol.
    ///
    /// `Err` is a failure raised before any handle existed: a precondition
    /// violation, a fast-exception classification, or the implementation's
    /// own synchronous throw.
    pub fn call(&self, receiver: &Value, args: &[Value]) -> Result<Deferred, Thrown> {
        match &self.bound {
            None => run(self, receiver, args),
            Some(bound) => {
                let effective = bound.effective_args(args);
                run(self, &bound.receiver, &effective)
            }
        }
    }

    /// Partial application: fix the receiver and leading arguments.
    /// Binding an already-bound function accumulates: the originally bound
    /// receiver stays fixed and the new leading arguments follow the
    /// existing ones.
    pub fn bind(&self, receiver: Value, leading: &[Value]) -> DeferredContractFunction {
        let bound = match &self.bound {
            None => BoundPrefix {
                receiver,
                leading: leading.to_vec(),
            },
            Some(existing) => existing.rebind(leading),
        };
        DeferredContractFunction {
            contract: self.contract.clone(),
            implementation: self.implementation.clone(),
            location: self.location,
            name: self.name.clone(),
            bound: Some(Arc::new(bound)),
        }
    }

    /// Start a fresh protocol run with explicit receiver and full argument
    /// list, ignoring any bound prefix. This is the re-invoke capability
    /// handed to conditions.
    pub(crate) fn reinvoke(&self, receiver: &Value, args: &[Value]) -> Result<Deferred, Thrown> {
        run(self, receiver, args)
    }

    pub(crate) fn id(&self) -> ContractFunctionId {
        ContractFunctionId::new(
            self.name.as_deref().map(str::to_string),
            self.location,
            self.contract.location(),
        )
    }
}

impl DeferredImplementation for DeferredContractFunction {
    fn invoke(&self, receiver: &Value, args: &[Value]) -> Result<Deferred, Thrown> {
        self.call(receiver, args)
    }

    fn is_contracted(&self) -> bool {
        true
    }
}

impl fmt::Debug for DeferredContractFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredContractFunction")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("contract_location", &self.contract.location())
            .field("bound", &self.bound.is_some())
            .finish()
    }
}

impl fmt::Display for DeferredContractFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

fn run(
    function: &DeferredContractFunction,
    receiver: &Value,
    args: &[Value],
) -> Result<Deferred, Thrown> {
    let contract = function.contract();

    if !contract.verify() {
        trace!("verification disabled, invoking implementation directly");
        return function.implementation.invoke(receiver, args);
    }

    let id = function.id();

    let scope = ConditionScope::pre(receiver, args);
    verifier::verify_all(&id, Check::Precondition, contract.preconditions(), &scope)
        .map_err(Thrown::from)?;

    let handle = match function.implementation.invoke(receiver, args) {
        Ok(handle) => handle,
        Err(exception) => {
            // Thrown before a deferred handle existed: a fast exception.
            if exception.is_contract() {
                debug!("passing through nested contract failure unchanged");
                return Err(exception);
            }
            let scope = ConditionScope::exceptional(
                receiver,
                args,
                &exception,
                SelfRef::Deferred(function),
            );
            verifier::verify_all(
                &id,
                Check::Exception {
                    exception: &exception,
                },
                contract.fast_exception_conditions(),
                &scope,
            )
            .map_err(Thrown::from)?;
            return Err(exception);
        }
    };

    if !contract.verify_postconditions() {
        trace!("outcome verification disabled, returning raw handle");
        return Ok(handle);
    }

    // Settle-time continuation: outcome checks run strictly after the
    // underlying handle settles, exactly once per settlement.
    let function = function.clone();
    let receiver = receiver.clone();
    let args = args.to_vec();
    Ok(async move {
        let settled = handle.await;
        let contract = function.contract();
        let id = function.id();
        match settled {
            Ok(resolution) => {
                let scope = ConditionScope::nominal(
                    &receiver,
                    &args,
                    &resolution,
                    SelfRef::Deferred(&function),
                );
                verifier::verify_all(
                    &id,
                    Check::Postcondition {
                        result: &resolution,
                    },
                    contract.postconditions(),
                    &scope,
                )
                .map_err(Thrown::from)?;
                Ok(resolution)
            }
            Err(rejection) => {
                if rejection.is_contract() {
                    debug!("passing through nested contract failure unchanged");
                    return Err(rejection);
                }
                let scope = ConditionScope::exceptional(
                    &receiver,
                    &args,
                    &rejection,
                    SelfRef::Deferred(&function),
                );
                verifier::verify_all(
                    &id,
                    Check::Exception {
                        exception: &rejection,
                    },
                    contract.exception_conditions(),
                    &scope,
                )
                .map_err(Thrown::from)?;
                Err(rejection)
            }
        }
    }
    .boxed())
}

#[cfg(test)]
mod deferred_tests;
