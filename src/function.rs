//! Contract function wrapper
//!
//! A [`ContractFunction`] is an explicit adapter owning references to an
//! implementation callable and its [`ContractSpec`], delegating the call
//! while running the verification protocol. The linkage (contract,
//! implementation, creation location) is immutable for the wrapper's
//! lifetime.

use std::fmt;
use std::sync::Arc;

use crate::contract::ContractSpec;
use crate::errors::{CallOutcome, ContractFunctionId, SpecificationError, Thrown};
use crate::invocation;
use crate::stack::Location;
use crate::value::Value;

/// A synchronous implementation callable.
///
/// Implemented for any `Fn(&Value, &[Value]) -> CallOutcome`, and for
/// [`ContractFunction`] itself so contracted calls nest naturally.
pub trait Implementation: Send + Sync {
    fn invoke(&self, receiver: &Value, args: &[Value]) -> CallOutcome;

    /// Whether this callable already carries contract linkage. Guards
    /// against double wrapping.
    fn is_contracted(&self) -> bool {
        false
    }
}

impl<F> Implementation for F
where
    F: Fn(&Value, &[Value]) -> CallOutcome + Send + Sync,
{
    fn invoke(&self, receiver: &Value, args: &[Value]) -> CallOutcome {
        self(receiver, args)
    }
}

/// Explicit capability for implementations that can also be used as a
/// constructible template.
///
/// A contract function wrapping such an implementation exposes the same
/// capability, structurally delegating through the call protocol, so it can
/// replace its implementation wherever the implementation could be used.
pub trait Constructible: Send + Sync {
    fn construct(&self, args: &[Value]) -> CallOutcome;
}

/// Receiver and leading arguments fixed by partial application.
#[derive(Debug)]
pub(crate) struct BoundPrefix {
    pub(crate) receiver: Value,
    pub(crate) leading: Vec<Value>,
}

impl BoundPrefix {
    pub(crate) fn effective_args(&self, args: &[Value]) -> Vec<Value> {
        let mut effective = Vec::with_capacity(self.leading.len() + args.len());
        effective.extend_from_slice(&self.leading);
        effective.extend_from_slice(args);
        effective
    }

    /// Bind again: the originally bound receiver stays fixed, the new
    /// leading arguments follow the existing ones.
    pub(crate) fn rebind(&self, leading: &[Value]) -> BoundPrefix {
        BoundPrefix {
            receiver: self.receiver.clone(),
            leading: self.effective_args(leading),
        }
    }
}

/// A callable carrying immutable contract linkage.
#[derive(Clone)]
pub struct ContractFunction {
    contract: Arc<ContractSpec>,
    implementation: Arc<dyn Implementation>,
    template: Option<Arc<dyn Constructible>>,
    location: Location,
    name: Option<Arc<str>>,
    bound: Option<Arc<BoundPrefix>>,
}

impl ContractFunction {
    pub(crate) fn wrap_at(
        contract: Arc<ContractSpec>,
        implementation: Arc<dyn Implementation>,
        template: Option<Arc<dyn Constructible>>,
        location: Location,
    ) -> Result<Self, SpecificationError> {
        if implementation.is_contracted() {
            return Err(SpecificationError::AlreadyContracted);
        }
        Ok(Self {
            contract,
            implementation,
            template,
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

    /// The contract this function is linked to.
    pub fn contract(&self) -> &Arc<ContractSpec> {
        &self.contract
    }

    /// The wrapped implementation.
    pub fn implementation(&self) -> &Arc<dyn Implementation> {
        &self.implementation
    }

    /// Where this contract function was created.
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

    /// Whether this function supports being used as a constructible
    /// template.
    pub fn is_constructible(&self) -> bool {
        self.template.is_some()
    }

    /// Invoke the wrapped implementation through the synchronous call
    /// protocol.
    pub fn call(&self, receiver: &Value, args: &[Value]) -> CallOutcome {
        match &self.bound {
            None => invocation::run(self, receiver, args),
            Some(bound) => {
                let effective = bound.effective_args(args);
                invocation::run(self, &bound.receiver, &effective)
            }
        }
    }

    /// Use the wrapped implementation as a constructible template, through
    /// the same call protocol.
    pub fn construct(&self, args: &[Value]) -> CallOutcome {
        let Some(template) = &self.template else {
            return Err(Thrown::Plain(Value::string(
                "implementation is not constructible",
            )));
        };
        match &self.bound {
            None => invocation::run_construct(self, template.as_ref(), args),
            Some(bound) => {
                let effective = bound.effective_args(args);
                invocation::run_construct(self, template.as_ref(), &effective)
            }
        }
    }

    /// Partial application: fix the receiver and leading arguments.
    ///
    /// The result is itself a valid contract function with the same contract
    /// and location, wrapping a correspondingly bound implementation.
    /// Binding an already-bound function accumulates: the originally bound
    /// receiver stays fixed and the new leading arguments follow the
    /// existing ones.
    pub fn bind(&self, receiver: Value, leading: &[Value]) -> ContractFunction {
        let bound = match &self.bound {
            None => BoundPrefix {
                receiver,
                leading: leading.to_vec(),
            },
            Some(existing) => existing.rebind(leading),
        };
        ContractFunction {
            contract: self.contract.clone(),
            implementation: self.implementation.clone(),
            // Partial application drops the constructible capability.
            template: None,
            location: self.location,
            name: self.name.clone(),
            bound: Some(Arc::new(bound)),
        }
    }

    /// Run the protocol against explicit receiver and full argument list,
    /// ignoring any bound prefix. This is the re-invoke capability handed to
    /// conditions.
    pub(crate) fn reinvoke(&self, receiver: &Value, args: &[Value]) -> CallOutcome {
        invocation::run(self, receiver, args)
    }

    pub(crate) fn id(&self) -> ContractFunctionId {
        ContractFunctionId::new(
            self.name.as_deref().map(str::to_string),
            self.location,
            self.contract.location(),
        )
    }
}

impl Implementation for ContractFunction {
    fn invoke(&self, receiver: &Value, args: &[Value]) -> CallOutcome {
        self.call(receiver, args)
    }

    fn is_contracted(&self) -> bool {
        true
    }
}

impl fmt::Debug for ContractFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractFunction")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("contract_location", &self.contract.location())
            .field("bound", &self.bound.is_some())
            .finish()
    }
}

impl fmt::Display for ContractFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}
