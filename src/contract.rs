//! Contract representation and core structures
//!
//! A [`ContractSpec`] is the behavioral specification of one operation:
//! ordered lists of preconditions, postconditions, and exception conditions,
//! plus live verification toggles.
//!
//! # Contract Semantics
//!
//! ## Preconditions
//! - Evaluated before the implementation is invoked
//! - A failed precondition means the implementation never runs; the caller
//!   is to blame
//!
//! ## Postconditions
//! - Evaluated after a nominal return, against the extended condition scope
//!   (arguments, result, bound self-reference)
//! - A failed postcondition blames the implementation
//!
//! ## Exception conditions
//! - Evaluated after the implementation throws
//! - By default no exception is permitted ("must not happen"); an
//!   implementation may only throw what its contract explicitly allows
//!
//! ## Fast exception conditions (deferred operations only)
//! - Evaluated when a deferred implementation throws synchronously, before a
//!   deferred-result handle exists
//! - Default is likewise "must not happen": a conforming deferred
//!   implementation does not fail synchronously
//!
//! Condition lists are defensive, order-preserving copies, immutable after
//! construction. The `verify` / `verify_postconditions` toggles are read at
//! each call and may be flipped while calls are in flight; they are coarse,
//! best-effort live configuration, not a synchronization point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::condition::Condition;
use crate::deferred::{DeferredContractFunction, DeferredImplementation};
use crate::errors::{AbstractError, ContractError, SpecificationError, Thrown};
use crate::function::{Constructible, ContractFunction, Implementation};
use crate::stack::Location;

/// An immutable-after-construction contract specification.
///
/// Created once per contract definition, shared by every contract function
/// wrapped with it. Identity matters: "is this function for this contract"
/// is pointer identity on the shared specification.
pub struct ContractSpec {
    preconditions: Vec<Condition>,
    postconditions: Vec<Condition>,
    exception_conditions: Vec<Condition>,
    fast_exception_conditions: Vec<Condition>,
    location: Location,
    verify: AtomicBool,
    verify_postconditions: AtomicBool,
}

impl ContractSpec {
    pub fn builder() -> ContractSpecBuilder {
        ContractSpecBuilder::new()
    }

    /// The root specification: precondition = always-failing (nothing may
    /// ever satisfy it), otherwise maximally permissive. Used to model
    /// abstract, not-yet-implemented operations.
    ///
    /// Its toggles start disabled, so invoking its placeholder surfaces
    /// [`AbstractError`] rather than a precondition violation; enabling
    /// verification makes every call a precondition violation instead.
    pub fn root() -> &'static Arc<ContractSpec> {
        static ROOT: OnceLock<Arc<ContractSpec>> = OnceLock::new();
        ROOT.get_or_init(|| {
            let spec = ContractSpec {
                preconditions: vec![Condition::new("nothing satisfies this precondition", |_| {
                    Ok(crate::value::Value::Boolean(false))
                })],
                postconditions: Vec::new(),
                exception_conditions: Vec::new(),
                fast_exception_conditions: Vec::new(),
                location: Location::internal(),
                verify: AtomicBool::new(false),
                verify_postconditions: AtomicBool::new(false),
            };
            Arc::new(spec)
        })
    }

    pub fn preconditions(&self) -> &[Condition] {
        &self.preconditions
    }

    pub fn postconditions(&self) -> &[Condition] {
        &self.postconditions
    }

    pub fn exception_conditions(&self) -> &[Condition] {
        &self.exception_conditions
    }

    pub fn fast_exception_conditions(&self) -> &[Condition] {
        &self.fast_exception_conditions
    }

    /// Where this specification was created; the internal sentinel for
    /// engine-generated specifications.
    pub fn location(&self) -> Location {
        self.location
    }

    /// Whether calls through this contract are verified at all.
    pub fn verify(&self) -> bool {
        self.verify.load(Ordering::Relaxed)
    }

    pub fn set_verify(&self, verify: bool) {
        self.verify.store(verify, Ordering::Relaxed);
    }

    /// Whether outcomes are verified (postconditions and exception
    /// conditions). Ignored when `verify` is off.
    pub fn verify_postconditions(&self) -> bool {
        self.verify_postconditions.load(Ordering::Relaxed)
    }

    pub fn set_verify_postconditions(&self, verify: bool) {
        self.verify_postconditions.store(verify, Ordering::Relaxed);
    }

    /// Wrap a synchronous implementation with this contract.
    ///
    /// This is the sole way to obtain a [`ContractFunction`]. Fails if the
    /// implementation already carries contract linkage.
    #[track_caller]
    pub fn implemented_by<I>(
        self: Arc<Self>,
        implementation: I,
    ) -> Result<ContractFunction, SpecificationError>
    where
        I: Implementation + 'static,
    {
        let location = Location::caller();
        debug!(location = %location, "wrapping implementation");
        ContractFunction::wrap_at(self, Arc::new(implementation), None, location)
    }

    /// Wrap an implementation that is also usable as a constructible
    /// template. The wrapped function exposes the same capability,
    /// delegating through the call protocol.
    #[track_caller]
    pub fn template_implemented_by<I>(
        self: Arc<Self>,
        implementation: I,
    ) -> Result<ContractFunction, SpecificationError>
    where
        I: Implementation + Constructible + 'static,
    {
        let location = Location::caller();
        let shared = Arc::new(implementation);
        let template: Arc<dyn Constructible> = shared.clone();
        ContractFunction::wrap_at(self, shared, Some(template), location)
    }

    /// Wrap an implementation that produces a deferred result.
    #[track_caller]
    pub fn deferred_implemented_by<I>(
        self: Arc<Self>,
        implementation: I,
    ) -> Result<DeferredContractFunction, SpecificationError>
    where
        I: DeferredImplementation + 'static,
    {
        let location = Location::caller();
        debug!(location = %location, "wrapping deferred implementation");
        DeferredContractFunction::wrap_at(self, Arc::new(implementation), location)
    }
}

impl std::fmt::Debug for ContractSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractSpec")
            .field("preconditions", &self.preconditions)
            .field("postconditions", &self.postconditions)
            .field("exception_conditions", &self.exception_conditions)
            .field("fast_exception_conditions", &self.fast_exception_conditions)
            .field("location", &self.location)
            .field("verify", &self.verify())
            .field("verify_postconditions", &self.verify_postconditions())
            .finish()
    }
}

/// Fluent construction of a [`ContractSpec`].
///
/// Absent exception and fast-exception lists default to a single
/// [`Condition::must_not_happen`]; use [`allow_any_exception`] /
/// [`allow_any_fast_exception`] for an explicitly permissive (empty) list.
///
/// [`allow_any_exception`]: ContractSpecBuilder::allow_any_exception
/// [`allow_any_fast_exception`]: ContractSpecBuilder::allow_any_fast_exception
#[derive(Debug, Default)]
pub struct ContractSpecBuilder {
    preconditions: Vec<Condition>,
    postconditions: Vec<Condition>,
    exception_conditions: Option<Vec<Condition>>,
    fast_exception_conditions: Option<Vec<Condition>>,
}

impl ContractSpecBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Append a precondition. Declaration order is evaluation order.
    pub fn require(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }

    /// Append a postcondition.
    pub fn ensure(mut self, condition: Condition) -> Self {
        self.postconditions.push(condition);
        self
    }

    /// Append an exception condition, replacing the "must not happen"
    /// default.
    pub fn on_exception(mut self, condition: Condition) -> Self {
        self.exception_conditions
            .get_or_insert_with(Vec::new)
            .push(condition);
        self
    }

    /// Append a fast-exception condition, replacing the "must not happen"
    /// default.
    pub fn on_fast_exception(mut self, condition: Condition) -> Self {
        self.fast_exception_conditions
            .get_or_insert_with(Vec::new)
            .push(condition);
        self
    }

    /// Permit any thrown exception (an explicitly empty condition list).
    pub fn allow_any_exception(mut self) -> Self {
        self.exception_conditions.get_or_insert_with(Vec::new);
        self
    }

    /// Permit any fast exception.
    pub fn allow_any_fast_exception(mut self) -> Self {
        self.fast_exception_conditions.get_or_insert_with(Vec::new);
        self
    }

    /// Build the specification, capturing the caller as its creation site.
    /// Verification starts fully enabled.
    #[track_caller]
    pub fn build(self) -> Arc<ContractSpec> {
        Arc::new(ContractSpec {
            preconditions: self.preconditions,
            postconditions: self.postconditions,
            exception_conditions: self
                .exception_conditions
                .unwrap_or_else(|| vec![Condition::must_not_happen()]),
            fast_exception_conditions: self
                .fast_exception_conditions
                .unwrap_or_else(|| vec![Condition::must_not_happen()]),
            location: Location::caller(),
            verify: AtomicBool::new(true),
            verify_postconditions: AtomicBool::new(true),
        })
    }
}

/// The root specification's placeholder operation.
///
/// Invoking the returned contract function raises [`AbstractError`]; it
/// models an operation that is specified but not yet implemented.
pub fn abstract_operation(name: &str) -> ContractFunction {
    let placeholder = move |_receiver: &crate::value::Value,
                            _args: &[crate::value::Value]|
          -> crate::errors::CallOutcome {
        Err(Thrown::from(ContractError::from(AbstractError::new(
            Location::internal(),
        ))))
    };
    // Wrapping a plain closure cannot already carry linkage.
    match ContractFunction::wrap_at(
        ContractSpec::root().clone(),
        Arc::new(placeholder),
        None,
        Location::internal(),
    ) {
        Ok(function) => function.with_name(name),
        Err(_) => unreachable!("placeholder implementation is never contracted"),
    }
}
