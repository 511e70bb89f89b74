//! Covenant: runtime design-by-contract enforcement for callables
//!
//! Given a specification of preconditions, nominal postconditions, and
//! exceptional postconditions, this crate produces a wrapped,
//! call-compatible version of an implementation that verifies those
//! conditions at every invocation and raises precisely classified errors
//! when they fail.
//!
//! # Example
//!
//! ```
//! use covenant::{Condition, ContractSpec, Value};
//!
//! let contract = ContractSpec::builder()
//!     .require(Condition::new("args[0] > 0", |scope| {
//!         Ok(Value::Boolean(scope.arg(0).map_or(false, |v| {
//!             v.as_integer().map_or(false, |n| n > 0)
//!         })))
//!     }))
//!     .ensure(Condition::new("result == args[0] * 2", |scope| {
//!         let expected = scope.arg(0).and_then(|v| v.as_integer().ok());
//!         let actual = scope.result().and_then(|v| v.as_integer().ok());
//!         Ok(Value::Boolean(expected.map(|n| n * 2) == actual))
//!     }))
//!     .build();
//!
//! let double = contract
//!     .implemented_by(|_receiver: &Value, args: &[Value]| -> covenant::CallOutcome {
//!         Ok(Value::Integer(args[0].as_integer()? * 2))
//!     })
//!     .unwrap()
//!     .with_name("double");
//!
//! let result = double.call(&Value::Nil, &[Value::Integer(5)]).unwrap();
//! assert_eq!(result, Value::Integer(10));
//!
//! // Violating the precondition raises before the implementation runs.
//! let err = double.call(&Value::Nil, &[Value::Integer(-1)]).unwrap_err();
//! assert_eq!(err.as_contract().unwrap().name(), "PreconditionViolation");
//! ```

pub mod condition;
pub mod contract;
pub mod deferred;
pub mod errors;
pub mod function;
pub mod stack;
pub mod value;

mod invocation;
mod verifier;

pub use condition::{Condition, ConditionScope, Outcome, SelfRef};
pub use contract::{abstract_operation, ContractSpec, ContractSpecBuilder};
pub use deferred::{Deferred, DeferredContractFunction, DeferredImplementation};
pub use errors::{
    AbstractError, CallOutcome, ConditionDetail, ConditionMetaError, ConditionViolation,
    ContractError, ContractFunctionId, ContractResult, SpecificationError, Thrown,
};
pub use function::{Constructible, ContractFunction, Implementation};
pub use stack::{Location, StackTrace};
pub use value::{Value, ValueError, ValueResult};
