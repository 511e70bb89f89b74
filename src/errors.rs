//! Contract error taxonomy
//!
//! Every verification failure surfaces as a [`ContractError`]. The taxonomy
//! distinguishes "the implementation violated its contract" (a
//! [`ConditionViolation`] leaf) from "the contract's own check is broken" (a
//! [`ConditionMetaError`]), plus the [`AbstractError`] raised by the root
//! specification's placeholder operation.
//!
//! All instances are immutable by construction: fields are private, set once,
//! and only readable afterwards. The violation leaves can only be built by
//! the verifier, never by callers.

use std::fmt;

use thiserror::Error;

use crate::stack::{Location, StackTrace};
use crate::value::Value;

/// Anything an implementation or condition can throw.
///
/// A nested, contract-checked call that fails raises a `Contract` value; the
/// passthrough rule re-raises it unchanged so the deepest, most specific
/// diagnostic is the one the caller observes.
#[derive(Debug, Clone)]
pub enum Thrown {
    /// An ordinary exception value.
    Plain(Value),

    /// An already-classified engine error.
    Contract(Box<ContractError>),
}

impl Thrown {
    /// Whether this thrown value already belongs to the error taxonomy.
    pub fn is_contract(&self) -> bool {
        matches!(self, Thrown::Contract(_))
    }

    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Thrown::Plain(value) => Some(value),
            Thrown::Contract(_) => None,
        }
    }

    pub fn as_contract(&self) -> Option<&ContractError> {
        match self {
            Thrown::Plain(_) => None,
            Thrown::Contract(error) => Some(error),
        }
    }

    /// Full multi-line rendering for detailed diagnostics.
    pub fn detailed(&self) -> String {
        match self {
            Thrown::Plain(value) => value.detailed(),
            Thrown::Contract(error) => error.trace(),
        }
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Thrown::Plain(value) => write!(f, "{}", value),
            Thrown::Contract(error) => write!(f, "{}", error),
        }
    }
}

impl From<Value> for Thrown {
    fn from(value: Value) -> Self {
        Thrown::Plain(value)
    }
}

impl From<ContractError> for Thrown {
    fn from(error: ContractError) -> Self {
        Thrown::Contract(Box::new(error))
    }
}

impl From<crate::value::ValueError> for Thrown {
    fn from(error: crate::value::ValueError) -> Self {
        Thrown::Plain(Value::String(error.to_string()))
    }
}

/// Outcome of invoking an implementation or a wrapped call.
pub type CallOutcome = Result<Value, Thrown>;

/// Result type for contract verification steps.
pub type ContractResult<T> = Result<T, ContractError>;

/// Immutable identification of a contract function, carried by every
/// condition-related error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractFunctionId {
    name: Option<String>,
    location: Location,
    contract_location: Location,
}

impl ContractFunctionId {
    pub(crate) fn new(
        name: Option<String>,
        location: Location,
        contract_location: Location,
    ) -> Self {
        Self {
            name,
            location,
            contract_location,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Where the contract function was created.
    pub fn location(&self) -> Location {
        self.location
    }

    /// Where its contract specification was created.
    pub fn contract_location(&self) -> Location {
        self.contract_location
    }
}

impl fmt::Display for ContractFunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.location),
            None => write!(f, "<anonymous contract function> ({})", self.location),
        }
    }
}

/// Common data carried by every condition-related error: which contract
/// function, which condition, and an ordered snapshot of the actual call.
#[derive(Debug, Clone)]
pub struct ConditionDetail {
    function: ContractFunctionId,
    condition: String,
    receiver: Value,
    argument_snapshot: Vec<Value>,
    stack: StackTrace,
}

impl ConditionDetail {
    pub(crate) fn new(
        function: ContractFunctionId,
        condition: &str,
        receiver: Value,
        argument_snapshot: Vec<Value>,
    ) -> Self {
        Self {
            function,
            condition: condition.to_string(),
            receiver,
            argument_snapshot,
            stack: StackTrace::capture(),
        }
    }

    pub fn function(&self) -> &ContractFunctionId {
        &self.function
    }

    /// Short stable rendering of the failed condition.
    pub fn condition(&self) -> &str {
        &self.condition
    }

    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    /// Ordered copy of the call's actual arguments.
    pub fn argument_snapshot(&self) -> &[Value] {
        &self.argument_snapshot
    }

    pub fn stack(&self) -> &StackTrace {
        &self.stack
    }
}

/// Violation of a contract condition: the condition evaluated, and judged the
/// call wrong.
///
/// The leaves of this family are constructed exclusively by the verifier;
/// there is no public constructor.
#[derive(Error, Debug, Clone)]
pub enum ConditionViolation {
    /// A precondition did not hold. The implementation was never invoked.
    #[error("precondition {} violated on {}", .detail.condition, .detail.function)]
    Precondition { detail: ConditionDetail },

    /// A postcondition did not hold for a nominal result.
    #[error("postcondition {} violated on {}: result was {}", .detail.condition, .detail.function, .result)]
    Postcondition { detail: ConditionDetail, result: Value },

    /// An exception condition did not permit a thrown exception.
    #[error("exception condition {} violated on {}: raised {}", .detail.condition, .detail.function, .exception)]
    Exception {
        detail: ConditionDetail,
        exception: Thrown,
    },
}

impl ConditionViolation {
    pub fn name(&self) -> &'static str {
        match self {
            ConditionViolation::Precondition { .. } => "PreconditionViolation",
            ConditionViolation::Postcondition { .. } => "PostconditionViolation",
            ConditionViolation::Exception { .. } => "ExceptionConditionViolation",
        }
    }

    pub fn detail(&self) -> &ConditionDetail {
        match self {
            ConditionViolation::Precondition { detail }
            | ConditionViolation::Postcondition { detail, .. }
            | ConditionViolation::Exception { detail, .. } => detail,
        }
    }

    /// The captured result, for postcondition violations.
    pub fn result(&self) -> Option<&Value> {
        match self {
            ConditionViolation::Postcondition { result, .. } => Some(result),
            _ => None,
        }
    }

    /// The captured exception, for exception condition violations.
    pub fn exception(&self) -> Option<&Thrown> {
        match self {
            ConditionViolation::Exception { exception, .. } => Some(exception),
            _ => None,
        }
    }
}

/// The condition itself could not be evaluated.
///
/// A check that fails to run cannot be trusted to judge pass or fail, so its
/// own failure is reported instead of being interpreted as "condition
/// returned false". Meta-errors always take precedence over violations at
/// the same check point.
#[derive(Error, Debug, Clone)]
#[error("condition {} on {} could not be evaluated: {}", .detail.condition, .detail.function, .error)]
pub struct ConditionMetaError {
    detail: ConditionDetail,
    error: Thrown,
}

impl ConditionMetaError {
    pub(crate) fn new(detail: ConditionDetail, error: Thrown) -> Self {
        Self { detail, error }
    }

    pub fn detail(&self) -> &ConditionDetail {
        &self.detail
    }

    /// The value thrown by the defective condition.
    pub fn error(&self) -> &Thrown {
        &self.error
    }
}

/// Raised when the root specification's placeholder operation is invoked.
#[derive(Error, Debug, Clone)]
#[error("abstract operation invoked: no implementation exists")]
pub struct AbstractError {
    location: Location,
    stack: StackTrace,
}

impl AbstractError {
    pub(crate) fn new(location: Location) -> Self {
        Self {
            location,
            stack: StackTrace::capture(),
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn stack(&self) -> &StackTrace {
        &self.stack
    }
}

/// Root of the contract error taxonomy.
#[derive(Error, Debug, Clone)]
pub enum ContractError {
    #[error(transparent)]
    Violation(#[from] ConditionViolation),

    #[error(transparent)]
    Meta(#[from] ConditionMetaError),

    #[error(transparent)]
    Abstract(#[from] AbstractError),
}

impl ContractError {
    /// Stable type name of the most specific taxonomy member.
    pub fn name(&self) -> &'static str {
        match self {
            ContractError::Violation(violation) => violation.name(),
            ContractError::Meta(_) => "ConditionMetaError",
            ContractError::Abstract(_) => "AbstractError",
        }
    }

    /// Human-readable one-line message.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// The condition data, for condition-related errors.
    pub fn detail(&self) -> Option<&ConditionDetail> {
        match self {
            ContractError::Violation(violation) => Some(violation.detail()),
            ContractError::Meta(meta) => Some(meta.detail()),
            ContractError::Abstract(_) => None,
        }
    }

    /// Stack snapshot captured at construction, engine frames excluded.
    pub fn stack(&self) -> &StackTrace {
        match self {
            ContractError::Violation(violation) => violation.detail().stack(),
            ContractError::Meta(meta) => meta.detail().stack(),
            ContractError::Abstract(abstract_error) => abstract_error.stack(),
        }
    }

    /// Composed trace string: name, message, and the raw stack.
    pub fn trace(&self) -> String {
        let stack = self.stack();
        if stack.is_empty() {
            format!("{}: {}", self.name(), self)
        } else {
            format!("{}: {}\n{}", self.name(), self, stack)
        }
    }
}

/// Construction-time misuse of the engine, distinct from the raised taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecificationError {
    /// The supplied implementation already carries contract linkage.
    #[error("implementation is already a contract function; wrap the underlying callable instead")]
    AlreadyContracted,
}
