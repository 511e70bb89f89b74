//! Integration tests for contract enforcement
//!
//! End-to-end scenarios through the public API: wrapping, the synchronous
//! and deferred call protocols, the error taxonomy, and the abstract
//! placeholder operation.

use covenant::{
    abstract_operation, CallOutcome, Condition, ContractError, ContractSpec, Deferred, Thrown,
    Value,
};

use futures::FutureExt;

fn arg_int(scope: &covenant::ConditionScope<'_>, index: usize) -> i64 {
    scope
        .arg(index)
        .and_then(|v| v.as_integer().ok())
        .unwrap_or(i64::MIN)
}

fn double_contract() -> std::sync::Arc<ContractSpec> {
    ContractSpec::builder()
        .require(Condition::new("args[0] > 0", |scope| {
            Ok(Value::Boolean(arg_int(scope, 0) > 0))
        }))
        .ensure(Condition::new("result == args[0] * 2", |scope| {
            let actual = scope.result().and_then(|v| v.as_integer().ok());
            Ok(Value::Boolean(actual == Some(arg_int(scope, 0) * 2)))
        }))
        .build()
}

#[test]
fn test_conforming_implementation_is_transparent() {
    let wrapped = double_contract()
        .implemented_by(|_receiver: &Value, args: &[Value]| -> CallOutcome {
            Ok(Value::Integer(args[0].as_integer()? * 2))
        })
        .unwrap()
        .with_name("double");

    assert_eq!(
        wrapped.call(&Value::Nil, &[Value::Integer(5)]).unwrap(),
        Value::Integer(10)
    );
}

#[test]
fn test_violations_are_classified_and_diagnosable() {
    let wrapped = double_contract()
        .implemented_by(|_receiver: &Value, args: &[Value]| -> CallOutcome {
            Ok(Value::Integer(args[0].as_integer()? * 3))
        })
        .unwrap()
        .with_name("double");

    // Caller at fault: the implementation never runs.
    let precondition = wrapped
        .call(&Value::Nil, &[Value::Integer(-1)])
        .unwrap_err();
    let error = precondition.as_contract().unwrap();
    assert_eq!(error.name(), "PreconditionViolation");
    assert!(error.message().contains("args[0] > 0"));
    assert!(error.message().contains("double"));
    assert!(error.trace().starts_with("PreconditionViolation: "));

    // Implementation at fault: the violation carries the wrong result.
    let postcondition = wrapped.call(&Value::Nil, &[Value::Integer(5)]).unwrap_err();
    let error = postcondition.as_contract().unwrap();
    assert_eq!(error.name(), "PostconditionViolation");
    let ContractError::Violation(violation) = error else {
        panic!("expected a violation");
    };
    assert_eq!(violation.result(), Some(&Value::Integer(15)));
    let detail = violation.detail();
    assert_eq!(detail.argument_snapshot(), &[Value::Integer(5)]);
    assert_eq!(detail.function().name(), Some("double"));
}

#[test]
fn test_default_contract_forbids_exceptions() {
    let contract = ContractSpec::builder().build();
    let wrapped = contract
        .implemented_by(|_receiver: &Value, _args: &[Value]| -> CallOutcome {
            Err(Thrown::Plain(Value::string("unexpected")))
        })
        .unwrap();

    let thrown = wrapped.call(&Value::Nil, &[]).unwrap_err();
    let error = thrown.as_contract().unwrap();
    assert_eq!(error.name(), "ExceptionConditionViolation");
}

#[test]
fn test_deepest_diagnostic_survives_three_layers() {
    let innermost = double_contract()
        .implemented_by(|_receiver: &Value, args: &[Value]| -> CallOutcome {
            Ok(Value::Integer(args[0].as_integer()? * 3))
        })
        .unwrap()
        .with_name("innermost");

    let middle = ContractSpec::builder()
        .build()
        .implemented_by(move |receiver: &Value, args: &[Value]| innermost.call(receiver, args))
        .unwrap()
        .with_name("middle");

    let outer = ContractSpec::builder()
        .build()
        .implemented_by(move |receiver: &Value, args: &[Value]| middle.call(receiver, args))
        .unwrap()
        .with_name("outer");

    let thrown = outer.call(&Value::Nil, &[Value::Integer(5)]).unwrap_err();
    let error = thrown.as_contract().unwrap();
    assert_eq!(error.name(), "PostconditionViolation");
    assert_eq!(error.detail().unwrap().function().name(), Some("innermost"));
}

#[test]
fn test_abstract_operation_raises_abstract_error() {
    let placeholder = abstract_operation("not_yet_implemented");
    let thrown = placeholder.call(&Value::Nil, &[]).unwrap_err();
    let error = thrown.as_contract().unwrap();
    assert_eq!(error.name(), "AbstractError");
    assert!(placeholder.is_for(ContractSpec::root()));
    assert!(placeholder.contract().location().is_internal());
}

#[tokio::test]
async fn test_deferred_contract_end_to_end() {
    let contract = ContractSpec::builder()
        .require(Condition::new("args[0] > 0", |scope| {
            Ok(Value::Boolean(arg_int(scope, 0) > 0))
        }))
        .ensure(Condition::new("result > 0", |scope| {
            Ok(Value::Boolean(
                scope
                    .result()
                    .and_then(|v| v.as_integer().ok())
                    .map_or(false, |n| n > 0),
            ))
        }))
        .build();

    let wrapped = contract
        .deferred_implemented_by(
            |_receiver: &Value, args: &[Value]| -> Result<Deferred, Thrown> {
                let n = args[0].as_integer()?;
                Ok(async move { Ok(Value::Integer(n - 2)) }.boxed())
            },
        )
        .unwrap()
        .with_name("decrement_twice");

    // Conforming resolution.
    let handle = wrapped.call(&Value::Nil, &[Value::Integer(3)]).unwrap();
    assert_eq!(handle.await.unwrap(), Value::Integer(1));

    // Eventual postcondition violation settles the handle as a failure.
    let handle = wrapped.call(&Value::Nil, &[Value::Integer(1)]).unwrap();
    let thrown = handle.await.unwrap_err();
    assert_eq!(
        thrown.as_contract().unwrap().name(),
        "PostconditionViolation"
    );
}

#[tokio::test]
async fn test_deferred_fast_exception_scenario() {
    // Default fast-exception condition: a conforming implementation must
    // not fail synchronously.
    let contract = ContractSpec::builder().build();
    let wrapped = contract
        .deferred_implemented_by(
            |_receiver: &Value, _args: &[Value]| -> Result<Deferred, Thrown> {
                Err(Thrown::Plain(Value::string("failed before deferring")))
            },
        )
        .unwrap();

    let thrown = wrapped.call(&Value::Nil, &[]).err().unwrap();
    let error = thrown.as_contract().unwrap();
    assert_eq!(error.name(), "ExceptionConditionViolation");
    let ContractError::Violation(violation) = error else {
        panic!("expected a violation");
    };
    assert_eq!(
        violation.exception().unwrap().as_plain(),
        Some(&Value::string("failed before deferring"))
    );
}

#[test]
fn test_live_toggles_switch_verification_midstream() {
    let contract = double_contract();
    let wrapped = contract
        .clone()
        .implemented_by(|_receiver: &Value, args: &[Value]| -> CallOutcome {
            Ok(Value::Integer(args[0].as_integer()? * 3))
        })
        .unwrap();

    assert!(wrapped.call(&Value::Nil, &[Value::Integer(5)]).is_err());
    contract.set_verify(false);
    assert_eq!(
        wrapped.call(&Value::Nil, &[Value::Integer(5)]).unwrap(),
        Value::Integer(15)
    );
    contract.set_verify(true);
    contract.set_verify_postconditions(false);
    assert_eq!(
        wrapped.call(&Value::Nil, &[Value::Integer(5)]).unwrap(),
        Value::Integer(15)
    );
    assert!(wrapped.call(&Value::Nil, &[Value::Integer(-5)]).is_err());
}
