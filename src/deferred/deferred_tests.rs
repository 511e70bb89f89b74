//! Tests for the deferred call protocol

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::condition::Condition;
use crate::errors::ContractError;

fn arg_int(scope: &ConditionScope<'_>, index: usize) -> i64 {
    scope
        .arg(index)
        .and_then(|v| v.as_integer().ok())
        .unwrap_or(i64::MIN)
}

fn resolves_to(value: Value) -> impl Fn(&Value, &[Value]) -> Result<Deferred, Thrown> {
    move |_receiver: &Value, _args: &[Value]| {
        let value = value.clone();
        Ok(async move { Ok(value) }.boxed())
    }
}

fn rejects_with(reason: Value) -> impl Fn(&Value, &[Value]) -> Result<Deferred, Thrown> {
    move |_receiver: &Value, _args: &[Value]| {
        let reason = reason.clone();
        Ok(async move { Err(Thrown::Plain(reason)) }.boxed())
    }
}

fn throws_synchronously(reason: Value) -> impl Fn(&Value, &[Value]) -> Result<Deferred, Thrown> {
    move |_receiver: &Value, _args: &[Value]| Err(Thrown::Plain(reason.clone()))
}

/// Contract: args[0] > 0, eventual result > 0.
fn positive_contract() -> Arc<ContractSpec> {
    ContractSpec::builder()
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
        .build()
}

// ===== Nominal Path Tests =====

#[tokio::test]
async fn test_conforming_deferred_call_resolves_unchanged() {
    let wrapped = positive_contract()
        .deferred_implemented_by(resolves_to(Value::Integer(7)))
        .unwrap();
    let handle = wrapped.call(&Value::Nil, &[Value::Integer(1)]).unwrap();
    assert_eq!(handle.await.unwrap(), Value::Integer(7));
}

#[tokio::test]
async fn test_precondition_violation_is_synchronous() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();
    let wrapped = positive_contract()
        .deferred_implemented_by(
            move |_receiver: &Value, _args: &[Value]| -> Result<Deferred, Thrown> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(async { Ok(Value::Integer(1)) }.boxed())
            },
        )
        .unwrap();
    // No handle is produced at all; the failure is immediate.
    let thrown = wrapped
        .call(&Value::Nil, &[Value::Integer(-1)])
        .err()
        .unwrap();
    assert_eq!(thrown.as_contract().unwrap().name(), "PreconditionViolation");
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_eventual_postcondition_violation_settles_the_handle() {
    let wrapped = positive_contract()
        .deferred_implemented_by(resolves_to(Value::Integer(-1)))
        .unwrap();
    let handle = wrapped.call(&Value::Nil, &[Value::Integer(1)]).unwrap();
    let thrown = handle.await.unwrap_err();
    let error = thrown.as_contract().unwrap();
    assert_eq!(error.name(), "PostconditionViolation");
    let ContractError::Violation(violation) = error else {
        panic!("expected a violation");
    };
    assert_eq!(violation.result(), Some(&Value::Integer(-1)));
}

#[tokio::test]
async fn test_outcome_checks_run_strictly_after_settlement() {
    let settled = Arc::new(AtomicBool::new(false));

    let observed = settled.clone();
    let contract = ContractSpec::builder()
        .ensure(Condition::new("checked after settlement", move |_| {
            Ok(Value::Boolean(observed.load(Ordering::SeqCst)))
        }))
        .build();

    let marker = settled.clone();
    let wrapped = contract
        .deferred_implemented_by(
            move |_receiver: &Value, _args: &[Value]| -> Result<Deferred, Thrown> {
                let marker = marker.clone();
                Ok(async move {
                    marker.store(true, Ordering::SeqCst);
                    Ok(Value::Integer(1))
                }
                .boxed())
            },
        )
        .unwrap();

    let handle = wrapped.call(&Value::Nil, &[]).unwrap();
    // The postcondition only holds if it was evaluated after the underlying
    // deferred result settled.
    assert_eq!(handle.await.unwrap(), Value::Integer(1));
}

// ===== Fast Exception Tests =====

#[tokio::test]
async fn test_synchronous_throw_is_a_fast_exception_by_default() {
    let wrapped = positive_contract()
        .deferred_implemented_by(throws_synchronously(Value::string("sync boom")))
        .unwrap();
    let thrown = wrapped
        .call(&Value::Nil, &[Value::Integer(1)])
        .err()
        .unwrap();
    let error = thrown.as_contract().unwrap();
    // Classified by the fast-exception check, not the ordinary one.
    assert_eq!(error.name(), "ExceptionConditionViolation");
    let ContractError::Violation(violation) = error else {
        panic!("expected a violation");
    };
    assert_eq!(
        violation.exception().unwrap().as_plain(),
        Some(&Value::string("sync boom"))
    );
}

#[tokio::test]
async fn test_permitted_fast_exception_is_rethrown_unchanged() {
    let contract = ContractSpec::builder().allow_any_fast_exception().build();
    let wrapped = contract
        .deferred_implemented_by(throws_synchronously(Value::string("permitted")))
        .unwrap();
    let thrown = wrapped.call(&Value::Nil, &[]).err().unwrap();
    assert_eq!(thrown.as_plain(), Some(&Value::string("permitted")));
}

#[tokio::test]
async fn test_fast_exception_and_rejection_use_distinct_condition_sets() {
    // Fast exceptions permitted, eventual rejections not.
    let contract = ContractSpec::builder().allow_any_fast_exception().build();

    let fast = contract
        .clone()
        .deferred_implemented_by(throws_synchronously(Value::string("fast")))
        .unwrap();
    let thrown = fast.call(&Value::Nil, &[]).err().unwrap();
    assert!(thrown.as_plain().is_some());

    let eventual = contract
        .deferred_implemented_by(rejects_with(Value::string("eventual")))
        .unwrap();
    let handle = eventual.call(&Value::Nil, &[]).unwrap();
    let thrown = handle.await.unwrap_err();
    assert_eq!(
        thrown.as_contract().unwrap().name(),
        "ExceptionConditionViolation"
    );
}

// ===== Rejection Tests =====

#[tokio::test]
async fn test_permitted_rejection_settles_with_original_reason() {
    let contract = ContractSpec::builder()
        .on_exception(Condition::new("rejection is a string", |scope| {
            Ok(Value::Boolean(
                scope
                    .exception()
                    .and_then(|t| t.as_plain())
                    .map_or(false, Value::is_string),
            ))
        }))
        .build();
    let wrapped = contract
        .deferred_implemented_by(rejects_with(Value::string("expected failure")))
        .unwrap();
    let handle = wrapped.call(&Value::Nil, &[]).unwrap();
    let thrown = handle.await.unwrap_err();
    assert_eq!(thrown.as_plain(), Some(&Value::string("expected failure")));
}

#[tokio::test]
async fn test_nested_contract_rejection_passes_through_unchanged() {
    let inner = ContractSpec::builder()
        .build()
        .deferred_implemented_by(rejects_with(Value::string("inner failure")))
        .unwrap()
        .with_name("inner");

    let outer = ContractSpec::builder()
        .build()
        .deferred_implemented_by(
            move |receiver: &Value, args: &[Value]| -> Result<Deferred, Thrown> {
                inner.call(receiver, args)
            },
        )
        .unwrap()
        .with_name("outer");

    let handle = outer.call(&Value::Nil, &[]).unwrap();
    let thrown = handle.await.unwrap_err();
    let error = thrown.as_contract().unwrap();
    assert_eq!(error.name(), "ExceptionConditionViolation");
    assert_eq!(error.detail().unwrap().function().name(), Some("inner"));
}

// ===== Toggle Tests =====

#[tokio::test]
async fn test_verify_off_returns_raw_handle() {
    let contract = positive_contract();
    let wrapped = contract
        .clone()
        .deferred_implemented_by(resolves_to(Value::Integer(-5)))
        .unwrap();
    contract.set_verify(false);
    let handle = wrapped.call(&Value::Nil, &[Value::Integer(-1)]).unwrap();
    assert_eq!(handle.await.unwrap(), Value::Integer(-5));
}

#[tokio::test]
async fn test_verify_postconditions_off_skips_settlement_checks() {
    let contract = positive_contract();
    let wrapped = contract
        .clone()
        .deferred_implemented_by(resolves_to(Value::Integer(-5)))
        .unwrap();
    contract.set_verify_postconditions(false);

    let thrown = wrapped
        .call(&Value::Nil, &[Value::Integer(-1)])
        .err()
        .unwrap();
    assert_eq!(thrown.as_contract().unwrap().name(), "PreconditionViolation");

    let handle = wrapped.call(&Value::Nil, &[Value::Integer(1)]).unwrap();
    assert_eq!(handle.await.unwrap(), Value::Integer(-5));
}

// ===== Partial Application Tests =====

#[tokio::test]
async fn test_bind_keeps_contract_and_prepends_arguments() {
    let contract = positive_contract();
    let wrapped = contract
        .clone()
        .deferred_implemented_by(resolves_to(Value::Integer(3)))
        .unwrap();
    let bound = wrapped.bind(Value::Nil, &[Value::Integer(9)]);
    assert!(bound.is_for(&contract));
    assert_eq!(bound.location(), wrapped.location());
    // The bound leading argument satisfies the precondition by itself.
    let handle = bound.call(&Value::Nil, &[]).unwrap();
    assert_eq!(handle.await.unwrap(), Value::Integer(3));
}

#[tokio::test]
async fn test_rebinding_accumulates_leading_arguments() {
    let contract = ContractSpec::builder().build();
    let collect = contract
        .deferred_implemented_by(
            |_receiver: &Value, args: &[Value]| -> Result<Deferred, Thrown> {
                let echoed = Value::List(args.to_vec());
                Ok(async move { Ok(echoed) }.boxed())
            },
        )
        .unwrap();
    let rebound = collect
        .bind(Value::Nil, &[Value::Integer(1)])
        .bind(Value::Nil, &[Value::Integer(2)]);
    let handle = rebound.call(&Value::Nil, &[Value::Integer(3)]).unwrap();
    assert_eq!(
        handle.await.unwrap(),
        Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
    );
}

// ===== Re-invoke Capability Tests =====

#[tokio::test]
async fn test_deferred_scope_cannot_reinvoke_synchronously() {
    let contract = ContractSpec::builder()
        .ensure(Condition::new("sync reinvoke is illegal here", |scope| {
            match scope.reinvoke(&[]) {
                Err(thrown) if !thrown.is_contract() => Ok(Value::Boolean(true)),
                _ => Ok(Value::Boolean(false)),
            }
        }))
        .build();
    let wrapped = contract
        .deferred_implemented_by(resolves_to(Value::Integer(1)))
        .unwrap();
    let handle = wrapped.call(&Value::Nil, &[]).unwrap();
    assert_eq!(handle.await.unwrap(), Value::Integer(1));
}

#[tokio::test]
async fn test_deferred_scope_can_restart_the_operation() {
    let contract = ContractSpec::builder()
        .ensure(Condition::new("self can be restarted", |scope| {
            // Only restart from the initial call, to keep the recursion
            // finite; the fresh handle is a valid deferred result.
            if arg_int(scope, 0) > 0 {
                let handle = scope.restart(&[Value::Integer(0)])?;
                drop(handle);
            }
            Ok(Value::Boolean(true))
        }))
        .build();
    let wrapped = contract
        .deferred_implemented_by(resolves_to(Value::Integer(1)))
        .unwrap();
    let handle = wrapped.call(&Value::Nil, &[Value::Integer(1)]).unwrap();
    assert_eq!(handle.await.unwrap(), Value::Integer(1));
}
