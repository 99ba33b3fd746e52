// Property tests: concurrent credits and debits against one account

use ledger_engine::memory::InMemoryLedgerStore;
use ledger_engine::models::TransactionKind;
use ledger_engine::{LedgerCoordinator, LedgerError, LedgerLimits};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Op {
    Credit(u32),
    Debit(u32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..500).prop_map(Op::Credit),
        (1u32..500).prop_map(Op::Debit),
    ]
}

struct Outcome {
    balance: Decimal,
    committed_delta: Decimal,
    successes: usize,
    records: usize,
    record_delta: Decimal,
}

fn run_interleaved(opening: u32, ops: Vec<Op>) -> Outcome {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let store = Arc::new(InMemoryLedgerStore::new());
        let account_id = store.seed_account("prop", Decimal::from(opening)).id;
        let ledger = Arc::new(LedgerCoordinator::new(store.clone(), LedgerLimits::default()));

        let handles: Vec<_> = ops
            .into_iter()
            .map(|op| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    match op {
                        Op::Credit(n) => (Decimal::from(n), ledger.credit(account_id, Decimal::from(n)).await),
                        Op::Debit(n) => (-Decimal::from(n), ledger.debit(account_id, Decimal::from(n)).await),
                    }
                })
            })
            .collect();

        let mut committed_delta = Decimal::ZERO;
        let mut successes = 0;
        for handle in handles {
            let (delta, result) = handle.await.unwrap();
            match result {
                Ok(receipt) => {
                    assert!(receipt.new_balance >= Decimal::ZERO);
                    committed_delta += delta;
                    successes += 1;
                }
                Err(LedgerError::InsufficientFunds { .. }) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        let records = store.records_for(account_id);
        let record_delta: Decimal = records
            .iter()
            .map(|r| match r.kind {
                TransactionKind::Credit => r.amount,
                TransactionKind::Debit => -r.amount,
            })
            .sum();

        Outcome {
            balance: store.balance(account_id).await.unwrap(),
            committed_delta,
            successes,
            records: records.len(),
            record_delta,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn balance_matches_committed_operations(
        opening in 0u32..2000,
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let outcome = run_interleaved(opening, ops);

        prop_assert!(outcome.balance >= Decimal::ZERO);
        prop_assert_eq!(outcome.balance, Decimal::from(opening) + outcome.committed_delta);
        prop_assert_eq!(outcome.records, outcome.successes);
        prop_assert_eq!(outcome.record_delta, outcome.committed_delta);
    }
}
