//! Property-based tests for ledger invariants
//!
//! Random sequences of operations, most of them doomed to fail, are run
//! against a small ledger. After every step:
//! - Conservation: total supply equals the sum of all balances
//! - Atomicity: a rejected operation changes no balance, allowance or supply
//! - Unlimited allowances are never decremented

use ce_contracts::{Ledger, LedgerConfig};
use ce_protocol::{amount::UNLIMITED, Address, Amount};
use proptest::prelude::*;

const ACCOUNTS: u64 = 5;

#[derive(Debug, Clone)]
enum Op {
    Transfer { caller: u64, to: u64, amount: u64 },
    Approve { caller: u64, spender: u64, amount: u64, unlimited: bool },
    TransferFrom { caller: u64, from: u64, to: u64, amount: u64 },
    Mint { caller: u64, to: u64, amount: u64 },
    Burn { caller: u64, amount: u64 },
    BurnFrom { caller: u64, from: u64, amount: u64 },
    WithdrawStuck { caller: u64 },
}

/// Account 0 is the null account, 1 the owner; `ACCOUNTS` stands for the
/// ledger's own address.
fn account(n: u64, ledger: Address) -> Address {
    if n == ACCOUNTS {
        ledger
    } else {
        Address::from_low_u64_be(n)
    }
}

fn account_strategy() -> impl Strategy<Value = u64> {
    0..=ACCOUNTS
}

fn amount_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![Just(0u64), 1u64..2_000, Just(10_000u64)]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let a = account_strategy;
    prop_oneof![
        (a(), a(), amount_strategy())
            .prop_map(|(caller, to, amount)| Op::Transfer { caller, to, amount }),
        (a(), a(), amount_strategy(), any::<bool>()).prop_map(
            |(caller, spender, amount, unlimited)| Op::Approve {
                caller,
                spender,
                amount,
                unlimited,
            }
        ),
        (a(), a(), a(), amount_strategy()).prop_map(|(caller, from, to, amount)| {
            Op::TransferFrom {
                caller,
                from,
                to,
                amount,
            }
        }),
        (a(), a(), amount_strategy())
            .prop_map(|(caller, to, amount)| Op::Mint { caller, to, amount }),
        (a(), amount_strategy()).prop_map(|(caller, amount)| Op::Burn { caller, amount }),
        (a(), a(), amount_strategy())
            .prop_map(|(caller, from, amount)| Op::BurnFrom { caller, from, amount }),
        a().prop_map(|caller| Op::WithdrawStuck { caller }),
    ]
}

fn fresh_ledger() -> Ledger {
    let config = LedgerConfig {
        decimals: 0,
        initial_supply: 10_000,
        ..LedgerConfig::default()
    };
    let owner = Address::from_low_u64_be(1);
    Ledger::new(Address::from_low_u64_be(0xce), config, owner, owner).unwrap()
}

/// Everything an operation may touch, in comparable form.
fn snapshot(ledger: &Ledger) -> (Amount, Vec<Amount>, Vec<Amount>) {
    let accounts: Vec<Address> = (0..=ACCOUNTS)
        .map(|n| account(n, ledger.address()))
        .collect();
    let balances = accounts.iter().map(|a| ledger.balance_of(a)).collect();
    let allowances = accounts
        .iter()
        .flat_map(|o| accounts.iter().map(move |s| (*o, *s)))
        .map(|(o, s)| ledger.allowance(&o, &s))
        .collect();
    (ledger.total_supply(), balances, allowances)
}

fn sum_of_balances(ledger: &Ledger) -> Amount {
    ledger
        .balances()
        .fold(Amount::zero(), |acc, (_, b)| acc + *b)
}

fn apply(ledger: &mut Ledger, op: &Op) -> bool {
    let at = ledger.address();
    let a = |n: u64| account(n, at);
    let result = match *op {
        Op::Transfer { caller, to, amount } => ledger.transfer(a(caller), a(to), amount.into()),
        Op::Approve {
            caller,
            spender,
            amount,
            unlimited,
        } => {
            let value = if unlimited { UNLIMITED } else { amount.into() };
            ledger.approve(a(caller), a(spender), value)
        }
        Op::TransferFrom {
            caller,
            from,
            to,
            amount,
        } => ledger.transfer_from(a(caller), a(from), a(to), amount.into()),
        Op::Mint { caller, to, amount } => ledger.mint(a(caller), a(to), amount.into()),
        Op::Burn { caller, amount } => ledger.burn(a(caller), amount.into()),
        Op::BurnFrom {
            caller,
            from,
            amount,
        } => ledger.burn_from(a(caller), a(from), amount.into()),
        Op::WithdrawStuck { caller } => ledger.withdraw_stuck_self(a(caller)).map(|_| ()),
    };
    result.is_ok()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn supply_equals_sum_of_balances(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let mut ledger = fresh_ledger();
        for op in &ops {
            apply(&mut ledger, op);
            prop_assert_eq!(ledger.total_supply(), sum_of_balances(&ledger));
        }
    }

    #[test]
    fn rejected_operations_change_nothing(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let mut ledger = fresh_ledger();
        for op in &ops {
            let before = snapshot(&ledger);
            let seq_before = ledger.event_count();
            if !apply(&mut ledger, op) {
                prop_assert_eq!(&snapshot(&ledger), &before);
                prop_assert_eq!(ledger.event_count(), seq_before);
            }
        }
    }

    #[test]
    fn unlimited_allowance_survives_spending(
        spends in prop::collection::vec(1u64..500, 1..20),
    ) {
        let mut ledger = fresh_ledger();
        let owner = Address::from_low_u64_be(1);
        let spender = Address::from_low_u64_be(2);
        let sink = Address::from_low_u64_be(3);
        ledger.approve(owner, spender, UNLIMITED).unwrap();
        for amount in spends {
            let _ = ledger.transfer_from(spender, owner, sink, amount.into());
            prop_assert_eq!(ledger.allowance(&owner, &spender), UNLIMITED);
        }
    }
}
