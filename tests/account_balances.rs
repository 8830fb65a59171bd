mod common;

use common::{account, date, funded, ledger_on, usd};
use cuentas::{
    AccountChanges, AccountKind, BalanceViolation, CreditCardTerms, LedgerError, Money,
    NewAccount, NewSchedule, Period,
};
use uuid::Uuid;

#[test]
fn seeding_puts_the_balance_on_the_increasing_side() {
    let (mut ledger, org) = ledger_on(date(2024, 6, 15));
    let cash = funded(&mut ledger, &org, "Checking", AccountKind::Cash, usd(250));
    let customer = funded(&mut ledger, &org, "Client", AccountKind::Customer, usd(80));

    assert_eq!((cash.debits, cash.credits), (usd(250), Money::ZERO));
    assert_eq!((customer.debits, customer.credits), (Money::ZERO, usd(80)));

    let cash = ledger.set_posted_balance(cash.id, usd(10)).unwrap();
    assert_eq!((cash.debits, cash.credits), (usd(10), Money::ZERO));
    assert_eq!(ledger.posted_balance(cash.id).unwrap(), usd(10));
}

#[test]
fn negative_seed_is_rejected() {
    let (mut ledger, org) = ledger_on(date(2024, 6, 15));
    let cash = account(&mut ledger, &org, "Checking", AccountKind::Cash);

    let err = ledger.set_posted_balance(cash.id, usd(-5)).unwrap_err();
    assert_eq!(err.messages(), ["posted balance cannot be negative".to_string()]);
    assert_eq!(ledger.posted_balance(cash.id).unwrap(), Money::ZERO);
}

#[test]
fn new_account_validation_reports_all_problems() {
    let (mut ledger, org) = ledger_on(date(2024, 6, 15));

    let err = ledger
        .create_account(org.id, NewAccount::default())
        .unwrap_err();
    assert_eq!(
        err.messages(),
        [
            "name can't be blank".to_string(),
            "kind can't be blank".to_string(),
        ]
    );

    let terms = CreditCardTerms {
        due_day: Some(32),
        statement_day: Some(1),
        credit_limit: Some(Money::ZERO),
    };
    let err = ledger
        .create_account(
            org.id,
            NewAccount::new("Checking", AccountKind::Cash).with_terms(terms),
        )
        .unwrap_err();
    let messages = err.messages();
    assert!(messages.contains(&"due_day must be between 1 and 31".to_string()));
    assert!(messages.contains(&"credit_limit must be greater than 0".to_string()));
    assert!(
        messages.contains(&"credit card terms are only allowed on credit card accounts".to_string())
    );
}

#[test]
fn accounts_need_an_existing_organization() {
    let (mut ledger, _org) = ledger_on(date(2024, 6, 15));
    let err = ledger
        .create_account(Uuid::new_v4(), NewAccount::new("Checking", AccountKind::Cash))
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "organization", .. }));
}

#[test]
fn renaming_and_deactivating_leave_totals_alone() {
    let (mut ledger, org) = ledger_on(date(2024, 6, 15));
    let cash = funded(&mut ledger, &org, "Checking", AccountKind::Cash, usd(40));

    let renamed = ledger
        .update_account(
            cash.id,
            AccountChanges {
                name: Some("  Operating ".to_string()),
                active: Some(false),
            },
        )
        .unwrap();
    assert_eq!(renamed.name, "Operating");
    assert!(!renamed.active);
    assert_eq!(renamed.posted_balance(), usd(40));

    let err = ledger
        .update_account(
            cash.id,
            AccountChanges {
                name: Some(" ".to_string()),
                active: None,
            },
        )
        .unwrap_err();
    assert_eq!(err.messages(), ["name can't be blank".to_string()]);
}

#[test]
fn accounts_list_in_creation_order_per_organization() {
    let (mut ledger, org) = ledger_on(date(2024, 6, 15));
    let other = ledger.create_organization("Side gig").unwrap();
    account(&mut ledger, &org, "Checking", AccountKind::Cash);
    account(&mut ledger, &other, "Wallet", AccountKind::Cash);
    account(&mut ledger, &org, "Landlord", AccountKind::Vendor);

    let names: Vec<String> = ledger
        .list_accounts(org.id)
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, ["Checking", "Landlord"]);
    assert_eq!(ledger.list_organizations().unwrap().len(), 2);
    assert_eq!(
        ledger.find_organization("Side gig").unwrap().map(|o| o.id),
        Some(other.id)
    );
}

#[test]
fn planned_balance_counts_future_occurrences_on_each_side() {
    let today = date(2024, 6, 15);
    let (mut ledger, org) = ledger_on(today);
    let cash = funded(&mut ledger, &org, "Checking", AccountKind::Cash, usd(500));
    let vendor = account(&mut ledger, &org, "Landlord", AccountKind::Vendor);

    ledger
        .create_schedule(
            NewSchedule::once("Rent", vendor.id, cash.id, usd(100), date(2024, 6, 20))
                .every(1, Period::Month),
        )
        .unwrap();

    let through = date(2024, 8, 31);
    assert_eq!(ledger.planned_balance(vendor.id, through).unwrap(), usd(300));
    assert_eq!(ledger.planned_balance(cash.id, through).unwrap(), usd(-300));
    assert_eq!(
        ledger.planned_balance(vendor.id, date(2024, 6, 19)).unwrap(),
        Money::ZERO
    );
}

#[test]
fn vendors_may_be_overdrawn_by_adjustment() {
    let (mut ledger, org) = ledger_on(date(2024, 6, 15));
    let vendor = account(&mut ledger, &org, "Landlord", AccountKind::Vendor);
    let cash = account(&mut ledger, &org, "Checking", AccountKind::Cash);

    ledger
        .create_adjustment(
            vendor.id,
            cuentas::AdjustmentForm::credit(usd(20), "prepaid rent"),
        )
        .unwrap();
    assert_eq!(ledger.posted_balance(vendor.id).unwrap(), usd(-20));

    let err = ledger
        .create_adjustment(cash.id, cuentas::AdjustmentForm::credit(usd(20), "oops"))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Balance(BalanceViolation::NegativeCashBalance { .. })
    ));
}
