#![allow(dead_code)]

use chrono::NaiveDate;
use cuentas::{Account, AccountKind, FixedClock, Ledger, Money, NewAccount, Organization};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn usd(major: i64) -> Money {
    Money::from_major(major)
}

/// An in-memory ledger pinned to `today`, with one organization.
pub fn ledger_on(today: NaiveDate) -> (Ledger, Organization) {
    let mut ledger = Ledger::open_in_memory().expect("in-memory ledger");
    ledger.set_clock(FixedClock(today));
    let org = ledger.create_organization("Acme").expect("organization");
    (ledger, org)
}

pub fn account(ledger: &mut Ledger, org: &Organization, name: &str, kind: AccountKind) -> Account {
    ledger
        .create_account(org.id, NewAccount::new(name, kind))
        .expect("account")
        .account
}

pub fn funded(
    ledger: &mut Ledger,
    org: &Organization,
    name: &str,
    kind: AccountKind,
    balance: Money,
) -> Account {
    ledger
        .create_account(org.id, NewAccount::new(name, kind).with_balance(balance))
        .expect("funded account")
        .account
}
