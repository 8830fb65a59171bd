//! Double-entry ledger for small organizations: accounts with running debit
//! and credit totals, pending and posted transfers, recurring schedules that
//! materialize into pending transfers, and manual adjustments.

pub mod account;
pub mod adjustment;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod organization;
pub mod schedule;
pub mod transfer;

pub use account::{
    Account, AccountChanges, AccountCreated, AccountKind, BalanceFloor, CreditCardTerms,
    NewAccount, Polarity, balance_floor_policy, polarity,
};
pub use adjustment::{Adjustment, AdjustmentForm};
pub use error::{BalanceViolation, LedgerError, Result};
pub use ledger::{Clock, FixedClock, Ledger, SystemClock};
pub use money::{Money, MoneyError};
pub use organization::Organization;
pub use schedule::{Cadence, Materialization, MaterializeReport, NewSchedule, Period, Schedule};
pub use transfer::{NewTransfer, Transfer, TransferChanges, TransferState};
