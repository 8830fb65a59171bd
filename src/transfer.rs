use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::account::{Account, AccountKind, BalanceFloor, Polarity};
use crate::db;
use crate::error::{BalanceViolation, Errors, LedgerError, Result};
use crate::ledger::Ledger;
use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Pending,
    Posted,
}

impl TransferState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferState::Pending => "pending",
            TransferState::Posted => "posted",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferState::Pending),
            "posted" => Ok(TransferState::Posted),
            other => Err(format!("unknown transfer state '{other}'")),
        }
    }
}

impl ToSql for TransferState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransferState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub id: Uuid,
    pub state: TransferState,
    pub amount: Money,
    pub pending_on: NaiveDate,
    pub posted_on: Option<NaiveDate>,
    pub debit_account_id: Uuid,
    pub credit_account_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Transfer {
    pub fn is_pending(&self) -> bool {
        self.state == TransferState::Pending
    }

    pub fn is_posted(&self) -> bool {
        self.state == TransferState::Posted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub debit_account_id: Uuid,
    pub credit_account_id: Uuid,
    pub amount: Money,
    pub pending_on: NaiveDate,
    pub state: TransferState,
    pub posted_on: Option<NaiveDate>,
    pub schedule_id: Option<Uuid>,
}

impl NewTransfer {
    pub fn pending(debit: Uuid, credit: Uuid, amount: Money, pending_on: NaiveDate) -> Self {
        Self {
            debit_account_id: debit,
            credit_account_id: credit,
            amount,
            pending_on,
            state: TransferState::Pending,
            posted_on: None,
            schedule_id: None,
        }
    }

    /// A transfer recorded as already posted.
    pub fn posted(mut self, posted_on: Option<NaiveDate>) -> Self {
        self.state = TransferState::Posted;
        self.posted_on = posted_on;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransferChanges {
    pub amount: Option<Money>,
    pub pending_on: Option<NaiveDate>,
    pub debit_account_id: Option<Uuid>,
    pub credit_account_id: Option<Uuid>,
}

impl TransferChanges {
    fn touches(&self, t: &Transfer) -> bool {
        self.amount.is_some_and(|v| v != t.amount)
            || self.pending_on.is_some_and(|v| v != t.pending_on)
            || self.debit_account_id.is_some_and(|v| v != t.debit_account_id)
            || self.credit_account_id.is_some_and(|v| v != t.credit_account_id)
    }
}

fn validate_fields(new: &NewTransfer) -> Result<()> {
    let mut errors = Errors::default();
    errors.check(new.amount.is_positive(), "amount must be greater than 0");
    errors.check(
        new.debit_account_id != new.credit_account_id,
        "credit_account must be different from debit account",
    );
    if new.state == TransferState::Posted {
        errors.check(
            new.posted_on.is_some(),
            "posted_on must be set for posted transfers",
        );
    }
    errors.finish()
}

fn load_sides(conn: &Connection, debit: Uuid, credit: Uuid) -> Result<(Account, Account)> {
    let debit = db::get_account(conn, debit)?.ok_or_else(|| LedgerError::not_found("account", debit))?;
    let credit =
        db::get_account(conn, credit)?.ok_or_else(|| LedgerError::not_found("account", credit))?;
    Ok((debit, credit))
}

/// Rejects a pending transfer whose posting would leave a credit card with
/// credits below debits, judged against the card's current totals.
fn check_credit_card_headroom(
    debit: &Account,
    credit: &Account,
    amount: Money,
) -> std::result::Result<(), BalanceViolation> {
    let debit_short = debit
        .debits
        .checked_add(amount)
        .is_none_or(|total| debit.credits < total);
    if debit.kind == AccountKind::CreditCard && debit_short {
        return Err(BalanceViolation::CreditCardWouldGoNegative { account: debit.id });
    }
    let credit_short = credit
        .credits
        .checked_add(amount)
        .is_some_and(|total| total < credit.debits);
    if credit.kind == AccountKind::CreditCard && credit_short {
        return Err(BalanceViolation::CreditCardWouldGoNegative { account: credit.id });
    }
    Ok(())
}

/// Posting-time check: a floored debtor account being credited must cover the amount.
fn check_funds(credit: &Account, amount: Money) -> std::result::Result<(), BalanceViolation> {
    if credit.polarity() == Polarity::Debtor && credit.kind.balance_floor() == BalanceFloor::NonNegative {
        let available = credit.posted_balance();
        if available < amount {
            return Err(BalanceViolation::InsufficientFunds {
                account: credit.id,
                available,
                requested: amount,
            });
        }
    }
    Ok(())
}

/// Applies a transfer's effect (or its reversal) to both accounts and saves them.
fn apply_to_accounts(
    conn: &Connection,
    debit: &mut Account,
    credit: &mut Account,
    amount: Money,
) -> Result<()> {
    debit.apply(amount, Money::ZERO)?;
    credit.apply(Money::ZERO, amount)?;
    db::update_account_totals(conn, debit)?;
    db::update_account_totals(conn, credit)?;
    Ok(())
}

/// Validates and stores a transfer inside an open transaction. A transfer
/// created already posted moves the account totals here too.
pub(crate) fn insert_transfer(conn: &Connection, new: NewTransfer) -> Result<Transfer> {
    validate_fields(&new)?;
    let (mut debit, mut credit) = load_sides(conn, new.debit_account_id, new.credit_account_id)?;

    match new.state {
        TransferState::Pending => check_credit_card_headroom(&debit, &credit, new.amount)?,
        TransferState::Posted => {
            check_funds(&credit, new.amount)?;
            apply_to_accounts(conn, &mut debit, &mut credit, new.amount)?;
        }
    }

    let transfer = Transfer {
        id: Uuid::new_v4(),
        state: new.state,
        amount: new.amount,
        pending_on: new.pending_on,
        posted_on: new.posted_on.filter(|_| new.state == TransferState::Posted),
        debit_account_id: new.debit_account_id,
        credit_account_id: new.credit_account_id,
        schedule_id: new.schedule_id,
        created_at: Utc::now(),
    };
    db::insert_transfer(conn, &transfer)?;
    tracing::debug!(
        transfer_id = %transfer.id,
        amount = %transfer.amount,
        state = %transfer.state,
        "transfer recorded"
    );
    Ok(transfer)
}

impl Ledger {
    pub fn create_transfer(&mut self, new: NewTransfer) -> Result<Transfer> {
        let transfer = self.db.write(|tx| insert_transfer(tx, new))?;
        tracing::info!(
            transfer_id = %transfer.id,
            amount = %transfer.amount,
            state = %transfer.state,
            "transfer created"
        );
        Ok(transfer)
    }

    pub fn get_transfer(&self, id: Uuid) -> Result<Transfer> {
        db::get_transfer(self.db.conn(), id)?.ok_or_else(|| LedgerError::not_found("transfer", id))
    }

    pub fn list_transfers(&self) -> Result<Vec<Transfer>> {
        Ok(db::list_transfers(self.db.conn())?)
    }

    pub fn account_transfers(&self, account: Uuid) -> Result<Vec<Transfer>> {
        Ok(db::transfers_touching(self.db.conn(), account)?)
    }

    pub fn schedule_transfers(&self, schedule: Uuid) -> Result<Vec<Transfer>> {
        Ok(db::transfers_for_schedule(self.db.conn(), schedule)?)
    }

    /// Edits a pending transfer. Posted transfers refuse every change.
    pub fn update_transfer(&mut self, id: Uuid, changes: TransferChanges) -> Result<Transfer> {
        self.db.write(|tx| {
            let mut transfer =
                db::get_transfer(tx, id)?.ok_or_else(|| LedgerError::not_found("transfer", id))?;
            if !changes.touches(&transfer) {
                return Ok(transfer);
            }
            if transfer.is_posted() {
                return Err(LedgerError::PostedImmutable);
            }

            let candidate = NewTransfer {
                debit_account_id: changes.debit_account_id.unwrap_or(transfer.debit_account_id),
                credit_account_id: changes.credit_account_id.unwrap_or(transfer.credit_account_id),
                amount: changes.amount.unwrap_or(transfer.amount),
                pending_on: changes.pending_on.unwrap_or(transfer.pending_on),
                state: TransferState::Pending,
                posted_on: None,
                schedule_id: transfer.schedule_id,
            };
            validate_fields(&candidate)?;
            let money_moved = candidate.amount != transfer.amount
                || candidate.debit_account_id != transfer.debit_account_id
                || candidate.credit_account_id != transfer.credit_account_id;
            let (debit, credit) =
                load_sides(tx, candidate.debit_account_id, candidate.credit_account_id)?;
            if money_moved {
                check_credit_card_headroom(&debit, &credit, candidate.amount)?;
            }

            transfer.amount = candidate.amount;
            transfer.pending_on = candidate.pending_on;
            transfer.debit_account_id = candidate.debit_account_id;
            transfer.credit_account_id = candidate.credit_account_id;
            db::update_pending_transfer(tx, &transfer)?;
            Ok(transfer)
        })
    }

    /// Pending -> Posted. Both account totals and the transfer row change in one
    /// transaction, or nothing changes.
    pub fn post_transfer(&mut self, id: Uuid) -> Result<Transfer> {
        let today = self.today();
        let result = self.db.write(|tx| {
            let mut transfer =
                db::get_transfer(tx, id)?.ok_or_else(|| LedgerError::not_found("transfer", id))?;
            if !transfer.is_pending() {
                return Err(LedgerError::NotPending(id));
            }

            let (mut debit, mut credit) =
                load_sides(tx, transfer.debit_account_id, transfer.credit_account_id)?;
            check_funds(&credit, transfer.amount)?;
            apply_to_accounts(tx, &mut debit, &mut credit, transfer.amount)?;

            transfer.state = TransferState::Posted;
            transfer.posted_on = Some(today);
            db::mark_transfer_posted(tx, &transfer)?;
            Ok(transfer)
        });

        match &result {
            Ok(t) => tracing::info!(transfer_id = %id, amount = %t.amount, "transfer posted"),
            Err(err) => tracing::warn!(transfer_id = %id, error = %err, "transfer not posted"),
        }
        result
    }

    /// Deletes a transfer, first reversing its effect if it was posted.
    pub fn destroy_transfer(&mut self, id: Uuid) -> Result<()> {
        let reversed = self.db.write(|tx| {
            let transfer =
                db::get_transfer(tx, id)?.ok_or_else(|| LedgerError::not_found("transfer", id))?;
            if transfer.is_posted() {
                let (mut debit, mut credit) =
                    load_sides(tx, transfer.debit_account_id, transfer.credit_account_id)?;
                apply_to_accounts(tx, &mut debit, &mut credit, -transfer.amount)?;
            }
            db::delete_transfer(tx, id)?;
            Ok(transfer.is_posted())
        })?;
        tracing::info!(transfer_id = %id, reversed, "transfer destroyed");
        Ok(())
    }
}
