use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::account::AccountKind;
use crate::db;
use crate::error::{Errors, LedgerError, Result};
use crate::ledger::Ledger;
use crate::money::Money;

/// A manual correction to one side of an account's running totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Adjustment {
    pub id: Uuid,
    pub account_id: Uuid,
    pub credit_amount: Option<Money>,
    pub debit_amount: Option<Money>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl Adjustment {
    /// Signed effect on the account's posted balance.
    pub fn net_effect(&self, kind: AccountKind) -> Money {
        kind.polarity().balance(
            self.debit_amount.unwrap_or(Money::ZERO),
            self.credit_amount.unwrap_or(Money::ZERO),
        )
    }

    fn totals(&self) -> (Money, Money) {
        (
            self.debit_amount.unwrap_or(Money::ZERO),
            self.credit_amount.unwrap_or(Money::ZERO),
        )
    }
}

/// Fields for creating or replacing an adjustment. A zero amount counts as absent.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentForm {
    pub credit_amount: Option<Money>,
    pub debit_amount: Option<Money>,
    pub note: String,
}

impl AdjustmentForm {
    pub fn credit(amount: Money, note: impl Into<String>) -> Self {
        Self {
            credit_amount: Some(amount),
            debit_amount: None,
            note: note.into(),
        }
    }

    pub fn debit(amount: Money, note: impl Into<String>) -> Self {
        Self {
            credit_amount: None,
            debit_amount: Some(amount),
            note: note.into(),
        }
    }

    fn normalized(self) -> Result<Self> {
        let credit_amount = self.credit_amount.filter(|m| !m.is_zero());
        let debit_amount = self.debit_amount.filter(|m| !m.is_zero());

        let mut errors = Errors::default();
        errors.check(!self.note.trim().is_empty(), "note can't be blank");
        match (credit_amount, debit_amount) {
            (None, None) => errors.add("Adjustment must change the account balance"),
            (Some(_), Some(_)) => errors.add("Cannot have both credit amount and debit amount"),
            _ => {}
        }
        if credit_amount.is_some_and(Money::is_negative) || debit_amount.is_some_and(Money::is_negative) {
            errors.add("adjustment amount must be greater than 0");
        }
        errors.finish()?;

        Ok(Self {
            credit_amount,
            debit_amount,
            note: self.note.trim().to_string(),
        })
    }
}

impl Ledger {
    pub fn create_adjustment(&mut self, account_id: Uuid, form: AdjustmentForm) -> Result<Adjustment> {
        let form = form.normalized()?;
        let adjustment = self.db.write(|tx| {
            let mut account = db::get_account(tx, account_id)?
                .ok_or_else(|| LedgerError::not_found("account", account_id))?;
            let adjustment = Adjustment {
                id: Uuid::new_v4(),
                account_id,
                credit_amount: form.credit_amount,
                debit_amount: form.debit_amount,
                note: form.note,
                created_at: Utc::now(),
            };
            let (debits, credits) = adjustment.totals();
            account.apply(debits, credits)?;
            db::update_account_totals(tx, &account)?;
            db::insert_adjustment(tx, &adjustment)?;
            Ok(adjustment)
        })?;
        tracing::info!(
            adjustment_id = %adjustment.id,
            account_id = %account_id,
            debit = ?adjustment.debit_amount.map(|m| m.to_string()),
            credit = ?adjustment.credit_amount.map(|m| m.to_string()),
            "adjustment created"
        );
        Ok(adjustment)
    }

    pub fn get_adjustment(&self, id: Uuid) -> Result<Adjustment> {
        db::get_adjustment(self.db.conn(), id)?
            .ok_or_else(|| LedgerError::not_found("adjustment", id))
    }

    pub fn account_adjustments(&self, account_id: Uuid) -> Result<Vec<Adjustment>> {
        Ok(db::adjustments_for_account(self.db.conn(), account_id)?)
    }

    /// Replaces an adjustment, moving the account by the difference on each side.
    pub fn update_adjustment(&mut self, id: Uuid, form: AdjustmentForm) -> Result<Adjustment> {
        let form = form.normalized()?;
        let adjustment = self.db.write(|tx| {
            let mut adjustment =
                db::get_adjustment(tx, id)?.ok_or_else(|| LedgerError::not_found("adjustment", id))?;
            let mut account = db::get_account(tx, adjustment.account_id)?
                .ok_or_else(|| LedgerError::not_found("account", adjustment.account_id))?;

            let (old_debits, old_credits) = adjustment.totals();
            adjustment.credit_amount = form.credit_amount;
            adjustment.debit_amount = form.debit_amount;
            adjustment.note = form.note;
            let (new_debits, new_credits) = adjustment.totals();

            account.apply(new_debits - old_debits, new_credits - old_credits)?;
            db::update_account_totals(tx, &account)?;
            db::update_adjustment(tx, &adjustment)?;
            Ok(adjustment)
        })?;
        tracing::info!(adjustment_id = %id, "adjustment updated");
        Ok(adjustment)
    }

    /// Deletes an adjustment and fully reverses its effect.
    pub fn destroy_adjustment(&mut self, id: Uuid) -> Result<()> {
        self.db.write(|tx| {
            let adjustment =
                db::get_adjustment(tx, id)?.ok_or_else(|| LedgerError::not_found("adjustment", id))?;
            let mut account = db::get_account(tx, adjustment.account_id)?
                .ok_or_else(|| LedgerError::not_found("account", adjustment.account_id))?;
            let (debits, credits) = adjustment.totals();
            account.apply(-debits, -credits)?;
            db::update_account_totals(tx, &account)?;
            db::delete_adjustment(tx, id)?;
            Ok(())
        })?;
        tracing::info!(adjustment_id = %id, "adjustment destroyed");
        Ok(())
    }
}
