use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::db;
use crate::error::{BalanceViolation, Errors, LedgerError, Result};
use crate::ledger::Ledger;
use crate::money::Money;
use crate::schedule::{NewSchedule, Period, Schedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Cash,
    Vendor,
    CreditCard,
    Customer,
}

/// Which total grows the "owed to me" balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Debtor,
    Creditor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceFloor {
    NonNegative,
    Unconstrained,
}

pub fn polarity(kind: AccountKind) -> Polarity {
    match kind {
        AccountKind::Cash | AccountKind::Vendor => Polarity::Debtor,
        AccountKind::CreditCard | AccountKind::Customer => Polarity::Creditor,
    }
}

pub fn balance_floor_policy(kind: AccountKind) -> BalanceFloor {
    match kind {
        AccountKind::Vendor => BalanceFloor::Unconstrained,
        AccountKind::Cash | AccountKind::CreditCard | AccountKind::Customer => {
            BalanceFloor::NonNegative
        }
    }
}

impl Polarity {
    /// Applies the polarity formula to a debit-side and a credit-side total.
    pub fn balance(self, debits: Money, credits: Money) -> Money {
        match self {
            Polarity::Debtor => debits - credits,
            Polarity::Creditor => credits - debits,
        }
    }
}

impl AccountKind {
    pub const ALL: [AccountKind; 4] = [
        AccountKind::Cash,
        AccountKind::Vendor,
        AccountKind::CreditCard,
        AccountKind::Customer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AccountKind::Cash => "cash",
            AccountKind::Vendor => "vendor",
            AccountKind::CreditCard => "credit_card",
            AccountKind::Customer => "customer",
        }
    }

    pub fn polarity(self) -> Polarity {
        polarity(self)
    }

    pub fn balance_floor(self) -> BalanceFloor {
        balance_floor_policy(self)
    }

    /// Checks prospective totals against this kind's rules.
    pub fn check_totals(
        self,
        account: Uuid,
        debits: Money,
        credits: Money,
    ) -> std::result::Result<(), BalanceViolation> {
        if debits.is_negative() || credits.is_negative() {
            return Err(BalanceViolation::NegativeTotal { account });
        }
        if self.balance_floor() == BalanceFloor::Unconstrained {
            return Ok(());
        }
        if self.polarity().balance(debits, credits).is_negative() {
            return Err(match self.polarity() {
                Polarity::Debtor => BalanceViolation::NegativeCashBalance { account },
                Polarity::Creditor => BalanceViolation::CreditorCreditsBelowDebits { account },
            });
        }
        Ok(())
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "cash" => Ok(AccountKind::Cash),
            "vendor" => Ok(AccountKind::Vendor),
            "credit_card" | "creditcard" => Ok(AccountKind::CreditCard),
            "customer" => Ok(AccountKind::Customer),
            other => Err(format!("unknown account kind '{other}'")),
        }
    }
}

impl ToSql for AccountKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AccountKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Credit-card billing terms. Only meaningful on `AccountKind::CreditCard`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCardTerms {
    pub due_day: Option<u32>,
    pub statement_day: Option<u32>,
    pub credit_limit: Option<Money>,
}

impl CreditCardTerms {
    pub fn is_empty(&self) -> bool {
        self.due_day.is_none() && self.statement_day.is_none() && self.credit_limit.is_none()
    }

    /// Both days known: enough to schedule a monthly payment.
    pub fn is_billable(&self) -> bool {
        self.due_day.is_some() && self.statement_day.is_some()
    }

    fn validate(&self, errors: &mut Errors) {
        if let Some(day) = self.due_day {
            errors.check((1..=31).contains(&day), "due_day must be between 1 and 31");
        }
        if let Some(day) = self.statement_day {
            errors.check(
                (1..=31).contains(&day),
                "statement_day must be between 1 and 31",
            );
        }
        if let Some(limit) = self.credit_limit {
            errors.check(limit.is_positive(), "credit_limit must be greater than 0");
        }
    }

    pub fn next_statement_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        self.statement_day.map(|day| next_day_of_month(today, day))
    }

    pub fn next_due_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        self.due_day.map(|day| next_day_of_month(today, day))
    }

    /// The day before a statement closes, on or after `today`.
    pub fn next_payment_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        let day = self.statement_day?;
        let this_month = day_in_month(today.year(), today.month(), day) - Duration::days(1);
        if this_month >= today {
            return Some(this_month);
        }
        let next = first_of_next_month(today);
        Some(day_in_month(next.year(), next.month(), day) - Duration::days(1))
    }

    pub fn days_until_statement(&self, today: NaiveDate) -> Option<i64> {
        self.next_statement_date(today)
            .map(|d| (d - today).num_days())
    }

    pub fn days_until_due(&self, today: NaiveDate) -> Option<i64> {
        self.next_due_date(today).map(|d| (d - today).num_days())
    }
}

fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first.checked_add_months(Months::new(1)).unwrap_or(first)
}

/// `day` of the given month, clamped to the month's last day.
fn day_in_month(year: i32, month: u32, day: u32) -> NaiveDate {
    (1..=day.clamp(1, 31))
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
        .unwrap_or(NaiveDate::MIN)
}

fn next_day_of_month(today: NaiveDate, day: u32) -> NaiveDate {
    let this_month = day_in_month(today.year(), today.month(), day);
    if this_month >= today {
        return this_month;
    }
    let next = first_of_next_month(today);
    day_in_month(next.year(), next.month(), day)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub kind: AccountKind,
    pub debits: Money,
    pub credits: Money,
    pub active: bool,
    pub credit_card: Option<CreditCardTerms>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn polarity(&self) -> Polarity {
        self.kind.polarity()
    }

    pub fn posted_balance(&self) -> Money {
        self.polarity().balance(self.debits, self.credits)
    }

    /// Moves the running totals, enforcing the kind's rules only when they change.
    pub(crate) fn apply(
        &mut self,
        debits: Money,
        credits: Money,
    ) -> std::result::Result<(), BalanceViolation> {
        if debits.is_zero() && credits.is_zero() {
            return Ok(());
        }
        let out_of_range = BalanceViolation::TotalOutOfRange { account: self.id };
        let new_debits = self.debits.checked_add(debits).ok_or(out_of_range.clone())?;
        let new_credits = self.credits.checked_add(credits).ok_or(out_of_range)?;
        self.kind.check_totals(self.id, new_debits, new_credits)?;
        self.debits = new_debits;
        self.credits = new_credits;
        Ok(())
    }

    /// Puts the whole amount on the increasing side and clears the other.
    pub(crate) fn seed_posted_balance(&mut self, amount: Money) -> Result<()> {
        if amount.is_negative() {
            return Err(LedgerError::invalid("posted balance cannot be negative"));
        }
        match self.polarity() {
            Polarity::Debtor => {
                self.debits = amount;
                self.credits = Money::ZERO;
            }
            Polarity::Creditor => {
                self.credits = amount;
                self.debits = Money::ZERO;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub name: String,
    pub kind: Option<AccountKind>,
    pub posted_balance: Option<Money>,
    pub credit_card: Option<CreditCardTerms>,
}

impl NewAccount {
    pub fn new(name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn with_balance(mut self, amount: Money) -> Self {
        self.posted_balance = Some(amount);
        self
    }

    pub fn with_terms(mut self, terms: CreditCardTerms) -> Self {
        self.credit_card = Some(terms);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub name: Option<String>,
    pub active: Option<bool>,
}

/// Result of opening an account, with any payment schedule created alongside it.
#[derive(Debug, Clone)]
pub struct AccountCreated {
    pub account: Account,
    pub payment_schedule: Option<Schedule>,
}

impl Ledger {
    pub fn create_account(&mut self, organization: Uuid, new: NewAccount) -> Result<AccountCreated> {
        let mut errors = Errors::default();
        errors.check(!new.name.trim().is_empty(), "name can't be blank");
        errors.check(new.kind.is_some(), "kind can't be blank");
        let terms = new.credit_card.filter(|t| !t.is_empty());
        if let Some(terms) = &terms {
            terms.validate(&mut errors);
            if new.kind.is_some_and(|k| k != AccountKind::CreditCard) {
                errors.add("credit card terms are only allowed on credit card accounts");
            }
        }
        errors.finish()?;
        let kind = new.kind.ok_or_else(|| LedgerError::invalid("kind can't be blank"))?;

        let mut account = Account {
            id: Uuid::new_v4(),
            organization_id: organization,
            name: new.name.trim().to_string(),
            kind,
            debits: Money::ZERO,
            credits: Money::ZERO,
            active: true,
            credit_card: terms,
            created_at: Utc::now(),
        };
        if let Some(amount) = new.posted_balance {
            account.seed_posted_balance(amount)?;
        }

        let today = self.today();
        let created = self.db.write(|tx| {
            if db::get_organization(tx, organization)?.is_none() {
                return Err(LedgerError::not_found("organization", organization));
            }
            db::insert_account(tx, &account)?;

            let payment_schedule = match payment_schedule_for(&account, today) {
                Some(mut plan) => match db::first_cash_account(tx, organization)? {
                    Some(cash) => {
                        plan.credit_account_id = cash.id;
                        Some(crate::schedule::insert_schedule(tx, plan)?)
                    }
                    None => None,
                },
                None => None,
            };

            Ok(AccountCreated {
                account,
                payment_schedule,
            })
        })?;

        tracing::info!(
            account_id = %created.account.id,
            kind = %created.account.kind,
            payment_schedule = created.payment_schedule.is_some(),
            "account created"
        );
        Ok(created)
    }

    pub fn get_account(&self, id: Uuid) -> Result<Account> {
        db::get_account(self.db.conn(), id)?.ok_or_else(|| LedgerError::not_found("account", id))
    }

    pub fn list_accounts(&self, organization: Uuid) -> Result<Vec<Account>> {
        Ok(db::list_accounts(self.db.conn(), organization)?)
    }

    pub fn update_account(&mut self, id: Uuid, changes: AccountChanges) -> Result<Account> {
        if let Some(name) = &changes.name {
            if name.trim().is_empty() {
                return Err(LedgerError::invalid("name can't be blank"));
            }
        }
        self.db.write(|tx| {
            let mut account =
                db::get_account(tx, id)?.ok_or_else(|| LedgerError::not_found("account", id))?;
            if let Some(name) = changes.name {
                account.name = name.trim().to_string();
            }
            if let Some(active) = changes.active {
                account.active = active;
            }
            db::update_account_details(tx, &account)?;
            Ok(account)
        })
    }

    /// Seeds an account's posted balance, replacing both running totals.
    pub fn set_posted_balance(&mut self, id: Uuid, amount: Money) -> Result<Account> {
        let account = self.db.write(|tx| {
            let mut account =
                db::get_account(tx, id)?.ok_or_else(|| LedgerError::not_found("account", id))?;
            account.seed_posted_balance(amount)?;
            db::update_account_totals(tx, &account)?;
            Ok(account)
        })?;
        tracing::info!(account_id = %id, %amount, "posted balance seeded");
        Ok(account)
    }

    pub fn posted_balance(&self, id: Uuid) -> Result<Money> {
        Ok(self.get_account(id)?.posted_balance())
    }

    /// Polarity-signed sum of the pending transfers touching the account.
    pub fn pending_balance(&self, id: Uuid) -> Result<Money> {
        let account = self.get_account(id)?;
        let (debits, credits) = db::pending_sums(self.db.conn(), id)?;
        Ok(account.polarity().balance(debits, credits))
    }

    /// Polarity-signed sum of the scheduled occurrences from today through `as_of`.
    pub fn planned_balance(&self, id: Uuid, as_of: NaiveDate) -> Result<Money> {
        let account = self.get_account(id)?;
        let today = self.today();
        let conn = self.db.conn();

        let out_of_range = || LedgerError::invalid("planned balance is out of range");
        let mut debits = Money::ZERO;
        let mut credits = Money::ZERO;
        for schedule in db::schedules_touching(conn, id)? {
            let planned = crate::schedule::plan_through(conn, &schedule, as_of, today)?
                .into_iter()
                .filter(|t| t.pending_on >= today)
                .try_fold(Money::ZERO, |sum, t| sum.checked_add(t.amount))
                .ok_or_else(out_of_range)?;
            if schedule.debit_account_id == id {
                debits = debits.checked_add(planned).ok_or_else(out_of_range)?;
            }
            if schedule.credit_account_id == id {
                credits = credits.checked_add(planned).ok_or_else(out_of_range)?;
            }
        }
        Ok(account.polarity().balance(debits, credits))
    }
}

/// The monthly payment schedule a billable credit card gets at creation.
/// The credit side is filled in once the organization's cash account is known.
fn payment_schedule_for(account: &Account, today: NaiveDate) -> Option<NewSchedule> {
    if account.kind != AccountKind::CreditCard {
        return None;
    }
    let terms = account.credit_card.filter(CreditCardTerms::is_billable)?;
    let starts_on = terms.next_payment_date(today)?;
    Some(NewSchedule {
        name: format!("Payment for {}", account.name),
        amount: None,
        period: Some(Period::Month),
        frequency: Some(1),
        starts_on,
        ends_on: None,
        debit_account_id: account.id,
        credit_account_id: Uuid::nil(),
        relative_account_id: Some(account.id),
    })
}
