use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use rusqlite::Connection;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::db;
use crate::error::{Errors, LedgerError, Result};
use crate::ledger::Ledger;
use crate::money::Money;
use crate::transfer::{self, NewTransfer, Transfer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().trim_end_matches('s') {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            other => Err(format!("unknown period '{other}'")),
        }
    }
}

impl ToSql for Period {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Period {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Every `frequency` units of `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence {
    pub period: Period,
    pub frequency: u32,
}

impl Cadence {
    /// The occurrence after `from`.
    ///
    /// Each step starts from the previous date, so a month-end clamp carries
    /// forward: Jan 31 is followed by Feb 29 and then Mar 29.
    pub fn step(&self, from: NaiveDate) -> Option<NaiveDate> {
        let n = self.frequency;
        match self.period {
            Period::Day => from.checked_add_days(Days::new(u64::from(n))),
            Period::Week => from.checked_add_days(Days::new(u64::from(n) * 7)),
            Period::Month => from.checked_add_months(Months::new(n)),
            Period::Year => from.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub id: Uuid,
    pub name: String,
    pub amount: Option<Money>,
    pub cadence: Option<Cadence>,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    pub last_materialized_on: Option<NaiveDate>,
    pub debit_account_id: Uuid,
    pub credit_account_id: Uuid,
    pub relative_account_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    pub fn is_recurring(&self) -> bool {
        self.cadence.is_some()
    }

    /// No fixed amount: every transfer is sized from the relative account.
    pub fn is_balance_driven(&self) -> bool {
        self.relative_account_id.is_some() && self.amount.is_none()
    }

    fn within_end(&self, date: NaiveDate) -> bool {
        self.ends_on.is_none_or(|end| date <= end)
    }

    /// Occurrences walked forward from `starts_on`, bounded by `ends_on`.
    fn occurrences(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        let cadence = self.cadence;
        std::iter::successors(Some(self.starts_on), move |prev| cadence?.step(*prev))
            .take_while(|d| self.within_end(*d))
    }

    /// Every occurrence from `starts_on` through `up_to`, ignoring relative accounts.
    pub fn dates_through(&self, up_to: NaiveDate) -> Vec<NaiveDate> {
        self.occurrences().take_while(|d| *d <= up_to).collect()
    }

    /// First occurrence on or after `from`.
    pub fn next_date_on_or_after(&self, from: NaiveDate) -> Option<NaiveDate> {
        self.occurrences().find(|d| *d >= from)
    }

    /// Occurrence dates through `up_to`.
    ///
    /// `relative_balance` is the live posted balance of the relative account, if
    /// the schedule has one. A balance-driven schedule yields nothing while that
    /// balance is zero and at most the next occurrence from `today` otherwise.
    pub fn occurrence_dates(
        &self,
        up_to: NaiveDate,
        today: NaiveDate,
        relative_balance: Option<Money>,
    ) -> Vec<NaiveDate> {
        if !self.is_balance_driven() {
            return self.dates_through(up_to);
        }
        match relative_balance {
            Some(balance) if !balance.is_zero() => self
                .next_date_on_or_after(today)
                .filter(|d| *d <= up_to)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Amount for the `index`th planned occurrence.
    pub fn transfer_amount(&self, index: usize, relative_balance: Option<Money>) -> Money {
        let fixed = self.amount.unwrap_or(Money::ZERO);
        match relative_balance {
            Some(balance) if self.relative_account_id.is_some() && !balance.is_zero() => {
                if index == 0 { balance } else { fixed }
            }
            _ => fixed,
        }
    }

    /// Pending transfers for `dates`; non-positive amounts are dropped.
    pub fn planned_transfers(
        &self,
        dates: &[NaiveDate],
        relative_balance: Option<Money>,
    ) -> Vec<NewTransfer> {
        if self.is_balance_driven() && relative_balance.is_none_or(Money::is_zero) {
            return Vec::new();
        }
        dates
            .iter()
            .enumerate()
            .filter_map(|(index, date)| {
                let amount = self.transfer_amount(index, relative_balance);
                if amount.is_negative() {
                    tracing::warn!(
                        schedule_id = %self.id,
                        %amount,
                        "relative balance is negative, skipping occurrence"
                    );
                }
                amount.is_positive().then(|| {
                    let mut planned =
                        NewTransfer::pending(self.debit_account_id, self.credit_account_id, amount, *date);
                    planned.schedule_id = Some(self.id);
                    planned
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub name: String,
    pub amount: Option<Money>,
    pub period: Option<Period>,
    pub frequency: Option<u32>,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    pub debit_account_id: Uuid,
    pub credit_account_id: Uuid,
    pub relative_account_id: Option<Uuid>,
}

impl NewSchedule {
    pub fn once(
        name: impl Into<String>,
        debit_account_id: Uuid,
        credit_account_id: Uuid,
        amount: Money,
        starts_on: NaiveDate,
    ) -> Self {
        Self {
            name: name.into(),
            amount: Some(amount),
            period: None,
            frequency: None,
            starts_on,
            ends_on: None,
            debit_account_id,
            credit_account_id,
            relative_account_id: None,
        }
    }

    pub fn every(mut self, frequency: u32, period: Period) -> Self {
        self.period = Some(period);
        self.frequency = Some(frequency);
        self
    }

    pub fn until(mut self, ends_on: NaiveDate) -> Self {
        self.ends_on = Some(ends_on);
        self
    }

    pub fn relative_to(mut self, account: Uuid) -> Self {
        self.relative_account_id = Some(account);
        self
    }

    fn validate(&self) -> Result<Option<Cadence>> {
        let mut errors = Errors::default();
        errors.check(!self.name.trim().is_empty(), "name can't be blank");
        match self.amount {
            None if self.relative_account_id.is_none() => errors.add("amount can't be blank"),
            Some(amount) if !amount.is_positive() => errors.add("amount must be greater than 0"),
            _ => {}
        }
        if self.frequency.is_some() && self.period.is_none() {
            errors.add("period must be present when frequency is set");
        }
        if self.period.is_some() && self.frequency.is_none() {
            errors.add("frequency must be present when period is set");
        }
        if self.frequency == Some(0) {
            errors.add("frequency must be greater than 0");
        }
        if let Some(end) = self.ends_on {
            errors.check(end >= self.starts_on, "ends_on must be on or after starts_on");
        }
        errors.check(
            self.debit_account_id != self.credit_account_id,
            "credit_account must be different from debit account",
        );
        errors.finish()?;

        Ok(match (self.period, self.frequency) {
            (Some(period), Some(frequency)) => Some(Cadence { period, frequency }),
            _ => None,
        })
    }
}

/// Validates and stores a schedule inside an open transaction.
pub(crate) fn insert_schedule(conn: &Connection, new: NewSchedule) -> Result<Schedule> {
    let cadence = new.validate()?;
    let mut referenced = vec![new.debit_account_id, new.credit_account_id];
    referenced.extend(new.relative_account_id);
    for id in referenced {
        if db::get_account(conn, id)?.is_none() {
            return Err(LedgerError::not_found("account", id));
        }
    }

    let schedule = Schedule {
        id: Uuid::new_v4(),
        name: new.name.trim().to_string(),
        amount: new.amount,
        cadence,
        starts_on: new.starts_on,
        ends_on: new.ends_on,
        last_materialized_on: None,
        debit_account_id: new.debit_account_id,
        credit_account_id: new.credit_account_id,
        relative_account_id: new.relative_account_id,
        created_at: Utc::now(),
    };
    db::insert_schedule(conn, &schedule)?;
    Ok(schedule)
}

pub(crate) fn relative_balance(conn: &Connection, schedule: &Schedule) -> Result<Option<Money>> {
    let Some(id) = schedule.relative_account_id else {
        return Ok(None);
    };
    let account = db::get_account(conn, id)?.ok_or_else(|| LedgerError::not_found("account", id))?;
    Ok(Some(account.posted_balance()))
}

/// Planned transfers for every occurrence through `up_to`, sized against live balances.
pub(crate) fn plan_through(
    conn: &Connection,
    schedule: &Schedule,
    up_to: NaiveDate,
    today: NaiveDate,
) -> Result<Vec<NewTransfer>> {
    let balance = relative_balance(conn, schedule)?;
    let dates = schedule.occurrence_dates(up_to, today, balance);
    Ok(schedule.planned_transfers(&dates, balance))
}

/// Outcome of materializing one schedule.
#[derive(Debug, Clone)]
pub struct Materialization {
    pub schedule_id: Uuid,
    pub window: Option<(NaiveDate, NaiveDate)>,
    pub created: Vec<Transfer>,
    pub watermark: NaiveDate,
}

#[derive(Debug, Default)]
pub struct MaterializeReport {
    pub materialized: Vec<Materialization>,
    pub failed: Vec<(Uuid, LedgerError)>,
}

impl MaterializeReport {
    pub fn transfers_created(&self) -> usize {
        self.materialized.iter().map(|m| m.created.len()).sum()
    }
}

impl Ledger {
    pub fn create_schedule(&mut self, new: NewSchedule) -> Result<Schedule> {
        let schedule = self.db.write(|tx| insert_schedule(tx, new))?;
        tracing::info!(schedule_id = %schedule.id, name = %schedule.name, "schedule created");
        Ok(schedule)
    }

    pub fn get_schedule(&self, id: Uuid) -> Result<Schedule> {
        db::get_schedule(self.db.conn(), id)?.ok_or_else(|| LedgerError::not_found("schedule", id))
    }

    pub fn list_schedules(&self) -> Result<Vec<Schedule>> {
        Ok(db::list_schedules(self.db.conn())?)
    }

    pub fn account_schedules(&self, account: Uuid) -> Result<Vec<Schedule>> {
        Ok(db::schedules_touching(self.db.conn(), account)?)
    }

    /// Removes a schedule; transfers it produced stay, detached.
    pub fn destroy_schedule(&mut self, id: Uuid) -> Result<()> {
        self.db.write(|tx| {
            if db::get_schedule(tx, id)?.is_none() {
                return Err(LedgerError::not_found("schedule", id));
            }
            db::detach_schedule_transfers(tx, id)?;
            db::delete_schedule(tx, id)?;
            Ok(())
        })?;
        tracing::info!(schedule_id = %id, "schedule destroyed");
        Ok(())
    }

    pub fn transfer_dates(&self, id: Uuid, up_to: NaiveDate) -> Result<Vec<NaiveDate>> {
        let schedule = self.get_schedule(id)?;
        let balance = relative_balance(self.db.conn(), &schedule)?;
        let dates = schedule.occurrence_dates(up_to, self.today(), balance);
        tracing::debug!(schedule_id = %id, %up_to, count = dates.len(), "transfer dates");
        Ok(dates)
    }

    /// Unsaved pending transfers for `dates`.
    pub fn planned_transfers(&self, id: Uuid, dates: &[NaiveDate]) -> Result<Vec<NewTransfer>> {
        let schedule = self.get_schedule(id)?;
        let balance = relative_balance(self.db.conn(), &schedule)?;
        Ok(schedule.planned_transfers(dates, balance))
    }

    /// Persists the schedule's pending transfers up to today and advances its
    /// watermark, all in one transaction. Re-running on the same day adds nothing.
    pub fn create_pending_transfers(&mut self, id: Uuid) -> Result<Materialization> {
        let today = self.today();
        let result = self.db.write(|tx| {
            let schedule =
                db::get_schedule(tx, id)?.ok_or_else(|| LedgerError::not_found("schedule", id))?;

            let from = match schedule.last_materialized_on {
                Some(last) => last + Days::new(1),
                None => schedule.starts_on,
            };
            let window = (from <= today).then_some((from, today));

            let balance = relative_balance(tx, &schedule)?;
            let dates: Vec<NaiveDate> = schedule
                .occurrence_dates(today, today, balance)
                .into_iter()
                .filter(|d| (from..=today).contains(d))
                .collect();

            let mut created = Vec::new();
            for planned in schedule.planned_transfers(&dates, balance) {
                created.push(transfer::insert_transfer(tx, planned)?);
            }

            let watermark = schedule.last_materialized_on.map_or(today, |last| last.max(today));
            db::set_last_materialized_on(tx, id, watermark)?;

            Ok(Materialization {
                schedule_id: id,
                window,
                created,
                watermark,
            })
        });

        match &result {
            Ok(m) => tracing::info!(
                schedule_id = %id,
                created = m.created.len(),
                watermark = %m.watermark,
                "schedule materialized"
            ),
            Err(err) => tracing::warn!(schedule_id = %id, error = %err, "materialization failed"),
        }
        result
    }

    /// The periodic job: materializes every schedule, one transaction each.
    ///
    /// A schedule that breaks a ledger rule is reported and skipped; a storage
    /// failure stops the run.
    pub fn materialize_all(&mut self) -> Result<MaterializeReport> {
        let mut report = MaterializeReport::default();
        for schedule in self.list_schedules()? {
            match self.create_pending_transfers(schedule.id) {
                Ok(m) => report.materialized.push(m),
                Err(err) if err.is_storage() => return Err(err),
                Err(err) => report.failed.push((schedule.id, err)),
            }
        }
        tracing::info!(
            schedules = report.materialized.len(),
            failed = report.failed.len(),
            transfers = report.transfers_created(),
            "materialization run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule(starts_on: NaiveDate, cadence: Option<Cadence>) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            name: "rent".into(),
            amount: Some(Money::from_major(100)),
            cadence,
            starts_on,
            ends_on: None,
            last_materialized_on: None,
            debit_account_id: Uuid::new_v4(),
            credit_account_id: Uuid::new_v4(),
            relative_account_id: None,
            created_at: Utc::now(),
        }
    }

    fn monthly() -> Option<Cadence> {
        Some(Cadence {
            period: Period::Month,
            frequency: 1,
        })
    }

    #[test]
    fn month_end_clamp_carries_forward() {
        let s = schedule(date(2024, 1, 31), monthly());
        assert_eq!(
            s.dates_through(date(2024, 4, 30)),
            vec![date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 29), date(2024, 4, 29)]
        );
    }

    #[test]
    fn yearly_and_weekly_steps() {
        let yearly = Cadence {
            period: Period::Year,
            frequency: 1,
        };
        assert_eq!(yearly.step(date(2024, 2, 29)), Some(date(2025, 2, 28)));
        assert_eq!(yearly.step(date(2025, 2, 28)), Some(date(2026, 2, 28)));

        let fortnight = Cadence {
            period: Period::Week,
            frequency: 2,
        };
        let s = schedule(date(2024, 1, 1), Some(fortnight));
        assert_eq!(
            s.dates_through(date(2024, 2, 12)),
            vec![date(2024, 1, 1), date(2024, 1, 15), date(2024, 1, 29), date(2024, 2, 12)]
        );
    }

    #[test]
    fn bounds_are_inclusive() {
        let mut s = schedule(
            date(2024, 1, 1),
            Some(Cadence {
                period: Period::Day,
                frequency: 1,
            }),
        );
        s.ends_on = Some(date(2024, 1, 5));
        assert_eq!(s.dates_through(date(2024, 1, 3)).len(), 3);
        assert_eq!(s.dates_through(date(2024, 2, 1)).len(), 5);
    }

    #[test]
    fn one_shot_only_when_reached() {
        let s = schedule(date(2024, 3, 1), None);
        assert!(s.dates_through(date(2024, 2, 29)).is_empty());
        assert_eq!(s.dates_through(date(2024, 3, 1)), vec![date(2024, 3, 1)]);
    }

    #[test]
    fn next_date_respects_end() {
        let mut s = schedule(date(2024, 1, 1), monthly());
        assert_eq!(s.next_date_on_or_after(date(2024, 2, 2)), Some(date(2024, 3, 1)));
        s.ends_on = Some(date(2024, 2, 15));
        assert_eq!(s.next_date_on_or_after(date(2024, 2, 2)), None);
    }

    #[test]
    fn relative_amounts_use_balance_first() {
        let mut s = schedule(date(2024, 1, 1), monthly());
        s.relative_account_id = Some(Uuid::new_v4());
        let balance = Some(Money::from_major(800));

        assert_eq!(s.transfer_amount(0, balance), Money::from_major(800));
        assert_eq!(s.transfer_amount(1, balance), Money::from_major(100));
        assert_eq!(s.transfer_amount(0, Some(Money::ZERO)), Money::from_major(100));

        s.amount = None;
        assert_eq!(s.transfer_amount(1, balance), Money::ZERO);
        let dates = [date(2024, 1, 1), date(2024, 2, 1)];
        assert_eq!(s.planned_transfers(&dates, balance).len(), 1);
        assert!(s.planned_transfers(&dates, Some(Money::ZERO)).is_empty());
    }
}
