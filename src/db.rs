use crate::account::{Account, AccountKind, CreditCardTerms};
use crate::adjustment::Adjustment;
use crate::config::AppPaths;
use crate::error::Result;
use crate::money::Money;
use crate::organization::Organization;
use crate::schedule::{Cadence, Period, Schedule};
use crate::transfer::{Transfer, TransferState};
use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct Db {
    conn: Connection,
}

impl Db {
    /// Opens (creating if needed) the database for a book under the data dir.
    pub fn open(paths: &AppPaths, book: &str) -> anyhow::Result<(Self, PathBuf)> {
        let db_path = paths.book_file(book);
        if let Some(book_dir) = db_path.parent() {
            fs::create_dir_all(book_dir)
                .with_context(|| format!("Failed to create book dir {}", book_dir.display()))?;
        }
        let db = Self::open_path(&db_path)
            .with_context(|| format!("Failed to open DB {}", db_path.display()))?;
        Ok((db, db_path))
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        let db = Self {
            conn: Connection::open(path)?,
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_organizations_name ON organizations(name);

            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                debits INTEGER NOT NULL DEFAULT 0,
                credits INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                due_day INTEGER,
                statement_day INTEGER,
                credit_limit INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_organization ON accounts(organization_id);

            CREATE TABLE IF NOT EXISTS schedules (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                amount INTEGER,
                period TEXT,
                frequency INTEGER,
                starts_on TEXT NOT NULL,
                ends_on TEXT,
                last_materialized_on TEXT,
                debit_account_id TEXT NOT NULL REFERENCES accounts(id),
                credit_account_id TEXT NOT NULL REFERENCES accounts(id),
                relative_account_id TEXT REFERENCES accounts(id),
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_schedules_debit ON schedules(debit_account_id);
            CREATE INDEX IF NOT EXISTS idx_schedules_credit ON schedules(credit_account_id);

            CREATE TABLE IF NOT EXISTS transfers (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL DEFAULT 'pending',
                amount INTEGER NOT NULL,
                pending_on TEXT NOT NULL,
                posted_on TEXT,
                debit_account_id TEXT NOT NULL REFERENCES accounts(id),
                credit_account_id TEXT NOT NULL REFERENCES accounts(id),
                schedule_id TEXT REFERENCES schedules(id),
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transfers_debit ON transfers(debit_account_id, state);
            CREATE INDEX IF NOT EXISTS idx_transfers_credit ON transfers(credit_account_id, state);
            CREATE INDEX IF NOT EXISTS idx_transfers_schedule ON transfers(schedule_id);

            CREATE TABLE IF NOT EXISTS adjustments (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL REFERENCES accounts(id),
                credit_amount INTEGER,
                debit_amount INTEGER,
                note TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_adjustments_account ON adjustments(account_id);
            "#,
        )
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Runs `f` inside one transaction: committed on `Ok`, rolled back on `Err`.
    pub fn write<T>(&mut self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let tx = self.conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.minor()))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_i64().map(Money::from_minor)
    }
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Uuid::parse_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

// ---- organizations ----

const ORG_COLUMNS: &str = "id, name, created_at";

fn organization_from_row(row: &Row<'_>) -> rusqlite::Result<Organization> {
    Ok(Organization {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

pub fn insert_organization(conn: &Connection, org: &Organization) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO organizations (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![org.id.to_string(), org.name, org.created_at],
    )?;
    Ok(())
}

pub fn get_organization(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Organization>> {
    conn.query_row(
        &format!("SELECT {ORG_COLUMNS} FROM organizations WHERE id = ?1"),
        params![id.to_string()],
        organization_from_row,
    )
    .optional()
}

pub fn find_organization_by_name(
    conn: &Connection,
    name: &str,
) -> rusqlite::Result<Option<Organization>> {
    conn.query_row(
        &format!("SELECT {ORG_COLUMNS} FROM organizations WHERE name = ?1"),
        params![name],
        organization_from_row,
    )
    .optional()
}

pub fn list_organizations(conn: &Connection) -> rusqlite::Result<Vec<Organization>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ORG_COLUMNS} FROM organizations ORDER BY rowid ASC"
    ))?;
    let rows = stmt.query_map([], organization_from_row)?;
    rows.collect()
}

// ---- accounts ----

const ACCOUNT_COLUMNS: &str = "id, organization_id, name, kind, debits, credits, active, \
     due_day, statement_day, credit_limit, created_at";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let terms = CreditCardTerms {
        due_day: row.get(7)?,
        statement_day: row.get(8)?,
        credit_limit: row.get(9)?,
    };
    Ok(Account {
        id: uuid_at(row, 0)?,
        organization_id: uuid_at(row, 1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        debits: row.get(4)?,
        credits: row.get(5)?,
        active: row.get(6)?,
        credit_card: (!terms.is_empty()).then_some(terms),
        created_at: row.get(10)?,
    })
}

pub fn insert_account(conn: &Connection, account: &Account) -> rusqlite::Result<()> {
    let terms = account.credit_card.unwrap_or_default();
    conn.execute(
        r#"
        INSERT INTO accounts (id, organization_id, name, kind, debits, credits, active,
                              due_day, statement_day, credit_limit, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            account.id.to_string(),
            account.organization_id.to_string(),
            account.name,
            account.kind,
            account.debits,
            account.credits,
            account.active,
            terms.due_day,
            terms.statement_day,
            terms.credit_limit,
            account.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_account(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Account>> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
        params![id.to_string()],
        account_from_row,
    )
    .optional()
}

pub fn list_accounts(conn: &Connection, organization: Uuid) -> rusqlite::Result<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE organization_id = ?1 ORDER BY rowid ASC"
    ))?;
    let rows = stmt.query_map(params![organization.to_string()], account_from_row)?;
    rows.collect()
}

/// The organization's earliest-created cash account.
pub fn first_cash_account(
    conn: &Connection,
    organization: Uuid,
) -> rusqlite::Result<Option<Account>> {
    conn.query_row(
        &format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE organization_id = ?1 AND kind = ?2 ORDER BY rowid ASC LIMIT 1"
        ),
        params![organization.to_string(), AccountKind::Cash],
        account_from_row,
    )
    .optional()
}

pub fn update_account_details(conn: &Connection, account: &Account) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE accounts SET name = ?2, active = ?3 WHERE id = ?1",
        params![account.id.to_string(), account.name, account.active],
    )?;
    Ok(())
}

pub fn update_account_totals(conn: &Connection, account: &Account) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE accounts SET debits = ?2, credits = ?3 WHERE id = ?1",
        params![account.id.to_string(), account.debits, account.credits],
    )?;
    Ok(())
}

/// Sums of pending transfers on the (debit, credit) side of an account.
pub fn pending_sums(conn: &Connection, account: Uuid) -> rusqlite::Result<(Money, Money)> {
    conn.query_row(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN debit_account_id = ?1 THEN amount ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN credit_account_id = ?1 THEN amount ELSE 0 END), 0)
        FROM transfers
        WHERE state = ?2
          AND (debit_account_id = ?1 OR credit_account_id = ?1)
        "#,
        params![account.to_string(), TransferState::Pending],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

// ---- transfers ----

const TRANSFER_COLUMNS: &str = "id, state, amount, pending_on, posted_on, debit_account_id, \
     credit_account_id, schedule_id, created_at";

fn transfer_from_row(row: &Row<'_>) -> rusqlite::Result<Transfer> {
    Ok(Transfer {
        id: uuid_at(row, 0)?,
        state: row.get(1)?,
        amount: row.get(2)?,
        pending_on: row.get(3)?,
        posted_on: row.get(4)?,
        debit_account_id: uuid_at(row, 5)?,
        credit_account_id: uuid_at(row, 6)?,
        schedule_id: opt_uuid_at(row, 7)?,
        created_at: row.get(8)?,
    })
}

fn query_transfers(
    conn: &Connection,
    filter: &str,
    args: &[&dyn ToSql],
) -> rusqlite::Result<Vec<Transfer>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSFER_COLUMNS} FROM transfers {filter} ORDER BY pending_on ASC, rowid ASC"
    ))?;
    let rows = stmt.query_map(args, transfer_from_row)?;
    rows.collect()
}

pub fn insert_transfer(conn: &Connection, transfer: &Transfer) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO transfers (id, state, amount, pending_on, posted_on, debit_account_id,
                               credit_account_id, schedule_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            transfer.id.to_string(),
            transfer.state,
            transfer.amount,
            transfer.pending_on,
            transfer.posted_on,
            transfer.debit_account_id.to_string(),
            transfer.credit_account_id.to_string(),
            transfer.schedule_id.map(|id| id.to_string()),
            transfer.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_transfer(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Transfer>> {
    conn.query_row(
        &format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = ?1"),
        params![id.to_string()],
        transfer_from_row,
    )
    .optional()
}

pub fn list_transfers(conn: &Connection) -> rusqlite::Result<Vec<Transfer>> {
    query_transfers(conn, "", &[])
}

pub fn transfers_touching(conn: &Connection, account: Uuid) -> rusqlite::Result<Vec<Transfer>> {
    let id = account.to_string();
    query_transfers(
        conn,
        "WHERE debit_account_id = ?1 OR credit_account_id = ?1",
        &[&id as &dyn ToSql],
    )
}

pub fn transfers_for_schedule(conn: &Connection, schedule: Uuid) -> rusqlite::Result<Vec<Transfer>> {
    let id = schedule.to_string();
    query_transfers(conn, "WHERE schedule_id = ?1", &[&id as &dyn ToSql])
}

pub fn transfers_for_organization(
    conn: &Connection,
    organization: Uuid,
) -> rusqlite::Result<Vec<Transfer>> {
    let id = organization.to_string();
    query_transfers(
        conn,
        "WHERE debit_account_id IN (SELECT id FROM accounts WHERE organization_id = ?1) \
            OR credit_account_id IN (SELECT id FROM accounts WHERE organization_id = ?1)",
        &[&id as &dyn ToSql],
    )
}

pub fn update_pending_transfer(conn: &Connection, transfer: &Transfer) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        UPDATE transfers
        SET amount = ?2, pending_on = ?3, debit_account_id = ?4, credit_account_id = ?5
        WHERE id = ?1 AND state = ?6
        "#,
        params![
            transfer.id.to_string(),
            transfer.amount,
            transfer.pending_on,
            transfer.debit_account_id.to_string(),
            transfer.credit_account_id.to_string(),
            TransferState::Pending,
        ],
    )?;
    Ok(())
}

pub fn mark_transfer_posted(conn: &Connection, transfer: &Transfer) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE transfers SET state = ?2, posted_on = ?3 WHERE id = ?1",
        params![transfer.id.to_string(), transfer.state, transfer.posted_on],
    )?;
    Ok(())
}

pub fn delete_transfer(conn: &Connection, id: Uuid) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM transfers WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

pub fn detach_schedule_transfers(conn: &Connection, schedule: Uuid) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE transfers SET schedule_id = NULL WHERE schedule_id = ?1",
        params![schedule.to_string()],
    )
}

// ---- schedules ----

const SCHEDULE_COLUMNS: &str = "id, name, amount, period, frequency, starts_on, ends_on, \
     last_materialized_on, debit_account_id, credit_account_id, relative_account_id, created_at";

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    let period: Option<Period> = row.get(3)?;
    let frequency: Option<u32> = row.get(4)?;
    Ok(Schedule {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        amount: row.get(2)?,
        cadence: period
            .zip(frequency)
            .map(|(period, frequency)| Cadence { period, frequency }),
        starts_on: row.get(5)?,
        ends_on: row.get(6)?,
        last_materialized_on: row.get(7)?,
        debit_account_id: uuid_at(row, 8)?,
        credit_account_id: uuid_at(row, 9)?,
        relative_account_id: opt_uuid_at(row, 10)?,
        created_at: row.get(11)?,
    })
}

pub fn insert_schedule(conn: &Connection, schedule: &Schedule) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO schedules (id, name, amount, period, frequency, starts_on, ends_on,
                               last_materialized_on, debit_account_id, credit_account_id,
                               relative_account_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            schedule.id.to_string(),
            schedule.name,
            schedule.amount,
            schedule.cadence.map(|c| c.period),
            schedule.cadence.map(|c| c.frequency),
            schedule.starts_on,
            schedule.ends_on,
            schedule.last_materialized_on,
            schedule.debit_account_id.to_string(),
            schedule.credit_account_id.to_string(),
            schedule.relative_account_id.map(|id| id.to_string()),
            schedule.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_schedule(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Schedule>> {
    conn.query_row(
        &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
        params![id.to_string()],
        schedule_from_row,
    )
    .optional()
}

pub fn list_schedules(conn: &Connection) -> rusqlite::Result<Vec<Schedule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY rowid ASC"
    ))?;
    let rows = stmt.query_map([], schedule_from_row)?;
    rows.collect()
}

/// Schedules with the account on their debit or credit side.
pub fn schedules_touching(conn: &Connection, account: Uuid) -> rusqlite::Result<Vec<Schedule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules \
         WHERE debit_account_id = ?1 OR credit_account_id = ?1 ORDER BY rowid ASC"
    ))?;
    let rows = stmt.query_map(params![account.to_string()], schedule_from_row)?;
    rows.collect()
}

pub fn set_last_materialized_on(
    conn: &Connection,
    schedule: Uuid,
    date: NaiveDate,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schedules SET last_materialized_on = ?2 WHERE id = ?1",
        params![schedule.to_string(), date],
    )?;
    Ok(())
}

pub fn delete_schedule(conn: &Connection, id: Uuid) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM schedules WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

// ---- adjustments ----

const ADJUSTMENT_COLUMNS: &str = "id, account_id, credit_amount, debit_amount, note, created_at";

fn adjustment_from_row(row: &Row<'_>) -> rusqlite::Result<Adjustment> {
    Ok(Adjustment {
        id: uuid_at(row, 0)?,
        account_id: uuid_at(row, 1)?,
        credit_amount: row.get(2)?,
        debit_amount: row.get(3)?,
        note: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn insert_adjustment(conn: &Connection, adjustment: &Adjustment) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO adjustments (id, account_id, credit_amount, debit_amount, note, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            adjustment.id.to_string(),
            adjustment.account_id.to_string(),
            adjustment.credit_amount,
            adjustment.debit_amount,
            adjustment.note,
            adjustment.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_adjustment(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Adjustment>> {
    conn.query_row(
        &format!("SELECT {ADJUSTMENT_COLUMNS} FROM adjustments WHERE id = ?1"),
        params![id.to_string()],
        adjustment_from_row,
    )
    .optional()
}

pub fn adjustments_for_account(
    conn: &Connection,
    account: Uuid,
) -> rusqlite::Result<Vec<Adjustment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ADJUSTMENT_COLUMNS} FROM adjustments WHERE account_id = ?1 ORDER BY rowid ASC"
    ))?;
    let rows = stmt.query_map(params![account.to_string()], adjustment_from_row)?;
    rows.collect()
}

pub fn update_adjustment(conn: &Connection, adjustment: &Adjustment) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE adjustments SET credit_amount = ?2, debit_amount = ?3, note = ?4 WHERE id = ?1",
        params![
            adjustment.id.to_string(),
            adjustment.credit_amount,
            adjustment.debit_amount,
            adjustment.note,
        ],
    )?;
    Ok(())
}

pub fn delete_adjustment(conn: &Connection, id: Uuid) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM adjustments WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}
