use chrono::{Local, NaiveDate};
use std::path::Path;

use crate::db::Db;
use crate::error::Result;

/// Source of "today" for every date-sensitive operation.
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// The accounting engine: a store plus a clock.
///
/// Operations live next to the entity they act on (`account`, `transfer`,
/// `schedule`, `adjustment`, `organization`). Every mutation runs inside a
/// single store transaction.
pub struct Ledger {
    pub(crate) db: Db,
    clock: Box<dyn Clock>,
}

impl Ledger {
    pub fn new(db: Db) -> Self {
        Self::with_clock(db, SystemClock)
    }

    pub fn with_clock(db: Db, clock: impl Clock + 'static) -> Self {
        Self {
            db,
            clock: Box::new(clock),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Db::open_path(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Db::open_in_memory()?))
    }

    pub fn set_clock(&mut self, clock: impl Clock + 'static) {
        self.clock = Box::new(clock);
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}
