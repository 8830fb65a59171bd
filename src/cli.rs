use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use cuentas::{AccountKind, Money, Period};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "cuentas")]
#[command(about = "Double-entry ledger with scheduled transfers", long_about = None)]
pub struct Cli {
    /// Override Cuentas home directory (config/data subdirs will be created inside it).
    #[arg(long, env = "CUENTAS_HOME", global = true)]
    pub home: Option<std::path::PathBuf>,

    /// Pretend today is this date (YYYY-MM-DD).
    #[arg(long, env = "CUENTAS_TODAY", global = true)]
    pub today: Option<NaiveDate>,

    /// Organization name or id. Defaults to the one selected with `org use`.
    #[arg(long, global = true)]
    pub org: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Org(OrgArgs),
    Account(AccountArgs),
    Transfer(TransferArgs),
    Schedule(ScheduleArgs),
    Adjust(AdjustArgs),
    Job(JobArgs),
}

#[derive(Debug, Args)]
pub struct OrgArgs {
    #[command(subcommand)]
    pub cmd: OrgCmd,
}

#[derive(Debug, Subcommand)]
pub enum OrgCmd {
    Add {
        name: String,

        /// Also make it the default organization.
        #[arg(long = "use")]
        select: bool,
    },
    List,
    Use {
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct AccountArgs {
    #[command(subcommand)]
    pub cmd: AccountCmd,
}

#[derive(Debug, Subcommand)]
pub enum AccountCmd {
    Add(AccountAddArgs),
    List,
    Show {
        account: String,

        /// Planned balance through this date. Defaults to today.
        #[arg(long)]
        through: Option<NaiveDate>,
    },
    /// Overwrite the posted balance.
    Seed {
        account: String,
        amount: Money,
    },
    Rename {
        account: String,
        name: String,
    },
    Deactivate {
        account: String,
    },
}

#[derive(Debug, Args)]
pub struct AccountAddArgs {
    pub name: String,

    /// cash, vendor, credit_card or customer.
    #[arg(long)]
    pub kind: AccountKind,

    /// Opening posted balance.
    #[arg(long)]
    pub balance: Option<Money>,

    #[arg(long)]
    pub due_day: Option<u32>,

    #[arg(long)]
    pub statement_day: Option<u32>,

    #[arg(long)]
    pub credit_limit: Option<Money>,
}

#[derive(Debug, Args)]
pub struct TransferArgs {
    #[command(subcommand)]
    pub cmd: TransferCmd,
}

#[derive(Debug, Subcommand)]
pub enum TransferCmd {
    Add(TransferAddArgs),
    Edit(TransferEditArgs),
    Post {
        id: Uuid,
    },
    Rm {
        id: Uuid,
    },
    List {
        /// Only transfers touching this account.
        #[arg(long)]
        account: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct TransferAddArgs {
    pub amount: Money,

    /// Account debited.
    #[arg(long)]
    pub debit: String,

    /// Account credited.
    #[arg(long)]
    pub credit: String,

    /// Pending date. Defaults to today.
    #[arg(long)]
    pub on: Option<NaiveDate>,

    /// Record it as already posted.
    #[arg(long)]
    pub posted: bool,
}

#[derive(Debug, Args)]
pub struct TransferEditArgs {
    pub id: Uuid,

    #[arg(long)]
    pub amount: Option<Money>,

    #[arg(long)]
    pub on: Option<NaiveDate>,

    #[arg(long)]
    pub debit: Option<String>,

    #[arg(long)]
    pub credit: Option<String>,
}

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    #[command(subcommand)]
    pub cmd: ScheduleCmd,
}

#[derive(Debug, Subcommand)]
pub enum ScheduleCmd {
    Add(ScheduleAddArgs),
    Rm {
        id: Uuid,
    },
    List,
    /// Occurrence dates up to a date, without saving anything.
    Dates {
        id: Uuid,

        #[arg(long)]
        through: NaiveDate,
    },
    /// Create the schedule's pending transfers up to today.
    Materialize {
        id: Uuid,
    },
}

#[derive(Debug, Args)]
pub struct ScheduleAddArgs {
    pub name: String,

    #[arg(long)]
    pub debit: String,

    #[arg(long)]
    pub credit: String,

    /// Fixed amount. Omit when `--relative` is given.
    #[arg(long)]
    pub amount: Option<Money>,

    /// Repeat every N periods.
    #[arg(long)]
    pub every: Option<u32>,

    /// day, week, month or year.
    #[arg(long)]
    pub period: Option<Period>,

    #[arg(long)]
    pub starts: NaiveDate,

    #[arg(long)]
    pub ends: Option<NaiveDate>,

    /// Take the amount from this account's posted balance.
    #[arg(long)]
    pub relative: Option<String>,
}

#[derive(Debug, Args)]
pub struct AdjustArgs {
    #[command(subcommand)]
    pub cmd: AdjustCmd,
}

#[derive(Debug, Subcommand)]
pub enum AdjustCmd {
    Add {
        account: String,

        #[command(flatten)]
        amounts: AdjustAmounts,
    },
    Edit {
        id: Uuid,

        #[command(flatten)]
        amounts: AdjustAmounts,
    },
    Rm {
        id: Uuid,
    },
}

#[derive(Debug, Args, Clone)]
pub struct AdjustAmounts {
    #[arg(long)]
    pub credit: Option<Money>,

    #[arg(long)]
    pub debit: Option<Money>,

    #[arg(long, short = 'm')]
    pub note: String,
}

#[derive(Debug, Args)]
pub struct JobArgs {
    #[command(subcommand)]
    pub cmd: JobCmd,
}

#[derive(Debug, Subcommand)]
pub enum JobCmd {
    /// Materialize every schedule up to today.
    Run,
}
