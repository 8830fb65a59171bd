mod cli;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use crate::cli::{
    AccountCmd, AdjustAmounts, AdjustCmd, Cli, Command, JobCmd, OrgCmd, ScheduleCmd, TransferCmd,
};
use cuentas::config::{AppConfig, AppPaths};
use cuentas::db::Db;
use cuentas::logging::init_tracing;
use cuentas::{
    Account, AccountChanges, AdjustmentForm, CreditCardTerms, FixedClock, Ledger, NewAccount,
    NewSchedule, NewTransfer, Organization, Schedule, Transfer, TransferChanges,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = AppPaths::resolve(cli.home.clone())?;
    let (mut cfg, cfg_path) = AppConfig::load_or_init(&paths)?;
    init_tracing(cfg.log_filter.as_deref());

    let (db, db_path) = Db::open(&paths, &cfg.current_book)?;
    tracing::debug!(db = %db_path.display(), book = %cfg.current_book, "book opened");
    let mut ledger = match cli.today {
        Some(today) => Ledger::with_clock(db, FixedClock(today)),
        None => Ledger::new(db),
    };

    let org = cli.org.as_deref();
    match cli.command {
        Command::Org(args) => handle_org(&mut ledger, args.cmd, &mut cfg, &cfg_path),
        Command::Job(args) => handle_job(&mut ledger, args.cmd),
        Command::Account(args) => {
            let org = resolve_org(&ledger, org, &cfg)?;
            handle_account(&mut ledger, &org, args.cmd)
        }
        Command::Transfer(args) => {
            let org = resolve_org(&ledger, org, &cfg)?;
            handle_transfer(&mut ledger, &org, args.cmd)
        }
        Command::Schedule(args) => {
            let org = resolve_org(&ledger, org, &cfg)?;
            handle_schedule(&mut ledger, &org, args.cmd)
        }
        Command::Adjust(args) => {
            let org = resolve_org(&ledger, org, &cfg)?;
            handle_adjust(&mut ledger, &org, args.cmd)
        }
    }
}

fn handle_org(
    ledger: &mut Ledger,
    cmd: OrgCmd,
    cfg: &mut AppConfig,
    cfg_path: &Path,
) -> Result<()> {
    match cmd {
        OrgCmd::Add { name, select } => {
            let org = ledger.create_organization(&name)?;
            println!("Added organization: {} ({})", org.name, org.id);
            if select || cfg.default_organization.is_none() {
                cfg.default_organization = Some(org.id);
                cfg.save(cfg_path)?;
                println!("Using organization: {}", org.name);
            }
        }
        OrgCmd::List => {
            let orgs = ledger.list_organizations()?;
            if orgs.is_empty() {
                println!("(no organizations)");
                return Ok(());
            }
            println!("id\tname\tdefault");
            for org in orgs {
                let current = cfg.default_organization == Some(org.id);
                println!("{}\t{}\t{}", org.id, org.name, if current { "*" } else { "" });
            }
        }
        OrgCmd::Use { name } => {
            let org = find_org(ledger, &name)?;
            cfg.default_organization = Some(org.id);
            cfg.save(cfg_path)?;
            println!("Using organization: {}", org.name);
        }
    }
    Ok(())
}

fn handle_account(ledger: &mut Ledger, org: &Organization, cmd: AccountCmd) -> Result<()> {
    match cmd {
        AccountCmd::Add(args) => {
            let mut new = NewAccount::new(args.name, args.kind);
            new.posted_balance = args.balance;
            let terms = CreditCardTerms {
                due_day: args.due_day,
                statement_day: args.statement_day,
                credit_limit: args.credit_limit,
            };
            if !terms.is_empty() {
                new = new.with_terms(terms);
            }

            let created = ledger.create_account(org.id, new)?;
            println!(
                "Created {} account {} ({})",
                created.account.kind, created.account.name, created.account.id
            );
            if let Some(schedule) = created.payment_schedule {
                println!("Created payment schedule {} ({})", schedule.name, schedule.id);
            }
        }
        AccountCmd::List => {
            let accounts = ledger.list_accounts(org.id)?;
            if accounts.is_empty() {
                println!("(no accounts)");
                return Ok(());
            }
            println!("id\tname\tkind\tactive\tdebits\tcredits\tposted");
            for a in accounts {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    a.id,
                    a.name,
                    a.kind,
                    a.active,
                    a.debits,
                    a.credits,
                    a.posted_balance()
                );
            }
        }
        AccountCmd::Show { account, through } => {
            let account = resolve_account(ledger, org, &account)?;
            let today = ledger.today();
            let through = through.unwrap_or(today);
            println!("id\t{}", account.id);
            println!("name\t{}", account.name);
            println!("kind\t{}", account.kind);
            println!("active\t{}", account.active);
            println!("debits\t{}", account.debits);
            println!("credits\t{}", account.credits);
            println!("posted\t{}", account.posted_balance());
            println!("pending\t{}", ledger.pending_balance(account.id)?);
            println!("planned\t{}\t{}", through, ledger.planned_balance(account.id, through)?);
            if let Some(terms) = account.credit_card {
                print_opt("statement_day", terms.statement_day);
                print_opt("due_day", terms.due_day);
                print_opt("credit_limit", terms.credit_limit);
                print_opt("next_statement", terms.next_statement_date(today));
                print_opt("next_due", terms.next_due_date(today));
                print_opt("next_payment", terms.next_payment_date(today));
            }
        }
        AccountCmd::Seed { account, amount } => {
            let account = resolve_account(ledger, org, &account)?;
            let account = ledger.set_posted_balance(account.id, amount)?;
            println!(
                "Posted balance of {} set to {}",
                account.name,
                account.posted_balance()
            );
        }
        AccountCmd::Rename { account, name } => {
            let account = resolve_account(ledger, org, &account)?;
            let changes = AccountChanges {
                name: Some(name),
                active: None,
            };
            let account = ledger.update_account(account.id, changes)?;
            println!("Renamed account {} to {}", account.id, account.name);
        }
        AccountCmd::Deactivate { account } => {
            let account = resolve_account(ledger, org, &account)?;
            let changes = AccountChanges {
                name: None,
                active: Some(false),
            };
            let account = ledger.update_account(account.id, changes)?;
            println!("Deactivated account {}", account.name);
        }
    }
    Ok(())
}

fn handle_transfer(ledger: &mut Ledger, org: &Organization, cmd: TransferCmd) -> Result<()> {
    match cmd {
        TransferCmd::Add(args) => {
            let debit = resolve_account(ledger, org, &args.debit)?;
            let credit = resolve_account(ledger, org, &args.credit)?;
            let pending_on = args.on.unwrap_or_else(|| ledger.today());
            let mut new = NewTransfer::pending(debit.id, credit.id, args.amount, pending_on);
            if args.posted {
                new = new.posted(Some(pending_on));
            }
            let transfer = ledger.create_transfer(new)?;
            println!("Created {} transfer {}", transfer.state, transfer.id);
        }
        TransferCmd::Edit(args) => {
            let debit = args
                .debit
                .map(|raw| resolve_account(ledger, org, &raw))
                .transpose()?;
            let credit = args
                .credit
                .map(|raw| resolve_account(ledger, org, &raw))
                .transpose()?;
            let changes = TransferChanges {
                amount: args.amount,
                pending_on: args.on,
                debit_account_id: debit.map(|a| a.id),
                credit_account_id: credit.map(|a| a.id),
            };
            let transfer = ledger.update_transfer(args.id, changes)?;
            println!("Updated transfer {}", transfer.id);
        }
        TransferCmd::Post { id } => {
            let transfer = ledger.post_transfer(id)?;
            let posted_on = transfer.posted_on.unwrap_or_else(|| ledger.today());
            println!("Posted transfer {} on {}", transfer.id, posted_on);
        }
        TransferCmd::Rm { id } => {
            ledger.destroy_transfer(id)?;
            println!("Removed transfer {id}");
        }
        TransferCmd::List { account } => {
            let transfers = match account {
                Some(raw) => {
                    let account = resolve_account(ledger, org, &raw)?;
                    ledger.account_transfers(account.id)?
                }
                None => ledger.organization_transfers(org.id)?,
            };
            let names = account_names(ledger, org)?;
            print_transfers(&transfers, &names);
        }
    }
    Ok(())
}

fn handle_schedule(ledger: &mut Ledger, org: &Organization, cmd: ScheduleCmd) -> Result<()> {
    match cmd {
        ScheduleCmd::Add(args) => {
            let debit = resolve_account(ledger, org, &args.debit)?;
            let credit = resolve_account(ledger, org, &args.credit)?;
            let relative = args
                .relative
                .map(|raw| resolve_account(ledger, org, &raw))
                .transpose()?;
            let new = NewSchedule {
                name: args.name,
                amount: args.amount,
                period: args.period,
                frequency: args.every,
                starts_on: args.starts,
                ends_on: args.ends,
                debit_account_id: debit.id,
                credit_account_id: credit.id,
                relative_account_id: relative.map(|a| a.id),
            };
            let schedule = ledger.create_schedule(new)?;
            println!("Created schedule {} ({})", schedule.name, schedule.id);
        }
        ScheduleCmd::Rm { id } => {
            ledger.destroy_schedule(id)?;
            println!("Removed schedule {id}");
        }
        ScheduleCmd::List => {
            let names = account_names(ledger, org)?;
            let schedules: Vec<Schedule> = ledger
                .list_schedules()?
                .into_iter()
                .filter(|s| {
                    names.contains_key(&s.debit_account_id) || names.contains_key(&s.credit_account_id)
                })
                .collect();
            if schedules.is_empty() {
                println!("(no schedules)");
                return Ok(());
            }
            println!("id\tname\tamount\tevery\tstarts_on\tends_on\tlast_materialized_on\tdebit\tcredit");
            for s in schedules {
                let amount = match (s.amount, s.relative_account_id) {
                    (Some(amount), _) => amount.to_string(),
                    (None, Some(rel)) => format!("={}", name_of(&names, rel)),
                    (None, None) => String::new(),
                };
                let every = s
                    .cadence
                    .map(|c| format!("{} {}", c.frequency, c.period))
                    .unwrap_or_else(|| "once".to_string());
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    s.id,
                    s.name,
                    amount,
                    every,
                    s.starts_on,
                    opt_to_string(s.ends_on),
                    opt_to_string(s.last_materialized_on),
                    name_of(&names, s.debit_account_id),
                    name_of(&names, s.credit_account_id),
                );
            }
        }
        ScheduleCmd::Dates { id, through } => {
            let dates = ledger.transfer_dates(id, through)?;
            if dates.is_empty() {
                println!("(no dates)");
            }
            for date in dates {
                println!("{date}");
            }
        }
        ScheduleCmd::Materialize { id } => {
            let m = ledger.create_pending_transfers(id)?;
            println!(
                "Created {} pending transfers for schedule {} (through {})",
                m.created.len(),
                id,
                m.watermark
            );
            if !m.created.is_empty() {
                let names = account_names(ledger, org)?;
                print_transfers(&m.created, &names);
            }
        }
    }
    Ok(())
}

fn handle_adjust(ledger: &mut Ledger, org: &Organization, cmd: AdjustCmd) -> Result<()> {
    match cmd {
        AdjustCmd::Add { account, amounts } => {
            let account = resolve_account(ledger, org, &account)?;
            let adjustment = ledger.create_adjustment(account.id, adjustment_form(amounts))?;
            let account = ledger.get_account(account.id)?;
            println!(
                "Created adjustment {} ({} now {})",
                adjustment.id,
                account.name,
                account.posted_balance()
            );
        }
        AdjustCmd::Edit { id, amounts } => {
            let adjustment = ledger.update_adjustment(id, adjustment_form(amounts))?;
            println!("Updated adjustment {}", adjustment.id);
        }
        AdjustCmd::Rm { id } => {
            ledger.destroy_adjustment(id)?;
            println!("Removed adjustment {id}");
        }
    }
    Ok(())
}

fn handle_job(ledger: &mut Ledger, cmd: JobCmd) -> Result<()> {
    match cmd {
        JobCmd::Run => {
            let report = ledger
                .materialize_all()
                .context("Materialization run aborted")?;
            for (schedule_id, err) in &report.failed {
                eprintln!("schedule {schedule_id} failed: {err}");
            }
            println!(
                "Materialized {} transfers across {} schedules ({} failed)",
                report.transfers_created(),
                report.materialized.len(),
                report.failed.len()
            );
        }
    }
    Ok(())
}

fn adjustment_form(amounts: AdjustAmounts) -> AdjustmentForm {
    AdjustmentForm {
        credit_amount: amounts.credit,
        debit_amount: amounts.debit,
        note: amounts.note,
    }
}

fn find_org(ledger: &Ledger, raw: &str) -> Result<Organization> {
    if let Ok(id) = Uuid::parse_str(raw) {
        return Ok(ledger.get_organization(id)?);
    }
    ledger
        .find_organization(raw)?
        .ok_or_else(|| anyhow!("No organization named '{raw}'"))
}

fn resolve_org(ledger: &Ledger, raw: Option<&str>, cfg: &AppConfig) -> Result<Organization> {
    if let Some(raw) = raw {
        return find_org(ledger, raw);
    }
    let Some(id) = cfg.default_organization else {
        return Err(anyhow!(
            "No organization selected. Create one with: cuentas org add <name>"
        ));
    };
    ledger
        .get_organization(id)
        .context("The default organization is missing from this book; pick one with: cuentas org use <name>")
}

/// Looks an account up by id or, case-insensitively, by name within the organization.
fn resolve_account(ledger: &Ledger, org: &Organization, raw: &str) -> Result<Account> {
    if let Ok(id) = Uuid::parse_str(raw) {
        let account = ledger.get_account(id)?;
        if account.organization_id != org.id {
            return Err(anyhow!("Account {id} does not belong to {}", org.name));
        }
        return Ok(account);
    }
    ledger
        .list_accounts(org.id)?
        .into_iter()
        .find(|a| a.name.eq_ignore_ascii_case(raw.trim()))
        .ok_or_else(|| anyhow!("No account named '{raw}' in {}", org.name))
}

fn account_names(ledger: &Ledger, org: &Organization) -> Result<BTreeMap<Uuid, String>> {
    Ok(ledger
        .list_accounts(org.id)?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect())
}

fn name_of(names: &BTreeMap<Uuid, String>, id: Uuid) -> String {
    names.get(&id).cloned().unwrap_or_else(|| id.to_string())
}

fn opt_to_string<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn print_opt<T: ToString>(key: &str, value: Option<T>) {
    if let Some(v) = value {
        println!("{key}\t{}", v.to_string());
    }
}

fn print_transfers(transfers: &[Transfer], names: &BTreeMap<Uuid, String>) {
    if transfers.is_empty() {
        println!("(no transfers)");
        return;
    }
    println!("id\tstate\tamount\tpending_on\tposted_on\tdebit\tcredit\tschedule");
    for t in transfers {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            t.id,
            t.state,
            t.amount,
            t.pending_on,
            opt_to_string(t.posted_on),
            name_of(names, t.debit_account_id),
            name_of(names, t.credit_account_id),
            opt_to_string(t.schedule_id),
        );
    }
}
