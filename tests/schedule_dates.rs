mod common;

use chrono::Duration;
use common::{account, date, funded, ledger_on, usd};
use cuentas::{
    AccountKind, AdjustmentForm, BalanceViolation, FixedClock, LedgerError, NewSchedule, Period,
};

#[test]
fn monthly_schedule_started_75_days_ago_has_three_dates() {
    let today = date(2024, 6, 15);
    let (mut ledger, org) = ledger_on(today);
    let cash = funded(&mut ledger, &org, "Checking", AccountKind::Cash, usd(1_000));
    let vendor = account(&mut ledger, &org, "Landlord", AccountKind::Vendor);

    let schedule = ledger
        .create_schedule(
            NewSchedule::once("Rent", vendor.id, cash.id, usd(100), today - Duration::days(75))
                .every(1, Period::Month),
        )
        .unwrap();

    let dates = ledger.transfer_dates(schedule.id, today).unwrap();
    assert_eq!(dates.len(), 3);
    assert_eq!(dates[0], today - Duration::days(75));
    for pair in dates.windows(2) {
        let gap = (pair[1] - pair[0]).num_days();
        assert!((28..=31).contains(&gap), "gap of {gap} days");
    }
    assert!(dates.iter().all(|d| *d <= today));
}

#[test]
fn balance_driven_schedule_waits_for_a_balance() {
    let today = date(2024, 6, 15);
    let (mut ledger, org) = ledger_on(today);
    let cash = funded(&mut ledger, &org, "Checking", AccountKind::Cash, usd(1_000));
    let card = account(&mut ledger, &org, "Visa", AccountKind::CreditCard);

    let mut new = NewSchedule::once("Sweep", card.id, cash.id, usd(1), date(2024, 1, 10))
        .every(1, Period::Month)
        .relative_to(card.id);
    new.amount = None;
    let schedule = ledger.create_schedule(new).unwrap();

    assert!(
        ledger
            .transfer_dates(schedule.id, date(2024, 12, 31))
            .unwrap()
            .is_empty()
    );

    ledger
        .create_adjustment(card.id, AdjustmentForm::credit(usd(75), "statement"))
        .unwrap();
    let dates = ledger.transfer_dates(schedule.id, date(2024, 12, 31)).unwrap();
    assert_eq!(dates, vec![date(2024, 7, 10)]);

    let planned = ledger.planned_transfers(schedule.id, &dates).unwrap();
    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0].amount, usd(75));
    assert_eq!(planned[0].schedule_id, Some(schedule.id));
}

#[test]
fn materializing_twice_on_one_day_adds_nothing() {
    let today = date(2024, 6, 15);
    let (mut ledger, org) = ledger_on(today);
    let cash = funded(&mut ledger, &org, "Checking", AccountKind::Cash, usd(1_000));
    let vendor = account(&mut ledger, &org, "Landlord", AccountKind::Vendor);
    let schedule = ledger
        .create_schedule(
            NewSchedule::once("Rent", vendor.id, cash.id, usd(100), date(2024, 4, 1))
                .every(1, Period::Month),
        )
        .unwrap();

    let first = ledger.create_pending_transfers(schedule.id).unwrap();
    assert_eq!(first.created.len(), 3);
    assert_eq!(first.window, Some((date(2024, 4, 1), today)));
    assert_eq!(first.watermark, today);

    let second = ledger.create_pending_transfers(schedule.id).unwrap();
    assert!(second.created.is_empty());
    assert_eq!(ledger.schedule_transfers(schedule.id).unwrap().len(), 3);
    assert_eq!(
        ledger.get_schedule(schedule.id).unwrap().last_materialized_on,
        Some(today)
    );

    ledger.set_clock(FixedClock(date(2024, 7, 1)));
    let next = ledger.create_pending_transfers(schedule.id).unwrap();
    assert_eq!(next.created.len(), 1);
    assert_eq!(next.created[0].pending_on, date(2024, 7, 1));
    assert_eq!(next.window, Some((date(2024, 6, 16), date(2024, 7, 1))));
}

#[test]
fn one_time_schedule_respects_its_end_date() {
    let today = date(2024, 6, 15);
    let (mut ledger, org) = ledger_on(today);
    let cash = funded(&mut ledger, &org, "Checking", AccountKind::Cash, usd(1_000));
    let vendor = account(&mut ledger, &org, "Plumber", AccountKind::Vendor);

    let weekly = ledger
        .create_schedule(
            NewSchedule::once("Cleaning", vendor.id, cash.id, usd(20), date(2024, 6, 1))
                .every(1, Period::Week)
                .until(date(2024, 6, 15)),
        )
        .unwrap();
    assert_eq!(
        ledger.transfer_dates(weekly.id, date(2024, 12, 31)).unwrap(),
        vec![date(2024, 6, 1), date(2024, 6, 8), date(2024, 6, 15)]
    );

    let once = ledger
        .create_schedule(NewSchedule::once(
            "Repair",
            vendor.id,
            cash.id,
            usd(90),
            date(2024, 7, 4),
        ))
        .unwrap();
    assert!(ledger.transfer_dates(once.id, today).unwrap().is_empty());
    assert_eq!(
        ledger.transfer_dates(once.id, date(2024, 7, 4)).unwrap(),
        vec![date(2024, 7, 4)]
    );
}

#[test]
fn schedule_validation_collects_messages() {
    let today = date(2024, 6, 15);
    let (mut ledger, org) = ledger_on(today);
    let cash = account(&mut ledger, &org, "Checking", AccountKind::Cash);
    let vendor = account(&mut ledger, &org, "Landlord", AccountKind::Vendor);

    let mut new = NewSchedule::once("Rent", vendor.id, cash.id, usd(100), today).until(date(2024, 6, 1));
    new.frequency = Some(0);
    new.amount = None;
    let messages = ledger.create_schedule(new).unwrap_err().messages().to_vec();

    assert!(messages.contains(&"amount can't be blank".to_string()));
    assert!(messages.contains(&"period must be present when frequency is set".to_string()));
    assert!(messages.contains(&"frequency must be greater than 0".to_string()));
    assert!(messages.contains(&"ends_on must be on or after starts_on".to_string()));
    assert!(ledger.list_schedules().unwrap().is_empty());
}

#[test]
fn destroying_a_schedule_keeps_its_transfers() {
    let today = date(2024, 6, 15);
    let (mut ledger, org) = ledger_on(today);
    let cash = funded(&mut ledger, &org, "Checking", AccountKind::Cash, usd(1_000));
    let vendor = account(&mut ledger, &org, "Landlord", AccountKind::Vendor);
    let schedule = ledger
        .create_schedule(NewSchedule::once("Deposit", vendor.id, cash.id, usd(300), today))
        .unwrap();
    let created = ledger.create_pending_transfers(schedule.id).unwrap().created;
    assert_eq!(created.len(), 1);

    ledger.destroy_schedule(schedule.id).unwrap();

    let kept = ledger.get_transfer(created[0].id).unwrap();
    assert_eq!(kept.schedule_id, None);
    assert!(matches!(
        ledger.get_schedule(schedule.id),
        Err(LedgerError::NotFound { entity: "schedule", .. })
    ));
}

#[test]
fn periodic_job_reports_failures_and_keeps_going() {
    let today = date(2024, 6, 15);
    let (mut ledger, org) = ledger_on(today);
    let cash = funded(&mut ledger, &org, "Checking", AccountKind::Cash, usd(1_000));
    let vendor = account(&mut ledger, &org, "Landlord", AccountKind::Vendor);
    let card = funded(&mut ledger, &org, "Visa", AccountKind::CreditCard, usd(10));

    let overpay = ledger
        .create_schedule(NewSchedule::once("Overpay", card.id, cash.id, usd(50), today))
        .unwrap();
    let rent = ledger
        .create_schedule(
            NewSchedule::once("Rent", vendor.id, cash.id, usd(100), date(2024, 5, 1))
                .every(1, Period::Month),
        )
        .unwrap();

    let report = ledger.materialize_all().unwrap();

    assert_eq!(report.failed.len(), 1);
    let (failed_id, err) = &report.failed[0];
    assert_eq!(*failed_id, overpay.id);
    assert!(matches!(
        err,
        LedgerError::Balance(BalanceViolation::CreditCardWouldGoNegative { .. })
    ));
    assert_eq!(report.transfers_created(), 2);
    assert_eq!(ledger.schedule_transfers(rent.id).unwrap().len(), 2);
    assert!(ledger.schedule_transfers(overpay.id).unwrap().is_empty());
    assert_eq!(ledger.get_schedule(overpay.id).unwrap().last_materialized_on, None);
}

#[test]
fn month_end_schedule_steps_from_the_previous_date() {
    let today = date(2024, 4, 30);
    let (mut ledger, org) = ledger_on(today);
    let cash = funded(&mut ledger, &org, "Checking", AccountKind::Cash, usd(1_000));
    let vendor = account(&mut ledger, &org, "Landlord", AccountKind::Vendor);
    let schedule = ledger
        .create_schedule(
            NewSchedule::once("Rent", vendor.id, cash.id, usd(100), date(2024, 1, 31))
                .every(1, Period::Month),
        )
        .unwrap();

    let expected = vec![date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 29), date(2024, 4, 29)];
    assert_eq!(ledger.transfer_dates(schedule.id, today).unwrap(), expected);

    let created = ledger.create_pending_transfers(schedule.id).unwrap().created;
    let pending_on: Vec<_> = created.iter().map(|t| t.pending_on).collect();
    assert_eq!(pending_on, expected);
}
