//! Integration tests for reconciliation runs
//!
//! Each test seeds an in-memory store, reads a small CSV sheet and runs the
//! driver end to end, in dry-run and live mode.

use chrono::NaiveDate;
use feeguard::batch::parse_batch_code;
use feeguard::model::{
    Batch, BatchStatus, CourseFee, CourseFeeTable, FeeRecord, Level, ScheduleEntry, Stage, Student,
};
use feeguard::reconcile::{rederive_batch_codes, FeeIssue, RecordAction, StudentAction};
use feeguard::{
    AuthoritativeSnapshot, CreditLedger, EngineConfig, FeeCycleEngine, FeeMonth, FeeStatus, InMemoryStore,
    LedgerStore, ReconciliationDriver, ReconciliationReport, RunContext,
};
use rust_decimal::Decimal;
use uuid::Uuid;

const SHEET: &str = "Name,Phone,Email,Status,Student Start Date,Level,Batch Code,Batch Start Date,Due Date,Payment Status,Paid Date,Due Date 2,Payment Status 2,Paid Date 2,Paid Amount 2
Asha Rao,,asha@example.com,Active,2026-01-05,B1,WF:2:30,2026-01-05,2026-01-05,Paid,2026-01-04,2026-02-05,Partial,2026-02-07,400
Ravi Kumar,98450 11111,,Active,2026-03-01,B1,SS:4:30,,2026-03-01,Paid,2026-03-01,,,,
,,,,,,,,,,,,,,
Meera,,meera@example.com,Active,2026-02-01,Z9,WF:2:30,2026-01-05,,,,,,,
";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> NaiveDate {
    date(2026, 4, 10)
}

fn fees() -> CourseFeeTable {
    CourseFeeTable::new(vec![CourseFee {
        stage: Stage::Beginner,
        level: Level::new(1).unwrap(),
        fee_amount: Decimal::from(1000),
        duration_months: None,
        active: true,
    }])
}

fn schedule(code: &str) -> Vec<ScheduleEntry> {
    let parsed = parse_batch_code(code).unwrap();
    parsed
        .days
        .iter()
        .map(|&day| ScheduleEntry { day, time: parsed.time })
        .collect()
}

fn untouched(student_id: Uuid, month: u32) -> FeeRecord {
    let fee_month = FeeMonth::new(2026, month).unwrap();
    FeeRecord {
        id: Uuid::new_v4(),
        student_id,
        fee_month,
        due_date: date(2026, month, 5),
        fee_amount: Decimal::from(1000),
        paid_amount: Decimal::ZERO,
        payment_date: None,
        stage: Stage::Beginner,
        level: Level::new(1).unwrap(),
    }
}

/// One active batch and one enrolled student with January and February billed
fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    let batch = Batch {
        id: Uuid::new_v4(),
        code: "WF:2:30".to_string(),
        base_code: "WF:2:30".to_string(),
        stage: Stage::Beginner,
        level: Level::new(1).unwrap(),
        schedule: schedule("WF:2:30"),
        status: BatchStatus::Active,
        start_date: Some(date(2026, 1, 5)),
        timing: None,
    };
    store.insert_batch(&batch).unwrap();

    let student = Student {
        id: Uuid::new_v4(),
        name: "Asha Rao".to_string(),
        email: Some("asha@example.com".to_string()),
        phone: None,
        stage: Stage::Beginner,
        level: Level::new(1).unwrap(),
        batch_id: Some(batch.id),
        enrollment_date: date(2026, 1, 5),
        fee_cycle_start_date: Some(date(2026, 1, 5)),
        is_active: true,
    };
    store.insert_student(&student).unwrap();
    store.insert_fee_record(&untouched(student.id, 1)).unwrap();
    store.insert_fee_record(&untouched(student.id, 2)).unwrap();
    store
}

fn run(store: &InMemoryStore, table: &CourseFeeTable, dry_run: bool) -> ReconciliationReport {
    run_sheet(store, table, SHEET, dry_run)
}

fn run_sheet(store: &InMemoryStore, table: &CourseFeeTable, sheet: &str, dry_run: bool) -> ReconciliationReport {
    let snapshot = AuthoritativeSnapshot::from_csv_bytes(sheet.as_bytes()).unwrap();
    let context = RunContext::resolve(store, &EngineConfig::default(), today(), dry_run).unwrap();
    ReconciliationDriver::new(store, FeeCycleEngine::new(table), &context)
        .run(&snapshot)
        .unwrap()
}

fn student_named(store: &InMemoryStore, name: &str) -> Student {
    store
        .students()
        .unwrap()
        .into_iter()
        .find(|s| s.name == name)
        .unwrap()
}

#[test]
fn test_dry_run_and_live_report_the_same_findings() {
    let table = fees();
    let dry_store = seeded_store();
    let live_store = seeded_store();

    let dry = run(&dry_store, &table, true);
    let live = run(&live_store, &table, false);

    assert!(dry.dry_run);
    assert!(!live.dry_run);
    assert_eq!(dry.snapshot_checksum, live.snapshot_checksum);
    assert_eq!(dry.batches, live.batches);
    assert_eq!(dry.students, live.students);
    assert_eq!(dry.tally, live.tally);
}

#[test]
fn test_dry_run_writes_nothing() {
    let table = fees();
    let store = seeded_store();

    let report = run(&store, &table, true);

    assert_eq!(report.tally.processed, 3);
    assert_eq!(store.students().unwrap().len(), 1);
    assert_eq!(store.batches().unwrap().len(), 1);
    assert_eq!(store.all_fee_records().len(), 2);
    assert!(store.all_fee_records().iter().all(FeeRecord::is_untouched));
    assert!(store.admin_by_email("admin@feeguard.local").unwrap().is_none());
}

#[test]
fn test_live_run_converges_on_the_sheet() {
    let table = fees();
    let store = seeded_store();

    let report = run(&store, &table, false);

    assert_eq!(report.tally.processed, 3);
    assert_eq!(report.tally.succeeded, 2);
    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.tally.skipped, 1);

    let asha = &report.students[0];
    assert_eq!(asha.action, StudentAction::Updated);
    assert_eq!(asha.deleted, 2);
    assert_eq!(asha.created, 4);
    let march = FeeMonth::new(2026, 3).unwrap();
    assert!(asha.issues.contains(&FeeIssue::MissingMonth { month: march }));
    assert!(asha.issues.contains(&FeeIssue::PaidNotMarked {
        month: FeeMonth::new(2026, 1).unwrap()
    }));

    let student = student_named(&store, "Asha Rao");
    let records = store.fee_records(student.id).unwrap();
    let statuses: Vec<FeeStatus> = records.iter().map(|r| r.status(today())).collect();
    assert_eq!(
        statuses,
        vec![
            FeeStatus::Paid,
            FeeStatus::PartiallyPaid,
            FeeStatus::Overdue,
            FeeStatus::Overdue
        ]
    );
    assert_eq!(records[0].payment_date, Some(date(2026, 1, 4)));
    assert_eq!(records[1].paid_amount, Decimal::from(400));

    assert!(store.admin_by_email("admin@feeguard.local").unwrap().is_some());
}

#[test]
fn test_draft_batch_payments_become_credit() {
    let table = fees();
    let store = seeded_store();

    let report = run(&store, &table, false);

    let ravi = &report.students[1];
    assert_eq!(ravi.action, StudentAction::Created);
    assert_eq!(ravi.batch_code.as_deref(), Some("SS:4:30"));
    assert_eq!(ravi.credit_deposited, Decimal::from(1000));
    assert!(ravi.issues.contains(&FeeIssue::StudentWillBeCreated));

    let draft = report.batches.iter().find(|b| b.code == "SS:4:30").unwrap();
    assert_eq!(draft.status, BatchStatus::Draft);
    assert_eq!(draft.action, RecordAction::Created);

    let student = student_named(&store, "Ravi Kumar");
    assert!(store.fee_records(student.id).unwrap().is_empty());
    assert_eq!(CreditLedger::new(&store).balance(student.id).unwrap(), Decimal::from(1000));
    assert!(store.identity_account_for(student.id).unwrap().is_some());
}

#[test]
fn test_failed_row_does_not_stop_the_run() {
    let table = fees();
    let store = seeded_store();

    let report = run(&store, &table, false);

    let meera = &report.students[2];
    assert_eq!(meera.action, StudentAction::Failed);
    assert_eq!(meera.line, 5);
    assert!(meera.error.as_deref().unwrap().contains("Z9"));
    assert!(store.students().unwrap().iter().all(|s| s.name != "Meera"));
}

#[test]
fn test_second_live_run_changes_nothing() {
    let table = fees();
    let store = seeded_store();
    run(&store, &table, false);
    let records_before = store.all_fee_records();
    let students_before = store.students().unwrap().len();

    let report = run(&store, &table, false);

    assert_eq!(report.students[0].action, StudentAction::Unchanged);
    assert!(report.students[0].issues.is_empty());
    assert_eq!(report.students[1].action, StudentAction::Unchanged);
    assert_eq!(report.students[1].credit_deposited, Decimal::ZERO);
    assert!(report.batches.iter().all(|b| b.action == RecordAction::Unchanged));
    assert_eq!(store.all_fee_records(), records_before);
    assert_eq!(store.students().unwrap().len(), students_before);
}

#[test]
fn test_batch_start_date_promotes_draft_and_settles_banked_payment() {
    const DRAFT: &str = "Name,Phone,Status,Student Start Date,Level,Batch Code,Batch Start Date,Due Date,Payment Status,Paid Date
Ravi Kumar,98450 11111,Active,2026-03-01,B1,SS:4:30,,2026-03-01,Paid,2026-03-01
";
    const STARTED: &str = "Name,Phone,Status,Student Start Date,Level,Batch Code,Batch Start Date,Due Date,Payment Status,Paid Date
Ravi Kumar,98450 11111,Active,2026-03-01,B1,SS:4:30,2026-03-01,2026-03-01,Paid,2026-03-01
";
    let table = fees();
    let store = InMemoryStore::new();
    run_sheet(&store, &table, DRAFT, false);
    let student = student_named(&store, "Ravi Kumar");
    let ledger = CreditLedger::new(&store);
    assert_eq!(ledger.balance(student.id).unwrap(), Decimal::from(1000));

    let report = run_sheet(&store, &table, STARTED, false);

    let batches = store.batches().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].code, "SS:4:30");
    assert_eq!(batches[0].status, BatchStatus::Active);
    assert_eq!(batches[0].start_date, Some(date(2026, 3, 1)));
    assert_eq!(report.batches[0].action, RecordAction::Updated);
    assert!(report.batches[0].changes.iter().any(|c| c.field == "start_date"));

    let ravi = &report.students[0];
    assert_eq!(ravi.action, StudentAction::Updated);
    assert_eq!(ravi.credit_deposited, Decimal::ZERO);
    assert_eq!(ravi.credit_applied, Decimal::from(1000));

    let records = store.fee_records(student.id).unwrap();
    let total_paid: Decimal = records.iter().map(|r| r.paid_amount).sum();
    assert_eq!(total_paid, Decimal::from(1000));
    let march = records
        .iter()
        .find(|r| r.fee_month == FeeMonth::new(2026, 3).unwrap())
        .unwrap();
    assert_eq!(march.status(today()), FeeStatus::Paid);
    assert_eq!(march.payment_date, Some(date(2026, 3, 1)));
    assert_eq!(ledger.balance(student.id).unwrap(), Decimal::ZERO);

    let records_before = store.all_fee_records();
    let again = run_sheet(&store, &table, STARTED, false);
    assert_eq!(again.students[0].action, StudentAction::Unchanged);
    assert!(again.batches.iter().all(|b| b.action == RecordAction::Unchanged));
    assert_eq!(store.all_fee_records(), records_before);
    assert_eq!(ledger.balance(student.id).unwrap(), Decimal::ZERO);
}

#[test]
fn test_siblings_sharing_a_phone_stay_separate() {
    const SIBLINGS: &str = "Name,Phone,Email,Status,Student Start Date,Level,Batch Code,Batch Start Date
Anu Sharma,98450 22222,,Active,2026-01-05,B1,WF:2:30,2026-01-05
Arjun Sharma,98450 22222,arjun@example.com,Active,2026-02-02,B1,WF:2:30,2026-01-05
";
    let table = fees();
    let store = InMemoryStore::new();

    let report = run_sheet(&store, &table, SIBLINGS, false);

    assert_eq!(report.tally.failed, 0);
    let arjun = &report.students[1];
    assert_eq!(arjun.action, StudentAction::Created);
    assert!(arjun.issues.contains(&FeeIssue::ContactNameConflict {
        contact: "phone".to_string(),
        stored_name: "Anu Sharma".to_string(),
    }));
    assert_eq!(store.students().unwrap().len(), 2);

    let anu = student_named(&store, "Anu Sharma");
    let anu_months: Vec<FeeMonth> = store
        .fee_records(anu.id)
        .unwrap()
        .iter()
        .map(|r| r.fee_month)
        .collect();
    assert_eq!(anu_months.first(), Some(&FeeMonth::new(2026, 1).unwrap()));
    let arjun_records = store.fee_records(student_named(&store, "Arjun Sharma").id).unwrap();
    assert_eq!(arjun_records[0].fee_month, FeeMonth::new(2026, 2).unwrap());

    let again = run_sheet(&store, &table, SIBLINGS, false);
    assert_eq!(again.students[0].action, StudentAction::Unchanged);
    assert_eq!(again.students[1].action, StudentAction::Unchanged);
    assert_eq!(store.students().unwrap().len(), 2);
}

#[test]
fn test_rederive_swaps_codes_inside_a_group() {
    let store = InMemoryStore::new();
    let make = |code: &str, status: BatchStatus, start: Option<NaiveDate>| Batch {
        id: Uuid::new_v4(),
        code: code.to_string(),
        base_code: "WF:2:30".to_string(),
        stage: Stage::Beginner,
        level: Level::new(1).unwrap(),
        schedule: schedule("WF:2:30"),
        status,
        start_date: start,
        timing: None,
    };
    let draft = make("WF:2:30", BatchStatus::Draft, None);
    let later = make("WF:2:30-I", BatchStatus::Active, Some(date(2026, 3, 1)));
    let earlier = make("WF:2:30-II", BatchStatus::Active, Some(date(2026, 1, 1)));
    for batch in [&draft, &later, &earlier] {
        store.insert_batch(batch).unwrap();
    }

    let preview = rederive_batch_codes(&store, true).unwrap();
    assert_eq!(preview.len(), 2);
    assert_eq!(store.batch(draft.id).unwrap().unwrap().code, "WF:2:30");

    let applied = rederive_batch_codes(&store, false).unwrap();
    assert_eq!(applied, preview);
    assert_eq!(store.batch(earlier.id).unwrap().unwrap().code, "WF:2:30");
    assert_eq!(store.batch(later.id).unwrap().unwrap().code, "WF:2:30-I");
    assert_eq!(store.batch(draft.id).unwrap().unwrap().code, "WF:2:30-II");

    assert!(rederive_batch_codes(&store, false).unwrap().is_empty());
}
