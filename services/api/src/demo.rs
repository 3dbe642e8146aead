use crate::infra::{
    seed_catalog, seed_directory, seed_principals, InMemorySubmissionStore,
    LoggingNotificationSink,
};
use chrono::{Local, NaiveDate, Utc};
use clap::Args;
use eduflow::error::AppError;
use eduflow::workflows::submissions::domain::{
    CategoryId, ColumnId, Principal, PrincipalId, SchoolId, SubmissionId,
};
use eduflow::workflows::submissions::service::{DraftEntry, SubmissionWorkflowService};
use eduflow::workflows::submissions::{BulkParams, ValidationReport};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reporting date for the dashboard (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Skip the bulk-approval portion of the demo.
    #[arg(long)]
    pub(crate) skip_bulk: bool,
}

type DemoService = SubmissionWorkflowService<InMemorySubmissionStore, LoggingNotificationSink>;

fn actor(principals: &eduflow::workflows::submissions::PrincipalDirectory, id: &str) -> Principal {
    principals
        .resolve(&PrincipalId(id.to_string()))
        .cloned()
        .expect("seeded principal")
}

fn submission(school: &str) -> SubmissionId {
    SubmissionId {
        school: SchoolId(school.to_string()),
        category: CategoryId("enrollment-census".to_string()),
    }
}

fn entry(column: &str, value: &str) -> DraftEntry {
    DraftEntry {
        column: ColumnId(column.to_string()),
        value: Some(value.to_string()),
    }
}

fn render_report(report: &ValidationReport) {
    if report.is_clean() && !report.has_warnings() {
        println!("  validation: clean");
        return;
    }
    for issue in &report.errors {
        println!("  error [{}]: {}", issue.column.0, issue.message);
    }
    for issue in &report.warnings {
        println!("  warning [{}]: {}", issue.column.0, issue.message);
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let now = Utc::now();

    let store = Arc::new(InMemorySubmissionStore::default());
    let service = DemoService::new(
        store,
        Arc::new(LoggingNotificationSink::default()),
        Arc::new(seed_catalog()),
        Arc::new(seed_directory()),
    );
    let principals = seed_principals();

    let school_office = actor(&principals, "school-101-office");
    let reviewer = actor(&principals, "coastal-office");
    let id = submission("school-101");

    println!("Submission workflow demo ({today})");

    println!("\n1. school-101 drafts an incomplete enrollment census");
    service
        .save_draft(
            &school_office,
            SchoolId("school-101".to_string()),
            CategoryId("enrollment-census".to_string()),
            vec![entry("head_teacher", "Aysel Mammadova")],
            now,
        )
        .await?;
    let report = service
        .validate_now(
            &SchoolId("school-101".to_string()),
            &CategoryId("enrollment-census".to_string()),
        )
        .await?;
    render_report(&report);

    println!("\n2. the draft is completed and submitted for review");
    service
        .save_draft(
            &school_office,
            SchoolId("school-101".to_string()),
            CategoryId("enrollment-census".to_string()),
            vec![
                entry("pupil_count", "412"),
                entry("contact_email", "office@school-101.example.org"),
            ],
            now,
        )
        .await?;
    let receipt = service.submit(&school_office, id.clone(), now).await?;
    println!("  {} -> {}", receipt.old_status, receipt.new_status);

    println!("\n3. the sector office rejects it with a reason");
    let receipt = service
        .reject(&reviewer, id.clone(), "pupil count disagrees with last term", now)
        .await?;
    println!("  {} -> {}", receipt.old_status, receipt.new_status);

    println!("\n4. the school corrects the count and resubmits");
    service
        .save_draft(
            &school_office,
            SchoolId("school-101".to_string()),
            CategoryId("enrollment-census".to_string()),
            vec![entry("pupil_count", "398")],
            now,
        )
        .await?;
    let receipt = service.submit(&school_office, id.clone(), now).await?;
    println!("  {} -> {}", receipt.old_status, receipt.new_status);

    println!("\n5. the sector office approves");
    let receipt = service.approve(&reviewer, id.clone(), now).await?;
    println!("  {} -> {}", receipt.old_status, receipt.new_status);

    if !args.skip_bulk {
        println!("\n6. school-102 submits and the batch is bulk-approved");
        let sibling = actor(&principals, "school-102-office");
        service
            .save_draft(
                &sibling,
                SchoolId("school-102".to_string()),
                CategoryId("enrollment-census".to_string()),
                vec![
                    entry("head_teacher", "Elvin Guliyev"),
                    entry("pupil_count", "605"),
                    entry("contact_email", "office@school-102.example.org"),
                ],
                now,
            )
            .await?;
        service
            .submit(&sibling, submission("school-102"), now)
            .await?;

        let outcome = service
            .bulk_approve(
                &reviewer,
                &[submission("school-101"), submission("school-102")],
                BulkParams::default(),
                None,
                now,
            )
            .await?;
        println!(
            "  processed {} | errors {} | already applied counted as processed",
            outcome.processed_count, outcome.error_count
        );
    }

    println!("\n7. region dashboard");
    let ministry = actor(&principals, "ministry");
    let view = service.dashboard(&ministry, today).await?;
    println!(
        "  submissions: {} total | {} draft | {} pending | {} approved | {} rejected",
        view.overall.total,
        view.overall.draft,
        view.overall.pending,
        view.overall.approved,
        view.overall.rejected
    );
    for sector in &view.sectors {
        println!(
            "  {}: {} schools | {}% complete",
            sector.sector.0, sector.schools_count, sector.completion
        );
    }
    for region in &view.regions {
        println!(
            "  {}: {} sectors | {}% complete",
            region.region.0, region.sectors_count, region.completion
        );
    }
    for badge in &view.deadlines {
        println!("  deadline {}: {:?}", badge.category_name, badge.status);
    }

    Ok(())
}
