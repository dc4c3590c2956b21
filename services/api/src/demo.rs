use std::sync::Arc;

use clap::Args;
use parkpass::enrollment::{EnrollmentService, ScheduleId, VisitorDraft, VisitorInput};
use parkpass::error::AppError;

use crate::infra::InMemoryPark;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Schedule to enroll the sample group into (defaults to the morning
    /// zipline slot)
    #[arg(long)]
    pub(crate) schedule_id: Option<u64>,
}

fn tuple(name: &str, national_id: u64, age: i64, size: Option<&str>) -> VisitorInput {
    VisitorInput::ByNaturalKey(VisitorDraft {
        name: name.to_string(),
        national_id,
        age,
        size: size.map(str::to_string),
    })
}

fn sample_group() -> Vec<VisitorInput> {
    vec![
        tuple("Sofia", 44444444, 30, Some("M")),
        tuple("Marco", 55555555, 12, Some("L")),
    ]
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let schedule_id = ScheduleId(args.schedule_id.unwrap_or(1));

    let park = Arc::new(InMemoryPark::seeded());
    let service = EnrollmentService::new(park.clone(), park.clone(), park.clone());

    println!("Park enrollment demo");
    println!("Seeded schedules:");
    for entry in park.overview() {
        println!(
            "  - schedule {} | {} {}-{} | {} | {}/{} seats taken",
            entry.schedule_id,
            entry.activity_name,
            entry.starts_at,
            entry.ends_at,
            entry.status,
            entry.occupied_capacity,
            entry.total_capacity
        );
    }

    match service
        .enroll(schedule_id, sample_group(), true)
        .and_then(|rows| service.enriched(rows))
    {
        Ok(receipt) => {
            println!("\nEnrolled {} visitor(s):", receipt.len());
            for row in &receipt {
                println!(
                    "  - enrollment {} | {} | visitor {} | terms accepted: {}",
                    row.enrollment_id, row.activity_name, row.visitor_id, row.terms_accepted
                );
            }
        }
        Err(error) => {
            println!("\nEnrollment refused: {error}");
            return Ok(());
        }
    }

    // the same group again demonstrates the duplicate guard
    match service.enroll(schedule_id, sample_group(), true) {
        Err(error) => println!("\nSecond attempt refused as expected: {error}"),
        Ok(_) => println!("\nSecond attempt unexpectedly succeeded"),
    }

    println!("\nOccupancy after the demo:");
    for entry in park.overview() {
        println!(
            "  - schedule {} | {} | {}/{} seats taken",
            entry.schedule_id, entry.activity_name, entry.occupied_capacity, entry.total_capacity
        );
    }

    Ok(())
}
