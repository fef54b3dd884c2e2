//! Plan command - runs only the step planner

use clap::Args;

use crate::config::AppConfig;
use crate::domain::workflow::{StepPlan, StepPlanner};
use crate::infrastructure::logging::init_logging;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Instruction to break into steps
    pub instruction: String,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// Print the planned steps as JSON on stdout
pub async fn run(args: PlanArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    init_logging(&config.logging);

    let planner = crate::create_planner(&config)?;
    let plan = planner.parse_steps(&args.instruction).await;

    println!("{}", render(&plan, args.pretty)?);

    Ok(())
}

fn render(plan: &StepPlan, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(plan)
    } else {
        serde_json::to_string(plan)
    }
}
