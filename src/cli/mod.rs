//! CLI module for PMP Workflow Chat
//!
//! - `serve`: run the HTTP server
//! - `plan`: print the step list the planner produces for an instruction

pub mod plan;
pub mod serve;

use clap::{Parser, Subcommand};

/// PMP Workflow Chat - multi-step LLM workflows over a streaming chat API
#[derive(Parser)]
#[command(name = "pmp-workflow-chat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve,

    /// Plan the steps for an instruction without executing them
    Plan(plan::PlanArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["pmp-workflow-chat", "serve"]).unwrap();
        assert!(matches!(cli.command, Command::Serve));
    }

    #[test]
    fn test_parse_plan() {
        let cli =
            Cli::try_parse_from(["pmp-workflow-chat", "plan", "Write a haiku", "--pretty"]).unwrap();

        match cli.command {
            Command::Plan(args) => {
                assert_eq!(args.instruction, "Write a haiku");
                assert!(args.pretty);
            }
            Command::Serve => panic!("expected plan"),
        }
    }

    #[test]
    fn test_plan_requires_instruction() {
        assert!(Cli::try_parse_from(["pmp-workflow-chat", "plan"]).is_err());
    }
}
