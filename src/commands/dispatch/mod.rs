//! Command dispatch logic for vecbench

use std::time::Instant;

use crate::cli::{Cli, Commands};
use vecbench_core::error::Result;

mod command;

use command::{Command, CommandContext, NoCommand};

pub fn run(cli: &Cli, start: Instant) -> Result<()> {
    let ctx = CommandContext::new(cli, start);

    match &cli.command {
        None => NoCommand.execute(&ctx),
        Some(cmd) => cmd.execute(&ctx),
    }
}

impl Command for Commands {
    fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            Commands::Run(args) => crate::commands::run::execute(ctx.cli, args, ctx.start),
            Commands::Config { output } => crate::commands::config::execute(ctx.cli, output.as_deref()),
        }
    }
}
