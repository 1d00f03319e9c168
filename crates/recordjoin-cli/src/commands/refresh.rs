use super::{block_on, SourceArgs};
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct RefreshCommand {
    #[command(flatten)]
    pub source: SourceArgs,
}

impl RefreshCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        block_on(self.run())?
    }

    async fn run(self) -> anyhow::Result<()> {
        let mut joiner = self.source.open().await?;
        let report = joiner.refresh().await;

        println!(
            "{} {}",
            "Linked:".bright_white().bold(),
            report.linked.to_string().bright_green()
        );
        if !report.lost.is_empty() {
            println!(
                "{} {}",
                "Not found:".bright_white().bold(),
                report.lost.join(", ").bright_red()
            );
        }
        if !report.schema.is_empty() {
            println!(
                "{} added {:?}, removed {:?}",
                "Schema changed:".bright_white().bold(),
                report.schema.added,
                report.schema.removed
            );
        }
        Ok(())
    }
}
