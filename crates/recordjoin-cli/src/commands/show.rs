use super::{block_on, SourceArgs};
use clap::Args;
use colored::Colorize;
use recordjoin_query::Dataset;

#[derive(Args)]
pub struct ShowCommand {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Only print the value of this column
    pub column: Option<String>,
}

impl ShowCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        block_on(self.run())?
    }

    async fn run(self) -> anyhow::Result<()> {
        let joiner = self.source.open().await?;

        if let Some(column) = &self.column {
            println!("{}", joiner.current_value(column)?.unwrap_or_default());
            return Ok(());
        }

        let entry = joiner.selected()?;
        println!();
        println!(
            "{} {} ({:?})",
            "Entry:".bright_white().bold(),
            entry.key().bright_cyan(),
            entry.state()
        );
        for column in joiner.columns() {
            let value = joiner.current_value(&column)?.unwrap_or_default();
            let label = format!("{}:", column);
            if entry.is_different_from_background(&column) {
                println!("  {} {}", label.bright_white(), value.bright_yellow());
            } else {
                println!("  {} {}", label.bright_white(), value);
            }
        }
        println!();
        Ok(())
    }
}
