use super::{block_on, SourceArgs};
use clap::Args;
use colored::Colorize;
use recordjoin_los::EntryState;
use recordjoin_query::Dataset;

#[derive(Args)]
pub struct ListCommand {
    #[command(flatten)]
    pub source: SourceArgs,
}

impl ListCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        block_on(self.run())?
    }

    async fn run(self) -> anyhow::Result<()> {
        let joiner = self.source.open().await?;
        let entries = joiner.entries();
        if entries.is_empty() {
            println!("{}", "No cached entries.".bright_yellow());
            return Ok(());
        }

        let selected = joiner.selected().ok().map(|entry| entry.id());
        for (index, entry) in entries.iter().enumerate() {
            let marker = if Some(entry.id()) == selected { "*" } else { " " };
            let state = match entry.state() {
                EntryState::Linked => "linked".bright_green(),
                EntryState::New => "new".bright_cyan(),
                EntryState::Lost => "lost".bright_red(),
            };
            println!(
                "{} {:>3}  {:<7} {}",
                marker.bright_white().bold(),
                index + 1,
                state,
                entry.key()
            );
        }
        Ok(())
    }
}
