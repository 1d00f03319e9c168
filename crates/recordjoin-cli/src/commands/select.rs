use super::{block_on, SourceArgs};
use clap::Args;
use colored::Colorize;
use recordjoin_query::Dataset;

#[derive(Args)]
pub struct SelectCommand {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Position of the entry as printed by `list`, starting at 1
    pub index: usize,
}

impl SelectCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        block_on(self.run())?
    }

    async fn run(self) -> anyhow::Result<()> {
        let mut joiner = self.source.open().await?;
        let id = self
            .index
            .checked_sub(1)
            .and_then(|i| joiner.entries().get(i))
            .map(|entry| entry.id())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No entry at position {}, the cache holds {} entries",
                    self.index,
                    joiner.entries().len()
                )
            })?;

        joiner.select(id)?;
        println!(
            "{} {}",
            "Selected:".bright_white().bold(),
            joiner.selected()?.key().bright_cyan()
        );
        Ok(())
    }
}
