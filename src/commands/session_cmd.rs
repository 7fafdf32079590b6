use clap::{Args, Subcommand, ValueEnum};
use std::io::{self, Write};

use client_sync::sync::{serialize, SessionHub};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct SessionCommand {
    #[command(subcommand)]
    pub command: SessionSubcommand,
}

#[derive(Subcommand)]
pub enum SessionSubcommand {
    /// Show a session's acknowledged, pending and staged state
    Show {
        /// Session ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Commit whatever is staged
    Commit {
        /// Session ID
        id: String,
    },

    /// Acknowledge a sequence number on the client's behalf
    Ack {
        /// Session ID
        id: String,

        /// Sequence number the client now holds
        seq_num: u64,
    },

    /// Print the payload the client would receive next
    Diff {
        /// Session ID
        id: String,
    },

    /// Delete a session
    Clear {
        /// Session ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl SessionCommand {
    pub async fn run(&self, hub: &SessionHub) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            SessionSubcommand::Show { id, format } => {
                let record = hub.session(id)?.snapshot().await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&record)?);
                    }
                    OutputFormat::Text => {
                        let pending = record.versions.peek_pending();
                        println!("Session: {}", id);
                        println!("Acknowledged seq: {}", record.baseline.pushed_seq_num);
                        println!("Latest seq: {}", record.versions.head_seq_num());
                        println!();

                        println!("Pending commits: {}", pending.len());
                        for entry in pending {
                            println!("  {:>4}  {}", entry.seq_num, serialize(&entry.data)?);
                        }
                        println!();

                        let staged = record.versions.staged();
                        if staged.is_empty() {
                            println!("Nothing staged");
                        } else {
                            println!("Staged:");
                            for (section, values) in staged {
                                let count = values.as_object().map(|m| m.len()).unwrap_or(0);
                                println!("  {}: {} key(s)", section, count);
                            }
                        }
                    }
                }
                Ok(())
            }

            SessionSubcommand::Commit { id } => {
                match hub.session(id)?.commit().await? {
                    Some(seq_num) => println!("Committed seq {}", seq_num),
                    None => println!("Nothing staged"),
                }
                Ok(())
            }

            SessionSubcommand::Ack { id, seq_num } => {
                let cds = hub.session(id)?;
                cds.acknowledge(*seq_num).await?;
                println!("Acknowledged seq {}", cds.get_pushed_seq_num().await?);
                Ok(())
            }

            SessionSubcommand::Diff { id } => {
                match hub.session(id)?.calculate_diff().await? {
                    Some(payload) => println!("{}", serde_json::to_string(&payload)?),
                    None => println!("Up to date"),
                }
                Ok(())
            }

            SessionSubcommand::Clear { id, force } => {
                let cds = hub.session(id)?;

                if !force {
                    print!("Delete session '{}'? [y/N] ", id);
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                if cds.clear().await? {
                    println!("Deleted session: {}", id);
                } else {
                    println!("Session not found: {}", id);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use client_sync::server::MemoryStorage;
    use client_sync::state::Schema;
    use serde_json::json;
    use std::sync::Arc;

    fn hub() -> SessionHub {
        SessionHub::new(Arc::new(MemoryStorage::new(None)), Schema::default())
    }

    #[tokio::test]
    async fn test_commit_and_ack_commands() {
        let hub = hub();
        hub.session("s1")
            .unwrap()
            .stage("search_results", "q", json!([1]))
            .await
            .unwrap();

        SessionCommand {
            command: SessionSubcommand::Commit { id: "s1".into() },
        }
        .run(&hub)
        .await
        .unwrap();
        SessionCommand {
            command: SessionSubcommand::Ack {
                id: "s1".into(),
                seq_num: 2,
            },
        }
        .run(&hub)
        .await
        .unwrap();

        let cds = hub.session("s1").unwrap();
        assert_eq!(cds.get_pushed_seq_num().await.unwrap(), 2);
        assert!(cds.get_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ack_beyond_pending_fails() {
        let result = SessionCommand {
            command: SessionSubcommand::Ack {
                id: "s1".into(),
                seq_num: 9,
            },
        }
        .run(&hub())
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_forced_clear() {
        let hub = hub();
        hub.session("s1").unwrap().acknowledge(1).await.unwrap();

        SessionCommand {
            command: SessionSubcommand::Clear {
                id: "s1".into(),
                force: true,
            },
        }
        .run(&hub)
        .await
        .unwrap();

        assert_eq!(
            hub.session("s1").unwrap().get_pushed_seq_num().await.unwrap(),
            0
        );
    }
}
