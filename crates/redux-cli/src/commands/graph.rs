use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::summary;

#[derive(Args)]
pub struct GraphArgs {
    /// Config file (TOML) whose recipe replaces the standard graph
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Only show the chain starting at this event
    #[arg(long)]
    pub from: Option<String>,
}

pub fn run(args: &GraphArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let graph = config.recipe_graph();
    graph.validate()?;

    match &args.from {
        Some(event) => {
            let path = graph.path_from(event)?;
            summary::print_chain(&graph, &path);
        }
        None => summary::print_graph(&graph, graph.longest_chain()?),
    }
    Ok(())
}
