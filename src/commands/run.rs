//! Implementation of the `subagent run` command.

use super::{cancel_on_ctrl_c, print_reply};
use crate::cli::RunArgs;
use crate::dispatch::{Dispatcher, SpawnAgentArgs};

/// Run one task and print the agent's final message.
pub async fn cmd_run(dispatcher: &Dispatcher, args: RunArgs) -> anyhow::Result<()> {
    let cancel = cancel_on_ctrl_c();
    let reply = dispatcher
        .spawn_agent(
            SpawnAgentArgs {
                prompt: args.prompt,
                work_dir: args.work_dir,
                model: args.model,
                session_id: None,
            },
            &cancel,
        )
        .await?;
    print_reply(&reply, args.json)
}
