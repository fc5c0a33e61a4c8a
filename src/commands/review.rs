//! Implementation of the `subagent review` command.

use super::{cancel_on_ctrl_c, print_reply};
use crate::cli::ReviewCmdArgs;
use crate::dispatch::{Dispatcher, ReviewArgs};

pub async fn cmd_review(dispatcher: &Dispatcher, args: ReviewCmdArgs) -> anyhow::Result<()> {
    let review_type = match args.review_type {
        Some(review_type) if !args.list => review_type,
        _ => {
            for name in dispatcher.templates().names() {
                println!("{}", name);
            }
            return Ok(());
        }
    };

    let cancel = cancel_on_ctrl_c();
    let reply = dispatcher
        .review(
            ReviewArgs {
                review_type,
                work_dir: args.work_dir,
                target: args.target,
                custom_prompt: args.custom_prompt,
                model: args.model,
                session_id: None,
            },
            &cancel,
        )
        .await?;
    print_reply(&reply, args.json)
}
