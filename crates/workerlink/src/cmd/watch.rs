use tokio::sync::mpsc;
use workerlink_channel::{connect, Notification};

use crate::cmd::{runtime, WatchArgs};
use crate::exit::{channel_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_notification, OutputFormat};

enum Stop {
    CountReached,
    Interrupted,
    LinkClosed,
}

pub fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let stop = runtime()?.block_on(async {
        let channel = connect(&args.path).map_err(|err| channel_error("connect failed", err))?;

        let (tx, mut notifications) = mpsc::unbounded_channel::<Notification>();
        for event in &args.event {
            let tx = tx.clone();
            channel.subscribe(args.target.as_str(), event.as_str(), move |n: &Notification| {
                let _ = tx.send(n.clone());
            });
        }
        drop(tx);
        tracing::info!(target_id = %args.target, events = ?args.event, "watching notifications");

        let mut printed = 0usize;
        let stop = loop {
            tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => break Stop::Interrupted,
                next = notifications.recv() => match next {
                    Some(notification) => {
                        print_notification(&notification, format);
                        printed = printed.saturating_add(1);
                        if args.count.is_some_and(|count| printed >= count) {
                            break Stop::CountReached;
                        }
                    }
                    None => break Stop::LinkClosed,
                },
                _ = channel.closed() => break Stop::LinkClosed,
            }
        };
        channel.close();
        Ok::<_, CliError>(stop)
    })?;

    match stop {
        Stop::CountReached | Stop::Interrupted => Ok(SUCCESS),
        Stop::LinkClosed if args.count.is_none() => Ok(SUCCESS),
        Stop::LinkClosed => Err(CliError::new(
            FAILURE,
            "worker closed the channel before enough notifications arrived",
        )),
    }
}
