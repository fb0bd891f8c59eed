use workerlink_channel::{connect_with_config, ChannelConfig, TargetSelector};

use crate::cmd::{parse_duration, parse_json, runtime, RequestArgs};
use crate::exit::{channel_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_response, OutputFormat};

pub fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let target = resolve_target(args.internal.as_deref())?;
    let data = args
        .data
        .as_deref()
        .map(|data| parse_json("data", data))
        .transpose()?;

    let config = ChannelConfig::default().with_request_timeout(timeout);
    let response = runtime()?.block_on(async {
        let channel = connect_with_config(&args.path, config)
            .map_err(|err| channel_error("connect failed", err))?;
        let response = channel
            .request(&args.method, &target, data)
            .await
            .map_err(|err| channel_error("request failed", err));
        channel.close();
        response
    })?;

    print_response(&args.method, &response, format);
    Ok(SUCCESS)
}

fn resolve_target(internal: Option<&str>) -> CliResult<TargetSelector> {
    let Some(internal) = internal else {
        return Ok(TargetSelector::new());
    };
    let value = parse_json("internal", internal)?;
    if !value.is_object() {
        return Err(CliError::new(USAGE, "--internal must be a JSON object"));
    }
    serde_json::from_value(value)
        .map_err(|err| CliError::new(USAGE, format!("--internal is not a target selector: {err}")))
}
