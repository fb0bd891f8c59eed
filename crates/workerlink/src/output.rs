use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use workerlink_channel::{Notification, Response};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    method: &'a str,
    accepted: bool,
    data: Option<&'a Value>,
    timestamp: String,
}

#[derive(Serialize)]
struct NotificationOutput<'a> {
    target_id: &'a str,
    event: &'a str,
    data: Option<&'a Value>,
    timestamp: String,
}

pub fn print_response(method: &str, response: &Response, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                method,
                accepted: true,
                data: response.data(),
                timestamp: now_unix_seconds(),
            };
            print_json_line(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "STATUS", "DATA"])
                .add_row(vec![
                    method.to_string(),
                    "accepted".to_string(),
                    data_preview(response.data()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "method={} accepted data={}",
                method,
                data_pretty(response.data())
            );
        }
        OutputFormat::Raw => {
            print_raw(data_preview(response.data()).as_bytes());
            println!();
        }
    }
}

pub fn print_notification(notification: &Notification, format: OutputFormat) {
    let data = notification.data.as_ref();
    match format {
        OutputFormat::Json => {
            let out = NotificationOutput {
                target_id: &notification.target_id,
                event: &notification.event,
                data,
                timestamp: now_unix_seconds(),
            };
            print_json_line(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TARGET", "EVENT", "DATA"])
                .add_row(vec![
                    notification.target_id.clone(),
                    notification.event.clone(),
                    data_preview(data),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "target={} event={} data={}",
                notification.target_id,
                notification.event,
                data_pretty(data)
            );
        }
        OutputFormat::Raw => {
            print_raw(data_preview(data).as_bytes());
            println!();
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json_line<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn data_preview(data: Option<&Value>) -> String {
    match data {
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

fn data_pretty(data: Option<&Value>) -> String {
    match data {
        Some(value) => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        None => "-".to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
