use chrono::DateTime;
use chrono::Local;
use replay_recording_log::RecordingEntry;
use replay_recording_log::RecordingLog;

use crate::LsArgs;

const HEADERS: [&str; 5] = ["ID", "Status", "Runtime", "Created", "Target"];

pub(crate) async fn run_ls(log: &RecordingLog, args: LsArgs) -> anyhow::Result<()> {
    let entries = log.entries(args.all).await?;

    if args.json {
        let output = serde_json::to_string_pretty(&entries)?;
        println!("{output}");
        return Ok(());
    }

    if entries.is_empty() {
        println!("No recordings found in {}.", log.dir().display());
        return Ok(());
    }

    let rows: Vec<[String; 5]> = entries.iter().map(row).collect();
    for line in render_table(&rows) {
        println!("{line}");
    }
    Ok(())
}

fn row(entry: &RecordingEntry) -> [String; 5] {
    // Uploaded recordings are identified by their server id; everything else
    // by where it sits on disk.
    let target = match (&entry.recording_id, &entry.path) {
        (Some(recording_id), _) => recording_id.clone(),
        (None, Some(path)) => path.display().to_string(),
        (None, None) => "-".to_string(),
    };
    [
        entry.id.clone(),
        entry.status.to_string(),
        entry.runtime.clone(),
        format_created(entry.create_time),
        target,
    ]
}

fn format_created(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|time| {
            time.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "-".to_string())
}

fn render_table(rows: &[[String; 5]]) -> Vec<String> {
    let mut widths = HEADERS.map(str::len);
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }
    let render = |cells: [&str; 5]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render(HEADERS)];
    for row in rows {
        lines.push(render([
            row[0].as_str(),
            row[1].as_str(),
            row[2].as_str(),
            row[3].as_str(),
            row[4].as_str(),
        ]));
    }
    lines
}
