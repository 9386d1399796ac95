//! Entry point for the hostwatch report. Reads the agent's history snapshot and
//! prints window statistics per series.

use std::env;
use std::path::PathBuf;

use hostwatch_agent::config::data_dir;
use hostwatch_agent::format::{format_stats, local_time};
use hostwatch_agent::history::{HistoryOptions, HistoryStore, JsonFilePersistence};
use hostwatch_agent::stats::stats;
use hostwatch_agent::types::{now_ms, Series};

const DEFAULT_HOURS: u32 = 24;

#[derive(Debug, PartialEq)]
struct ParsedArgs {
    data_dir: Option<PathBuf>,
    hours: u32,
    subtype: Option<String>,
    series: Vec<Series>,
}

fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--data-dir DIR|-d DIR] [--hours N|-H N] [--subtype NAME|-s NAME] [SERIES...]\n\
         SERIES: cpu memory disk temperature network (default: all)"
    )
}

fn parse_hours(v: &str, prog: &str) -> Result<u32, String> {
    match v.parse::<u32>() {
        Ok(h) if h > 0 => Ok(h),
        _ => Err(format!("Invalid hours '{v}'. {}", usage(prog))),
    }
}

fn value_for(it: &mut impl Iterator<Item = String>, flag: &str, prog: &str) -> Result<String, String> {
    it.next()
        .ok_or_else(|| format!("{flag} needs a value. {}", usage(prog)))
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "hostwatch".into());
    let mut data_dir: Option<PathBuf> = None;
    let mut hours = DEFAULT_HOURS;
    let mut subtype: Option<String> = None;
    let mut series: Vec<Series> = Vec::new();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage(&prog)),
            "--data-dir" | "-d" => {
                data_dir = Some(PathBuf::from(value_for(&mut it, &arg, &prog)?));
            }
            "--hours" | "-H" => {
                let v = value_for(&mut it, &arg, &prog)?;
                hours = parse_hours(&v, &prog)?;
            }
            "--subtype" | "-s" => {
                subtype = Some(value_for(&mut it, &arg, &prog)?);
            }
            _ if arg.starts_with("--data-dir=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        data_dir = Some(PathBuf::from(v));
                    }
                }
            }
            _ if arg.starts_with("--hours=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    hours = parse_hours(v, &prog)?;
                }
            }
            _ if arg.starts_with("--subtype=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        subtype = Some(v.to_string());
                    }
                }
            }
            _ => match arg.parse::<Series>() {
                Ok(s) if !series.contains(&s) => series.push(s),
                Ok(_) => {}
                Err(_) => {
                    return Err(format!("Unknown series '{arg}'. {}", usage(&prog)));
                }
            },
        }
    }
    if series.is_empty() {
        series = Series::ALL.to_vec();
    }
    Ok(ParsedArgs {
        data_dir,
        hours,
        subtype,
        series,
    })
}

#[tokio::main]
async fn main() {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            if msg.starts_with("Usage:") {
                println!("{msg}");
                return;
            }
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let dir = parsed.data_dir.unwrap_or_else(data_dir);
    let persistence = JsonFilePersistence::in_dir(&dir);
    if !persistence.path().exists() {
        eprintln!("no history at {}", persistence.path().display());
    }
    // read-only: keep every stored point whatever cap the agent runs with
    let opts = HistoryOptions {
        max_points: usize::MAX,
        ..HistoryOptions::default()
    };
    let store = HistoryStore::open(persistence, opts).await;

    println!(
        "hostwatch report, last {}h as of {}",
        parsed.hours,
        local_time(now_ms())
    );
    for series in parsed.series {
        let s = stats(&store, series, parsed.hours, parsed.subtype.as_deref()).await;
        println!();
        println!("{}", format_stats(series, s.as_ref(), parsed.hours));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        std::iter::once("hostwatch")
            .chain(v.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_to_every_series_over_a_day() {
        let p = parse_args(args(&[])).unwrap();
        assert_eq!(p.hours, 24);
        assert_eq!(p.series, Series::ALL.to_vec());
        assert_eq!(p.data_dir, None);
    }

    #[test]
    fn flags_and_series_names() {
        let p = parse_args(args(&["-H", "6", "--subtype=ssd", "temp", "cpu", "temp"])).unwrap();
        assert_eq!(p.hours, 6);
        assert_eq!(p.subtype.as_deref(), Some("ssd"));
        assert_eq!(p.series, vec![Series::Temperature, Series::Cpu]);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(args(&["swap"])).unwrap_err().contains("Unknown series"));
        assert!(parse_args(args(&["--hours", "0"])).is_err());
        assert!(parse_args(args(&["--hours=abc"])).is_err());
        assert!(parse_args(args(&["--help"])).unwrap_err().starts_with("Usage:"));
        for flag in ["--data-dir", "-d", "--subtype", "-s", "--hours"] {
            let err = parse_args(args(&["cpu", flag])).unwrap_err();
            assert!(err.contains("needs a value"), "{flag}: {err}");
        }
    }
}
