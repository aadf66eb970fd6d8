//! Measure page faults (or other perf events) caused by the first touch of
//! a freshly mapped page.
//!
//! # Usage
//!
//! ```bash
//! # Count page faults at user level for one touch of a fresh mapping
//! vmafault
//!
//! # Same, but with the mapping pre-faulted (expect zero faults)
//! vmafault -P
//!
//! # Huge page backing, counting at kernel and user level
//! vmafault -H -p 0,3
//!
//! # Several events in one group, one cycle per cache line of the region
//! vmafault -e page-faults -e dTLB-load-misses --cycles all
//! ```
//!
//! Reading `/proc/kpagecount` and `/proc/kpageflags`, and seeing real frame
//! numbers in `/proc/self/pagemap`, requires CAP_SYS_ADMIN.

use clap::Parser;
use log::error;
use std::ffi::OsString;
use std::io;
use vmafault::config::DEFAULT_EVENT;
use vmafault::events::PrivilegeLevels;
use vmafault::{CycleCount, Probe, ProbeConfig, ProbeError};

#[derive(Parser, Debug)]
#[command(name = "vmafault")]
#[command(about = "Measure fault and cache events for one touch of a freshly mapped page")]
#[command(version)]
struct Cli {
    /// Use a hugepage mapping.
    #[arg(short = 'H', long)]
    hugepage: bool,

    /// Use a pre-faulted mapping.
    #[arg(short = 'P', long)]
    populate: bool,

    /// Measure at one or more privilege levels (comma-separated, 0..3).
    ///
    /// Level 0 usually corresponds to kernel level, level 3 to user
    /// level. User level is always counted; each -p adds to it.
    #[arg(short = 'p', long = "privilege", value_name = "LEVELS")]
    privilege: Vec<PrivilegeLevels>,

    /// Event to count; repeat to group several, led by the first.
    #[arg(short = 'e', long = "event", value_name = "NAME", default_value = DEFAULT_EVENT)]
    events: Vec<String>,

    /// Measurement cycles: a positive count, or "all" for one per cache line.
    #[arg(short = 'c', long, default_value = "1")]
    cycles: CycleCount,
}

impl Cli {
    fn into_config(self) -> ProbeConfig {
        let privilege = self
            .privilege
            .into_iter()
            .fold(PrivilegeLevels::USER, PrivilegeLevels::union);
        ProbeConfig {
            privilege,
            huge_pages: self.hugepage,
            populate: self.populate,
            cycles: self.cycles,
            events: self.events,
        }
    }
}

/// Parse `args` and hand the resulting configuration to `probe`, returning
/// the process exit status. Usage errors are reported before `probe` runs.
fn launch<I, T, F>(args: I, probe: F) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    F: FnOnce(&ProbeConfig) -> Result<(), ProbeError>,
{
    let config = match Cli::try_parse_from(args) {
        Ok(cli) => cli.into_config(),
        Err(e) => {
            let _ = e.print();
            return e.exit_code();
        }
    };
    match probe(&config) {
        Ok(()) => 0,
        Err(e) => {
            error!("{e}");
            1
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let status = launch(std::env::args_os(), |config| {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        Probe::new().run(config, &mut out).map(|_| ())
    });
    std::process::exit(status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use std::cell::Cell;

    fn parse(args: &[&str]) -> Result<ProbeConfig, clap::Error> {
        let argv = std::iter::once("vmafault").chain(args.iter().copied());
        Cli::try_parse_from(argv).map(Cli::into_config)
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config, ProbeConfig::default());
    }

    #[test]
    fn flags_and_levels() {
        let config = parse(&["-H", "-P", "-p", "0,3", "-p", "1"]).unwrap();
        assert!(config.huge_pages && config.populate);
        assert_eq!(config.privilege.bits(), 0b1011);
    }

    #[test]
    fn privilege_levels_add_to_user() {
        let config = parse(&["-p", "0"]).unwrap();
        assert_eq!(config.privilege.bits(), 0b1001);
        assert!(config.privilege.counts_user());
        assert!(config.privilege.counts_kernel());
    }

    #[test]
    fn events_replace_default() {
        let config = parse(&["-e", "instructions", "-e", "page-faults"]).unwrap();
        assert_eq!(config.events, vec!["instructions", "page-faults"]);
    }

    #[test]
    fn cycles_all() {
        assert_eq!(parse(&["--cycles", "all"]).unwrap().cycles, CycleCount::AllLines);
    }

    #[test]
    fn bad_privilege_level_is_a_usage_error() {
        let err = parse(&["-p", "4"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_ne!(err.exit_code(), 0);
        assert!(parse(&["-p", "0,user"]).is_err());
    }

    #[test]
    fn bad_privilege_level_exits_before_any_setup() {
        let called = Cell::new(false);
        let status = launch(["vmafault", "-p", "4"], |_| {
            called.set(true);
            Ok(())
        });
        assert_ne!(status, 0);
        assert!(!called.get());
    }

    #[test]
    fn valid_arguments_reach_the_measurement() {
        let seen = Cell::new(None);
        let status = launch(["vmafault", "-P", "-c", "3"], |config| {
            seen.set(Some((config.populate, config.cycles)));
            Ok(())
        });
        assert_eq!(status, 0);
        assert_eq!(seen.get(), Some((true, CycleCount::Fixed(3))));
    }

    #[test]
    fn unknown_flag_is_a_usage_error() {
        let err = parse(&["-x"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        assert_ne!(err.exit_code(), 0);
        assert!(err.render().to_string().contains("Usage:"));
    }

    #[test]
    fn zero_cycles_is_rejected() {
        assert!(parse(&["-c", "0"]).is_err());
    }
}
