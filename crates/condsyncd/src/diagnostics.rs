//! Best-effort identification of the process holding a TCP port.
//!
//! Used when the listener cannot bind because the port is taken. Reads
//! `/proc/net/tcp{,6}` for listening sockets on the port and maps their
//! inodes to owning processes through `/proc/<pid>/fd`. Every failure
//! (missing procfs, permission denied, vanished process) just yields
//! fewer results.

use std::collections::HashSet;
use std::fmt;

use procfs::net::TcpState;
use procfs::process::{all_processes, FDTarget, Process};
use tracing::debug;

/// A process found listening on a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortHolder {
    pub pid: i32,

    /// Short command name from `/proc/<pid>/stat`.
    pub name: Option<String>,

    /// Full command line, space-joined.
    pub command_line: Option<String>,
}

impl fmt::Display for PortHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.pid)?;
        if let Some(name) = &self.name {
            write!(f, " ({name})")?;
        }
        if let Some(command_line) = &self.command_line {
            write!(f, ": {command_line}")?;
        }
        Ok(())
    }
}

/// Returns every process with a listening TCP socket on `port`.
pub fn find_port_holders(port: u16) -> Vec<PortHolder> {
    let inodes = listening_inodes(port);
    if inodes.is_empty() {
        debug!(port, "No listening socket found in /proc/net");
        return Vec::new();
    }

    let Ok(processes) = all_processes() else {
        debug!(port, "Process table not readable");
        return Vec::new();
    };

    processes
        .filter_map(Result::ok)
        .filter(|process| holds_any(process, &inodes))
        .map(|process| describe(&process))
        .collect()
}

/// Formats holders for a log line or error message.
pub fn describe_holders(holders: &[PortHolder]) -> String {
    if holders.is_empty() {
        return "holder unknown".to_string();
    }
    holders
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn listening_inodes(port: u16) -> HashSet<u64> {
    let mut entries = procfs::net::tcp().unwrap_or_default();
    entries.extend(procfs::net::tcp6().unwrap_or_default());

    entries
        .into_iter()
        .filter(|entry| entry.state == TcpState::Listen && entry.local_address.port() == port)
        .map(|entry| entry.inode)
        .collect()
}

fn holds_any(process: &Process, inodes: &HashSet<u64>) -> bool {
    let Ok(fds) = process.fd() else {
        return false;
    };
    fds.filter_map(Result::ok)
        .any(|fd| matches!(fd.target, FDTarget::Socket(inode) if inodes.contains(&inode)))
}

fn describe(process: &Process) -> PortHolder {
    let name = process.stat().ok().map(|stat| stat.comm);
    let command_line = process
        .cmdline()
        .ok()
        .filter(|args| !args.is_empty())
        .map(|args| args.join(" "));

    PortHolder {
        pid: process.pid(),
        name,
        command_line,
    }
}
