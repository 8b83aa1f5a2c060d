//! Console output helpers for the non-interactive commands
//!
//! Host tables for `list` and colored status lines used around the
//! browser (before it takes the screen and while a session is starting).

use std::io::{self, Write};

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tabled::{settings::Style, Table, Tabled};

use gw_core::HostEntry;

/// Format an operator's allowed hosts as a table
///
/// The detailed view adds the ssh target the gateway will dial.
pub fn format_hosts(hosts: &[HostEntry], detailed: bool) -> String {
    if hosts.is_empty() {
        return "No hosts allowed".to_string();
    }

    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "PORT")]
        port: u16,
    }

    #[derive(Tabled)]
    struct HostRowDetailed {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "PORT")]
        port: u16,
        #[tabled(rename = "TARGET")]
        target: String,
    }

    if detailed {
        let rows: Vec<HostRowDetailed> = hosts
            .iter()
            .enumerate()
            .map(|(i, h)| HostRowDetailed {
                index: i + 1,
                host: h.hostname().to_string(),
                port: h.port(),
                target: format!("ssh://{}", h),
            })
            .collect();

        Table::new(rows).with(Style::rounded()).to_string()
    } else {
        let rows: Vec<HostRow> = hosts
            .iter()
            .enumerate()
            .map(|(i, h)| HostRow {
                index: i + 1,
                host: h.hostname().to_string(),
                port: h.port(),
            })
            .collect();

        Table::new(rows).with(Style::rounded()).to_string()
    }
}

fn print_status(out: &mut impl Write, color: Color, symbol: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(symbol),
        Print(' '),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Green check on stdout
pub fn print_success(msg: &str) {
    print_status(&mut io::stdout(), Color::Green, "✓", msg);
}

/// Red cross on stderr
pub fn print_error(msg: &str) {
    print_status(&mut io::stderr(), Color::Red, "✗", msg);
}

/// Yellow warning sign on stderr
pub fn print_warning(msg: &str) {
    print_status(&mut io::stderr(), Color::Yellow, "⚠", msg);
}

/// Cyan info mark on stdout
pub fn print_info(msg: &str) {
    print_status(&mut io::stdout(), Color::Cyan, "ℹ", msg);
}
