use crate::colors::*;
use crate::options::Phase;
use std::io::{self, Write};

/// One self-overwriting status line on stdout.
#[derive(Debug, Default)]
pub(super) struct ProgressRenderer {
    last_len: usize,
}

impl ProgressRenderer {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn render(&mut self, message: impl Into<String>) {
        let message = message.into();
        let mut out = io::stdout();
        let pad = self.last_len.saturating_sub(message.len());
        write!(out, "\r{}{}", message, " ".repeat(pad)).ok();
        out.flush().ok();
        self.last_len = message.len();
    }

    pub(super) fn clear_line(&mut self) {
        if self.last_len == 0 {
            return;
        }
        print!("\r{}\r", " ".repeat(self.last_len));
        io::stdout().flush().ok();
        self.last_len = 0;
    }
}

pub(super) fn format_status(phase: Phase, percent: u8) -> String {
    let (color, action) = match phase {
        Phase::Info => (C_CYAN, "resolving"),
        Phase::Install => (C_GREEN, "installing"),
    };
    format!("{C_GRAY}[nestpm]{C_RESET} {color}{action}{C_RESET} {percent:>3}%")
}
