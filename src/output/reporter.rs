//! `TerminalReporter` — presentation-layer implementation of
//! `ProgressReporter`.
//!
//! Wraps `&OutputContext` so application services can emit progress events
//! without depending on any presentation type directly. On a TTY, step
//! messages drive a single spinner; elsewhere they degrade to plain lines.

use std::cell::RefCell;

use indicatif::ProgressBar;
use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::{progress, OutputContext};

pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
    active: RefCell<Option<ProgressBar>>,
}

impl<'a> TerminalReporter<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self {
            ctx,
            active: RefCell::new(None),
        }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        if self.ctx.quiet {
            return;
        }
        if self.ctx.show_progress() {
            let mut active = self.active.borrow_mut();
            match active.as_ref() {
                Some(pb) => pb.set_message(message.to_string()),
                None => *active = Some(progress::spinner(message)),
            }
        } else {
            println!("  {} {message}", "→".cyan());
        }
    }

    fn success(&self, message: &str) {
        if self.ctx.quiet {
            return;
        }
        if let Some(pb) = self.active.borrow_mut().take() {
            progress::finish_ok(&pb, message);
        } else {
            println!("  {} {message}", "✓".green());
        }
    }

    fn warn(&self, message: &str) {
        if self.ctx.quiet {
            return;
        }
        if let Some(pb) = self.active.borrow().as_ref() {
            pb.println(format!("  {} {message}", "!".yellow()));
        } else {
            println!("  {} {message}", "!".yellow());
        }
    }
}

impl Drop for TerminalReporter<'_> {
    fn drop(&mut self) {
        // An error can abort mid-step; don't leave a spinner ticking.
        if let Some(pb) = self.active.borrow_mut().take() {
            pb.finish_and_clear();
        }
    }
}
