//! Local terminal control.
//!
//! [`TerminalControl`] is the seam between the session controller and the
//! process's terminal; [`CrosstermTerminal`] is the real implementation.
//! [`RawModeGuard`] restores the original mode exactly once, either through
//! [`RawModeGuard::restore`] or when dropped (including during unwinding).

use std::io;

use tracing::{debug, warn};

/// Raw/cooked toggle and size query for the local terminal.
pub trait TerminalControl {
    /// Switch to raw mode, remembering the current mode.
    fn enable_raw_mode(&self) -> io::Result<()>;

    /// Return to the mode remembered by `enable_raw_mode`.
    fn restore_mode(&self) -> io::Result<()>;

    /// Current `(columns, rows)`.
    fn size(&self) -> io::Result<(u16, u16)>;
}

/// Terminal attached to the process's standard input.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrosstermTerminal;

impl TerminalControl for CrosstermTerminal {
    fn enable_raw_mode(&self) -> io::Result<()> {
        crossterm::terminal::enable_raw_mode()
    }

    fn restore_mode(&self) -> io::Result<()> {
        crossterm::terminal::disable_raw_mode()
    }

    fn size(&self) -> io::Result<(u16, u16)> {
        crossterm::terminal::size()
    }
}

/// Raw mode held for the guard's lifetime.
pub struct RawModeGuard<'a, T: TerminalControl + ?Sized> {
    terminal: &'a T,
    active: bool,
}

impl<'a, T: TerminalControl + ?Sized> RawModeGuard<'a, T> {
    /// Enable raw mode. Nothing needs restoring if this fails.
    pub fn acquire(terminal: &'a T) -> io::Result<Self> {
        terminal.enable_raw_mode()?;
        debug!("Local terminal switched to raw mode");
        Ok(Self {
            terminal,
            active: true,
        })
    }

    /// Restore the original mode now, reporting failure.
    pub fn restore(mut self) -> io::Result<()> {
        self.active = false;
        self.terminal.restore_mode()
    }
}

impl<T: TerminalControl + ?Sized> Drop for RawModeGuard<'_, T> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(e) = self.terminal.restore_mode() {
            warn!("Failed to restore terminal mode: {}", e);
        } else {
            debug!("Local terminal mode restored");
        }
    }
}
