//! Interactive prompts
//!
//! `Ok(None)` from any prompt means the operator cancelled it.

use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Password, Select};
use std::io;
use std::path::{Path, PathBuf};

pub const CANCELLED_MESSAGE: &str = "Operation cancelled";

/// Status line for a run the operator cancelled; the run still exits 0
pub fn report_cancelled() {
    eprintln!("{}", style(CANCELLED_MESSAGE).yellow());
}

/// Treats SIGINT as cancellation.
///
/// The hidden password prompt only turns echo off, so Ctrl+C arrives as a
/// signal rather than an `Interrupted` read. The handler restores the
/// terminal captured here before exiting 0 as a cancellation.
pub fn install_interrupt_handler() -> Result<(), ctrlc::Error> {
    let saved = terminal::SavedMode::capture();
    ctrlc::set_handler(move || {
        if let Some(saved) = &saved {
            saved.restore();
        }
        let stderr = Term::stderr();
        let _ = stderr.show_cursor();
        let _ = stderr.write_line("");
        report_cancelled();
        std::process::exit(0);
    })
}

/// Numbered selection among discovered containers. Esc cancels.
pub fn select_container(candidates: &[PathBuf]) -> Result<Option<PathBuf>, dialoguer::Error> {
    let labels: Vec<String> = candidates.iter().map(|p| display_name(p)).collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the container to convert")
        .items(&labels)
        .default(0)
        .interact_opt();

    cancelled_as_none(selection).map(|choice| choice.flatten().map(|i| candidates[i].clone()))
}

/// Hidden password prompt
pub fn prompt_password(container: &Path) -> Result<Option<String>, dialoguer::Error> {
    let password = Password::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Password for {}", display_name(container)))
        .allow_empty_password(true)
        .interact();

    cancelled_as_none(password)
}

fn cancelled_as_none<T>(result: Result<T, dialoguer::Error>) -> Result<Option<T>, dialoguer::Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(dialoguer::Error::IO(e)) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(e),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(unix)]
mod terminal {
    use std::fs::File;
    use std::os::unix::io::{AsRawFd, RawFd};

    /// Terminal attributes as they were before any prompt ran
    pub struct SavedMode {
        fd: RawFd,
        original: libc::termios,
        // keeps `fd` open when it is /dev/tty
        _tty: Option<File>,
    }

    impl SavedMode {
        /// The prompts read from stdin when it is a terminal, else /dev/tty
        pub fn capture() -> Option<Self> {
            let (fd, tty) = if unsafe { libc::isatty(libc::STDIN_FILENO) } == 1 {
                (libc::STDIN_FILENO, None)
            } else {
                let tty = File::open("/dev/tty").ok()?;
                (tty.as_raw_fd(), Some(tty))
            };

            unsafe {
                let mut original: libc::termios = std::mem::zeroed();
                if libc::tcgetattr(fd, &mut original) != 0 {
                    return None;
                }
                Some(Self {
                    fd,
                    original,
                    _tty: tty,
                })
            }
        }

        pub fn restore(&self) {
            unsafe {
                libc::tcsetattr(self.fd, libc::TCSANOW, &self.original);
            }
        }
    }
}

#[cfg(not(unix))]
mod terminal {
    pub struct SavedMode;

    impl SavedMode {
        pub fn capture() -> Option<Self> {
            None
        }

        pub fn restore(&self) {}
    }
}
