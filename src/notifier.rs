//! Terminal broadcast and email delivery (C5).
//!
//! `broadcast` walks the utmpx user-process table the way `btd-mailer.c`'s
//! `btd_broadcast_message` walks classic utmp, using `libc`'s `getutxent`
//! family instead of glibc's `utmp.h` helpers directly (no safe wrapper for
//! either exists in the corpus, so this is hand-rolled `unsafe` scoped as
//! narrowly as `backup-btrfs::command::CommandSystem` scopes its own
//! process-spawning `unsafe`-adjacent I/O).

use crate::error::NotifierError;
use crate::template::render_template;
use std::env;
use std::ffi::CStr;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, Stdio};

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
pub trait Notifier {
    /// Write `message` to every logged-in user's terminal device.
    /// Terminals that can't be opened are silently skipped.
    fn broadcast(&self, message: &str);

    /// Send `body` to `to` via `sendmail -t`, prefixing a `To:` header.
    fn send_email(&self, to: &str, body: &str) -> Result<(), NotifierError>;
}

/// Substitute each `{{key}}` occurrence in `text`. Kept as a free function
/// rather than a `Notifier` trait method: it is pure and stateless, and
/// routing it through the mockable trait would force every test exercising
/// an error-mail path to additionally stub template rendering.
pub fn render(text: &str, pairs: &[(&str, Option<&str>)]) -> String {
    render_template(text, pairs)
}

pub struct SystemNotifier;

impl Notifier for SystemNotifier {
    fn broadcast(&self, message: &str) {
        for tty in logged_in_ttys() {
            let path = format!("/dev/{tty}");
            if let Ok(mut file) = OpenOptions::new().write(true).open(&path) {
                let _ = file.write_all(message.as_bytes());
            }
        }
    }

    fn send_email(&self, to: &str, body: &str) -> Result<(), NotifierError> {
        let sendmail = find_in_path("sendmail").ok_or(NotifierError::SendmailMissing)?;
        let content = format!("To: {to}\n{body}");

        let mut child = Command::new(sendmail)
            .arg("-t")
            .stdin(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content.as_bytes())?;
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(NotifierError::MailFailed(format!(
                "sendmail exited with {status}"
            )));
        }

        Ok(())
    }
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(program);
        candidate.is_file().then_some(candidate)
    })
}

/// The tty device names (e.g. `"pts/3"`) of every `USER_PROCESS` utmpx
/// entry currently recorded.
fn logged_in_ttys() -> Vec<String> {
    let mut ttys = Vec::new();

    unsafe {
        libc::setutxent();

        loop {
            let entry = libc::getutxent();
            if entry.is_null() {
                break;
            }

            let entry = &*entry;
            if entry.ut_type == libc::USER_PROCESS {
                let line = CStr::from_ptr(entry.ut_line.as_ptr())
                    .to_string_lossy()
                    .trim_end_matches('\0')
                    .to_string();
                if !line.is_empty() {
                    ttys.push(line);
                }
            }
        }

        libc::endutxent();
    }

    ttys
}
