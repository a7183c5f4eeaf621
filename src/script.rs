//! Control script generation
//!
//! A control script is a POSIX shell program run once on the host, either
//! detached right away or from the deferred-execution facility. It swaps the
//! public page to the live player, runs the relay against one media file, then
//! swaps back to the idle page and deletes the media. The script never uses
//! `set -e` and never chains steps with `&&`: the idle page and cleanup run
//! whatever the relay's exit code was.

use crate::config::HostLayout;
use std::fmt;

/// Built-in live page, used when the host has no custom player template
pub const DEFAULT_PLAYER_HTML: &str = include_str!("../assets/player.html");

/// Built-in idle page, used when the host has no custom idle template
pub const DEFAULT_IDLE_HTML: &str = include_str!("../assets/idle.html");

const HEREDOC_DELIMITER: &str = "RELAYCTL_PAGE_EOF";

/// Single-quote a string for POSIX shells
///
/// Embedded single quotes become `'\''`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Undo [`shell_quote`] on the inside of a quoted word
pub fn shell_unescape(quoted_inner: &str) -> String {
    quoted_inner.replace(r"'\''", "'")
}

/// A page to install at the public path: a host-side template if present,
/// otherwise built-in HTML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSource {
    pub template_path: String,
    pub fallback_html: String,
}

impl PageSource {
    pub fn new(template_path: impl Into<String>, fallback_html: impl Into<String>) -> Self {
        Self {
            template_path: template_path.into(),
            fallback_html: fallback_html.into(),
        }
    }

    pub fn player(layout: &HostLayout) -> Self {
        Self::new(layout.player_template_path.clone(), DEFAULT_PLAYER_HTML)
    }

    pub fn idle(layout: &HostLayout) -> Self {
        Self::new(layout.idle_template_path.clone(), DEFAULT_IDLE_HTML)
    }
}

/// Generated shell program for one playback job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlScript {
    media_path: String,
    text: String,
}

impl ControlScript {
    /// Host path of the media this script plays and then deletes
    pub fn media_path(&self) -> &str {
        &self.media_path
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for ControlScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Builds control scripts and page-install snippets for one host layout
#[derive(Debug, Clone)]
pub struct ScriptGenerator {
    relay_binary: String,
    relay_target_url: String,
    public_page_path: String,
    log_path: String,
}

impl ScriptGenerator {
    pub fn new(layout: &HostLayout) -> Self {
        Self {
            relay_binary: layout.relay_binary.clone(),
            relay_target_url: layout.relay_target_url.clone(),
            public_page_path: layout.public_page_path.clone(),
            log_path: layout.log_path.clone(),
        }
    }

    /// Build the control script for `media_path`
    pub fn build(&self, media_path: &str, player: &PageSource, idle: &PageSource) -> ControlScript {
        let log = shell_quote(&self.log_path);
        let mut text = String::new();

        text.push_str("#!/bin/sh\n");
        text.push_str(&format!(
            "echo \"--- Stream script started at $(date) ---\" > {}\n",
            log
        ));
        text.push('\n');

        text.push_str(&format!("echo \"--- Installing live page ---\" >> {}\n", log));
        text.push_str(&self.page_install_command(player));
        text.push('\n');

        text.push_str(&format!("echo \"--- Starting relay ---\" >> {}\n", log));
        text.push_str(&format!("{} >> {} 2>&1\n", self.relay_invocation(media_path), log));
        text.push_str("RELAY_EXIT_CODE=$?\n");
        text.push_str(&format!(
            "echo \"--- Relay finished with code: $RELAY_EXIT_CODE ---\" >> {}\n",
            log
        ));
        text.push('\n');

        text.push_str(&format!("echo \"--- Installing idle page ---\" >> {}\n", log));
        text.push_str(&self.page_install_command(idle));
        text.push('\n');

        text.push_str(&format!("rm -f {}\n", shell_quote(media_path)));
        text.push_str(&format!("echo \"--- Cleanup complete ---\" >> {}\n", log));

        ControlScript {
            media_path: media_path.to_string(),
            text,
        }
    }

    /// `<relay> -re -i '<path>' -c:v copy -c:a copy -f flv <target>`
    pub fn relay_invocation(&self, media_path: &str) -> String {
        format!(
            "{} -re -i {} -c:v copy -c:a copy -f flv {}",
            shell_quote(&self.relay_binary),
            shell_quote(media_path),
            shell_quote(&self.relay_target_url)
        )
    }

    /// Shell snippet installing `page` at the public path
    ///
    /// Copies the host template when it exists, otherwise writes the built-in
    /// HTML through a quoted heredoc so the host shell expands nothing in it.
    pub fn page_install_command(&self, page: &PageSource) -> String {
        let template = shell_quote(&page.template_path);
        let public = shell_quote(&self.public_page_path);
        let delimiter = heredoc_delimiter(&page.fallback_html);

        let mut html = page.fallback_html.clone();
        if !html.ends_with('\n') {
            html.push('\n');
        }

        format!(
            "if [ -f {template} ]; then\n    cp {template} {public}\nelse\n    cat > {public} <<'{delimiter}'\n{html}{delimiter}\nfi\n"
        )
    }

    /// Pattern matching the relay process in `ps aux` output
    ///
    /// The first character is bracketed so `grep` never matches itself.
    pub fn status_pattern(&self) -> String {
        let name = self
            .relay_binary
            .rsplit('/')
            .next()
            .unwrap_or(self.relay_binary.as_str());
        format!("{}.*{}", bracket_first(name), self.relay_target_url)
    }

    /// Pattern handed to `pkill -f` for the relay process
    pub fn stop_pattern(&self) -> String {
        format!("{}.*{}", bracket_first(&self.relay_binary), self.relay_target_url)
    }
}

fn bracket_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => format!("[{}]{}", first, chars.as_str()),
        None => String::new(),
    }
}

/// A delimiter line that does not occur in `body`
fn heredoc_delimiter(body: &str) -> String {
    let mut delimiter = HEREDOC_DELIMITER.to_string();
    let mut n = 0;
    while body.lines().any(|line| line == delimiter) {
        n += 1;
        delimiter = format!("{}_{}", HEREDOC_DELIMITER, n);
    }
    delimiter
}
