//! Shared utility functions.

use tokio::process::Command;

const CREATE_NO_WINDOW: u32 = 0x08000000;
const CREATE_NEW_CONSOLE: u32 = 0x00000010;

/// Windows process creation flags: a hidden console when the output is
/// embedded, a console window of its own otherwise. Either way the child owns
/// a console, which the graceful stop attaches to.
///
/// The standalone window opens in its normal state; `CreateProcess` only
/// honors a minimized start through `STARTUPINFO`, which `Command` does not
/// expose.
pub fn creation_flags(embed_console: bool) -> u32 {
    if embed_console {
        CREATE_NO_WINDOW
    } else {
        CREATE_NEW_CONSOLE
    }
}

/// Apply [`creation_flags`] on Windows. On other platforms, this is a no-op.
#[cfg(target_os = "windows")]
pub fn apply_creation_flags(cmd: &mut Command, embed_console: bool) -> &mut Command {
    cmd.creation_flags(creation_flags(embed_console))
}

#[cfg(not(target_os = "windows"))]
pub fn apply_creation_flags(cmd: &mut Command, _embed_console: bool) -> &mut Command {
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_console_is_hidden() {
        assert_eq!(creation_flags(true), CREATE_NO_WINDOW);
    }

    #[test]
    fn standalone_console_gets_its_own_window() {
        let flags = creation_flags(false);
        assert_eq!(flags, CREATE_NEW_CONSOLE);
        assert_eq!(flags & CREATE_NO_WINDOW, 0);
    }
}
