//! Graceful interrupt delivery (크로스 플랫폼).
//!
//! Unix: `SIGINT` to the child PID.
//! Windows: attach to the child's console and raise `CTRL_C_EVENT` there, the
//! same thing a user pressing Ctrl-C in the server window does.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("failed to signal process {pid}: {reason}")]
    Failed { pid: u32, reason: String },
}

#[cfg(not(target_os = "windows"))]
pub fn send_interrupt(pid: u32) -> Result<(), SignalError> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| SignalError::Failed {
        pid,
        reason: "pid out of range".to_string(),
    })?;
    signal::kill(Pid::from_raw(raw), Signal::SIGINT).map_err(|e| SignalError::Failed {
        pid,
        reason: e.to_string(),
    })
}

#[cfg(target_os = "windows")]
pub fn send_interrupt(pid: u32) -> Result<(), SignalError> {
    use std::sync::Mutex;
    use winapi::um::consoleapi::SetConsoleCtrlHandler;
    use winapi::um::wincon::{AttachConsole, FreeConsole, GenerateConsoleCtrlEvent, ATTACH_PARENT_PROCESS, CTRL_C_EVENT};

    // console attachment is process-wide
    static CONSOLE_LOCK: Mutex<()> = Mutex::new(());
    let _guard = CONSOLE_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    unsafe {
        FreeConsole();
        if AttachConsole(pid) == 0 {
            AttachConsole(ATTACH_PARENT_PROCESS);
            return Err(SignalError::Failed {
                pid,
                reason: format!("AttachConsole failed: {}", std::io::Error::last_os_error()),
            });
        }

        // ignore the event ourselves while attached
        SetConsoleCtrlHandler(None, 1);
        let sent = GenerateConsoleCtrlEvent(CTRL_C_EVENT, 0);
        let err = std::io::Error::last_os_error();

        // the event is dispatched asynchronously
        std::thread::sleep(std::time::Duration::from_millis(100));
        FreeConsole();
        SetConsoleCtrlHandler(None, 0);
        AttachConsole(ATTACH_PARENT_PROCESS);

        if sent == 0 {
            return Err(SignalError::Failed {
                pid,
                reason: format!("GenerateConsoleCtrlEvent failed: {}", err),
            });
        }
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn signalling_missing_process_fails() {
        // PID far above any default pid_max
        let err = send_interrupt(i32::MAX as u32).unwrap_err();
        assert!(err.to_string().contains("failed to signal"));
    }
}
